use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;

use super::{UsageStore, UsageStoreError};

/// Postgres-backed counters; the primary key on `(api_key, usage_date)`
/// makes the upsert row-locked.
#[derive(Clone)]
pub struct PgUsageStore {
    pool: PgPool,
}

impl PgUsageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the usage table if it is missing.
    pub async fn migrate(&self) -> Result<(), UsageStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS api_key_usage (
                api_key VARCHAR(100) NOT NULL,
                usage_date DATE NOT NULL,
                usage_count BIGINT NOT NULL DEFAULT 0,
                last_used_at TIMESTAMPTZ,
                PRIMARY KEY (api_key, usage_date)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_api_key_usage_date ON api_key_usage (usage_date)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl UsageStore for PgUsageStore {
    async fn read_usage(
        &self,
        keys: &[String],
        date: NaiveDate,
    ) -> Result<HashMap<String, i64>, UsageStoreError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT api_key, usage_count
            FROM api_key_usage
            WHERE usage_date = $1 AND api_key = ANY($2)
            "#,
        )
        .bind(date)
        .bind(keys)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn upsert_usage(&self, key: &str, date: NaiveDate) -> Result<i64, UsageStoreError> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO api_key_usage (api_key, usage_date, usage_count, last_used_at)
            VALUES ($1, $2, 1, NOW())
            ON CONFLICT (api_key, usage_date)
            DO UPDATE SET
                usage_count = api_key_usage.usage_count + 1,
                last_used_at = NOW()
            RETURNING usage_count
            "#,
        )
        .bind(key)
        .bind(date)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
