//! Per-key, per-day call counters for the quota-gated upstreams.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

mod memory;
mod pg;
mod redis_store;

pub use memory::MemoryUsageStore;
pub use pg::PgUsageStore;
pub use redis_store::RedisUsageStore;

/// One row per `(api_key, usage_date)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyUsageRecord {
    pub api_key: String,
    pub usage_date: NaiveDate,
    pub usage_count: i64,
    pub last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum UsageStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Usage counts for `keys` on `date`. Keys with no record are absent
    /// from the map.
    async fn read_usage(
        &self,
        keys: &[String],
        date: NaiveDate,
    ) -> Result<HashMap<String, i64>, UsageStoreError>;

    /// Creates the record with count 1 or bumps the existing one, in one
    /// atomic step. Returns the new count.
    async fn upsert_usage(&self, key: &str, date: NaiveDate) -> Result<i64, UsageStoreError>;

    /// Short backend label for diagnostics.
    fn backend(&self) -> &'static str;
}

/// The calendar day quotas are counted against.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}
