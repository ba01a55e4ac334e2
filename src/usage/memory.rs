use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;

use super::{ApiKeyUsageRecord, UsageStore, UsageStoreError};

/// In-process counters. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryUsageStore {
    records: DashMap<(String, NaiveDate), ApiKeyUsageRecord>,
}

impl MemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, key: &str, date: NaiveDate) -> Option<ApiKeyUsageRecord> {
        self.records
            .get(&(key.to_string(), date))
            .map(|r| r.value().clone())
    }

    /// Seeds a count, used to replay persisted state or in tests.
    pub fn set_usage(&self, key: &str, date: NaiveDate, count: i64) {
        self.records.insert(
            (key.to_string(), date),
            ApiKeyUsageRecord {
                api_key: key.to_string(),
                usage_date: date,
                usage_count: count,
                last_used_at: None,
            },
        );
    }
}

#[async_trait]
impl UsageStore for MemoryUsageStore {
    async fn read_usage(
        &self,
        keys: &[String],
        date: NaiveDate,
    ) -> Result<HashMap<String, i64>, UsageStoreError> {
        Ok(keys
            .iter()
            .filter_map(|k| {
                self.records
                    .get(&(k.clone(), date))
                    .map(|r| (k.clone(), r.usage_count))
            })
            .collect())
    }

    async fn upsert_usage(&self, key: &str, date: NaiveDate) -> Result<i64, UsageStoreError> {
        let now = Utc::now();
        // the entry guard holds the shard lock across read-modify-write
        let record = self
            .records
            .entry((key.to_string(), date))
            .and_modify(|r| {
                r.usage_count += 1;
                r.last_used_at = Some(now);
            })
            .or_insert_with(|| ApiKeyUsageRecord {
                api_key: key.to_string(),
                usage_date: date,
                usage_count: 1,
                last_used_at: Some(now),
            });
        Ok(record.usage_count)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
