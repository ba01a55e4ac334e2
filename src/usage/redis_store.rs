use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use redis::Client as RedisClient;

use super::{UsageStore, UsageStoreError};

const USAGE_KEY_PREFIX: &str = "api_key_usage:";
const COUNT_FIELD: &str = "usage_count";
const LAST_USED_FIELD: &str = "last_used_at";

/// Redis-backed counters: one hash per key and day, expiring after the
/// retention window.
#[derive(Clone)]
pub struct RedisUsageStore {
    redis: Arc<RedisClient>,
    retention: Duration,
}

pub(crate) fn usage_key(api_key: &str, date: NaiveDate) -> String {
    format!("{}{}:{}", USAGE_KEY_PREFIX, date.format("%Y-%m-%d"), api_key)
}

impl RedisUsageStore {
    pub fn new(redis: Arc<RedisClient>, retention: Duration) -> Self {
        Self { redis, retention }
    }
}

#[async_trait]
impl UsageStore for RedisUsageStore {
    async fn read_usage(
        &self,
        keys: &[String],
        date: NaiveDate,
    ) -> Result<HashMap<String, i64>, UsageStoreError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.hget(usage_key(key, date), COUNT_FIELD);
        }
        let counts: Vec<Option<i64>> = pipe.query_async(&mut conn).await?;

        Ok(keys
            .iter()
            .zip(counts)
            .filter_map(|(key, count)| count.map(|c| (key.clone(), c)))
            .collect())
    }

    async fn upsert_usage(&self, key: &str, date: NaiveDate) -> Result<i64, UsageStoreError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let redis_key = usage_key(key, date);

        // MULTI/EXEC: HINCRBY is atomic on its own, the transaction keeps
        // the timestamp and expiry in step with it
        let (count,): (i64,) = redis::pipe()
            .atomic()
            .hincr(&redis_key, COUNT_FIELD, 1)
            .hset(&redis_key, LAST_USED_FIELD, Utc::now().to_rfc3339())
            .ignore()
            .expire(&redis_key, self.retention.as_secs() as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count)
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
