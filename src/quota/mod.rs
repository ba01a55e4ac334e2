//! Spreads upstream calls over a pool of API keys, each with its own
//! daily budget.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::usage::{UsageStore, today};

/// Picks the least-used key still under `daily_limit`. Ties keep pool
/// order. Keys missing from `usage` count as unused.
pub fn select_least_used<'a>(
    pool: &'a [String],
    usage: &HashMap<String, i64>,
    daily_limit: i64,
) -> Option<&'a str> {
    let mut candidates: Vec<(&str, i64)> = pool
        .iter()
        .map(|key| (key.as_str(), usage.get(key).copied().unwrap_or(0)))
        .collect();
    // sort_by_key is stable
    candidates.sort_by_key(|&(_, count)| count);
    candidates
        .into_iter()
        .find(|&(_, count)| count < daily_limit)
        .map(|(key, _)| key)
}

pub struct KeyRotator {
    keys: Vec<String>,
    daily_limit: i64,
    store: Arc<dyn UsageStore>,
}

impl KeyRotator {
    pub fn new(keys: Vec<String>, daily_limit: i64, store: Arc<dyn UsageStore>) -> Self {
        Self {
            keys,
            daily_limit,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn UsageStore> {
        &self.store
    }

    /// Key to use for the next call today, or `None` once every key has
    /// hit the limit. Does not consume quota.
    pub async fn pick_available_key(&self) -> Option<String> {
        self.pick_available_key_on(today()).await
    }

    /// A usage store failure is treated as zero usage so the request can
    /// still go out.
    pub async fn pick_available_key_on(&self, date: NaiveDate) -> Option<String> {
        let usage = match self.store.read_usage(&self.keys, date).await {
            Ok(usage) => usage,
            Err(e) => {
                tracing::warn!("Failed to read key usage, assuming none: {}", e);
                HashMap::new()
            }
        };

        select_least_used(&self.keys, &usage, self.daily_limit).map(str::to_string)
    }

    /// Counts one successful call against `key` for today. Failures are
    /// logged and swallowed.
    pub async fn record_usage(&self, key: &str) -> Option<i64> {
        self.record_usage_on(key, today()).await
    }

    pub async fn record_usage_on(&self, key: &str, date: NaiveDate) -> Option<i64> {
        match self.store.upsert_usage(key, date).await {
            Ok(count) => {
                tracing::debug!("API key usage for {} on {}: {}", mask_key(key), date, count);
                Some(count)
            }
            Err(e) => {
                tracing::warn!("Failed to record usage for {}: {}", mask_key(key), e);
                None
            }
        }
    }
}

/// Keeps the first four characters of a key for log lines.
pub fn mask_key(key: &str) -> String {
    let visible: String = key.chars().take(4).collect();
    format!("{}***", visible)
}
