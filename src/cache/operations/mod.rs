use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::time::Instant;

use crate::cache::keys::CacheKey;
use crate::cache::models::CacheEntry;
use crate::error::ProxyError;

/// Storage behind a [`ResponseCache`].
pub trait CacheStore: Send + Sync {
    /// Returns the payload stored under `key` if it is still fresh at `now`.
    fn get(&self, key: &str, now: Instant) -> Option<Value>;

    fn put(&self, key: String, entry: CacheEntry);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local store. Grows with the number of distinct keys; stale
/// entries are dropped when they are next looked up.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str, now: Instant) -> Option<Value> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_fresh(now) {
                return Some(entry.payload.clone());
            }
        }
        // only drop it if a concurrent writer has not refreshed it meanwhile
        self.entries.remove_if(key, |_, entry| !entry.is_fresh(now));
        None
    }

    fn put(&self, key: String, entry: CacheEntry) {
        self.entries.insert(key, entry);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Cache-aside wrapper around one upstream endpoint.
#[derive(Clone)]
pub struct ResponseCache {
    name: &'static str,
    store: Arc<dyn CacheStore>,
}

impl ResponseCache {
    pub fn new(name: &'static str) -> Self {
        Self::with_store(name, Arc::new(MemoryCacheStore::new()))
    }

    pub fn with_store(name: &'static str, store: Arc<dyn CacheStore>) -> Self {
        Self { name, store }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Serves `key` from the cache, or runs `fetch` and stores its result
    /// for `ttl`.
    ///
    /// The fetch runs on its own task: if the caller goes away mid-flight
    /// the upstream call still completes and still fills the cache.
    /// Failures are returned as-is and never cached. Concurrent misses on
    /// the same key each call upstream; the last one to finish wins.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: CacheKey,
        ttl: Duration,
        fetch: F,
    ) -> Result<Value, ProxyError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, ProxyError>> + Send + 'static,
    {
        if let Some(payload) = self.store.get(key.as_str(), Instant::now()) {
            tracing::debug!("{} cache hit: {}", self.name, key);
            return Ok(payload);
        }
        tracing::debug!("{} cache miss: {}", self.name, key);

        let store = Arc::clone(&self.store);
        let pending = fetch();
        let task = tokio::spawn(async move {
            let payload = pending.await?;
            store.put(
                key.into_string(),
                CacheEntry::new(payload.clone(), Instant::now() + ttl),
            );
            Ok(payload)
        });

        task.await
            .map_err(|e| ProxyError::Internal(format!("{} fetch task failed: {}", self.name, e)))?
    }
}
