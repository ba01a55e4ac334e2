// Response caching for the upstream proxies
// keys: canonical cache keys, models: stored entries, operations: cache-aside

pub mod keys;
pub mod models;
pub mod operations;

pub use keys::CacheKey;
pub use models::CacheEntry;
pub use operations::{CacheStore, MemoryCacheStore, ResponseCache};

/// One cache per upstream endpoint; nothing is shared across them.
#[derive(Clone)]
pub struct ProxyCaches {
    pub weather: ResponseCache,
    pub provinces: ResponseCache,
    pub cities: ResponseCache,
    pub prices: ResponseCache,
}

impl ProxyCaches {
    pub fn new() -> Self {
        Self {
            weather: ResponseCache::new("weather"),
            provinces: ResponseCache::new("provinces"),
            cities: ResponseCache::new("cities"),
            prices: ResponseCache::new("prices"),
        }
    }
}

impl Default for ProxyCaches {
    fn default() -> Self {
        Self::new()
    }
}
