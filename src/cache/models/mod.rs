use serde_json::Value;
use tokio::time::Instant;

/// A cached upstream payload.
///
/// Valid while `now < expires_at`; stale entries stay until they are read
/// again or overwritten.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: Value,
    pub expires_at: Instant,
}

impl CacheEntry {
    pub fn new(payload: Value, expires_at: Instant) -> Self {
        Self {
            payload,
            expires_at,
        }
    }

    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}
