//! Key-value cache abstraction with per-entry TTL.
//!
//! Entries are advisory: the entity store stays authoritative and a missing
//! or expired entry only means the caller has to ask the store.

use interlude_core::config::{CacheConfig, CacheDriver};
use interlude_core::InterludeResult;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::client::RedisCache;
use crate::local::LocalCache;

pub trait Cache: Send + Sync {
    /// Fetch a live entry. Expired entries read as `None`.
    fn get(&self, key: &str) -> InterludeResult<Option<serde_json::Value>>;

    /// Insert or refresh an entry for `ttl`.
    fn put(&self, key: &str, value: serde_json::Value, ttl: Duration) -> InterludeResult<()>;

    fn has(&self, key: &str) -> InterludeResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Build the cache selected by configuration.
pub fn build_cache(config: &CacheConfig) -> InterludeResult<Arc<dyn Cache>> {
    match config.driver {
        CacheDriver::Memory => {
            info!(max_entries = config.max_entries, "Using in-process cache");
            Ok(Arc::new(LocalCache::new(config.max_entries)))
        }
        CacheDriver::Redis => Ok(Arc::new(RedisCache::connect(config)?)),
    }
}
