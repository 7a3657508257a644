//! Redis cache client for view facts shared across app servers.

use interlude_core::config::CacheConfig;
use interlude_core::{InterludeError, InterludeResult};
use redis::Commands;
use std::time::Duration;
use tracing::{debug, info};

use crate::backend::Cache;

/// Redis-backed distributed cache. Values are stored as JSON strings with
/// a native expiry.
pub struct RedisCache {
    client: redis::Client,
}

impl RedisCache {
    /// Connect to Redis and verify connectivity.
    pub fn connect(config: &CacheConfig) -> InterludeResult<Self> {
        info!(url = %config.redis_url, "Connecting to Redis");

        let client = redis::Client::open(config.redis_url.as_str()).map_err(cache_error)?;

        let mut conn = client.get_connection().map_err(cache_error)?;
        let pong: String = redis::cmd("PING").query(&mut conn).map_err(cache_error)?;
        info!(response = %pong, "Redis connection established");

        Ok(Self { client })
    }

    fn connection(&self) -> InterludeResult<redis::Connection> {
        self.client.get_connection().map_err(cache_error)
    }
}

impl Cache for RedisCache {
    fn get(&self, key: &str) -> InterludeResult<Option<serde_json::Value>> {
        let mut conn = self.connection()?;
        let data: Option<String> = conn.get(key).map_err(cache_error)?;

        match data {
            Some(json) => {
                metrics::counter!("interlude.cache.hit").increment(1);
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => {
                metrics::counter!("interlude.cache.miss").increment(1);
                debug!(key, "Cache miss");
                Ok(None)
            }
        }
    }

    fn put(&self, key: &str, value: serde_json::Value, ttl: Duration) -> InterludeResult<()> {
        let json = serde_json::to_string(&value)?;
        let mut conn = self.connection()?;
        conn.set_ex::<_, _, ()>(key, json, ttl.as_secs().max(1))
            .map_err(cache_error)
    }

    fn has(&self, key: &str) -> InterludeResult<bool> {
        let mut conn = self.connection()?;
        conn.exists(key).map_err(cache_error)
    }
}

fn cache_error(e: redis::RedisError) -> InterludeError {
    InterludeError::Cache(e.to_string())
}
