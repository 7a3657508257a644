//! In-process TTL cache backed by DashMap for lock-free concurrent access.
//! Default cache for single-node hosts and tests.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use interlude_core::clock::{system_clock, Clock};
use interlude_core::InterludeResult;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::backend::Cache;

struct CacheEntry {
    value: serde_json::Value,
    expires_at: DateTime<Utc>,
    /// Insertion order; breaks ties between entries expiring together.
    seq: u64,
}

/// Lock-free local cache for view facts.
pub struct LocalCache {
    store: Arc<DashMap<String, CacheEntry>>,
    max_entries: usize,
    next_seq: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl LocalCache {
    pub fn new(max_entries: usize) -> Self {
        Self::with_clock(max_entries, system_clock())
    }

    pub fn with_clock(max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            max_entries,
            next_seq: AtomicU64::new(0),
            clock,
        }
    }

    /// Remove expired entries. Also runs whenever a new key meets a full cache.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.store.len();
        self.store.retain(|_, entry| entry.expires_at > now);
        before - self.store.len()
    }

    /// Free a slot for a new key: expired entries go first, then the
    /// entries closest to expiry (oldest insert on a tie).
    fn make_room(&self) {
        self.evict_expired();
        while self.store.len() >= self.max_entries.max(1) {
            let victim = self
                .store
                .iter()
                .min_by_key(|e| (e.value().expires_at, e.value().seq))
                .map(|e| e.key().clone());
            let Some(key) = victim else { break };
            self.store.remove(&key);
            metrics::counter!("interlude.cache.evicted").increment(1);
            debug!(key = %key, "Local cache full, evicted entry");
        }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl Cache for LocalCache {
    fn get(&self, key: &str) -> InterludeResult<Option<serde_json::Value>> {
        let Some(entry) = self.store.get(key) else {
            metrics::counter!("interlude.cache.miss").increment(1);
            return Ok(None);
        };
        if entry.expires_at <= self.clock.now() {
            drop(entry);
            self.store.remove(key);
            metrics::counter!("interlude.cache.miss").increment(1);
            return Ok(None);
        }
        metrics::counter!("interlude.cache.hit").increment(1);
        Ok(Some(entry.value.clone()))
    }

    fn put(&self, key: &str, value: serde_json::Value, ttl: Duration) -> InterludeResult<()> {
        if self.store.len() >= self.max_entries && !self.store.contains_key(key) {
            self.make_room();
        }
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.store.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at,
                seq,
            },
        );
        Ok(())
    }
}
