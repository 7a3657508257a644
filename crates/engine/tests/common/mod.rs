#![allow(dead_code, clippy::unwrap_used)]

use chrono::{TimeZone, Utc};
use interlude_cache::LocalCache;
use interlude_core::event_bus::{capture_sink, CaptureSink};
use interlude_core::types::CreateInterstitialRequest;
use interlude_core::{AppConfig, Interstitial, ManualClock};
use interlude_engine::{AttributeTenantResolver, Collaborators, InterstitialManager};
use interlude_store::{InterstitialStore, MemoryStore};
use std::sync::Arc;

pub struct Harness {
    pub manager: Arc<InterstitialManager>,
    pub store: Arc<MemoryStore>,
    pub sink: Arc<CaptureSink>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    /// Tenants resolve from the visitor's `tenant` attribute.
    pub fn with_config(config: AppConfig) -> Self {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let cache = Arc::new(LocalCache::with_clock(1000, clock.clone()));
        let sink = capture_sink();
        let parts = Collaborators::from_store(store.clone(), cache)
            .with_events(sink.clone())
            .with_clock(clock.clone())
            .with_tenants(Arc::new(AttributeTenantResolver::new("tenant")));
        Self {
            manager: Arc::new(InterstitialManager::new(config, parts)),
            store,
            sink,
            clock,
        }
    }

    pub fn create(&self, name: &str, edit: impl FnOnce(&mut CreateInterstitialRequest)) -> Interstitial {
        let mut req = CreateInterstitialRequest::named(name, name);
        edit(&mut req);
        self.store.create(req).unwrap()
    }
}

pub fn names(items: &[Interstitial]) -> Vec<&str> {
    items.iter().map(|i| i.name.as_str()).collect()
}
