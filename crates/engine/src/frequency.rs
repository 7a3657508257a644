//! Frequency and suppression decisions over a visitor's view history.
//!
//! The view store is authoritative. When the storage mode enables the cache
//! it is read first and filled from the store on a miss; a cache-only mode
//! never touches the store. Cached facts are written under the user id and
//! the session id alike, so the cache matches a visitor the way the store
//! does: by user or by session.

use chrono::{DateTime, Utc};
use interlude_cache::Cache;
use interlude_core::clock::Clock;
use interlude_core::config::{StorageMode, TrackingConfig};
use interlude_core::types::{Frequency, ViewRecord};
use interlude_core::{Interstitial, InterstitialId, InterludeResult, ViewAction, VisitorIdentity};
use interlude_store::{SessionStore, ViewStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FactKind {
    Viewed,
    LastViewed,
    DontShow,
}

impl FactKind {
    fn as_str(self) -> &'static str {
        match self {
            FactKind::Viewed => "viewed",
            FactKind::LastViewed => "last_viewed",
            FactKind::DontShow => "dont_show",
        }
    }
}

pub struct FrequencyChecker {
    views: Arc<dyn ViewStore>,
    cache: Arc<dyn Cache>,
    storage: StorageMode,
    cache_prefix: String,
    cache_ttl: Duration,
    viewed_key: String,
    clock: Arc<dyn Clock>,
}

impl FrequencyChecker {
    pub fn new(
        views: Arc<dyn ViewStore>,
        cache: Arc<dyn Cache>,
        tracking: &TrackingConfig,
        viewed_key: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            views,
            cache,
            storage: tracking.storage,
            cache_prefix: tracking.cache_prefix.clone(),
            cache_ttl: Duration::from_secs(tracking.cache_ttl_secs),
            viewed_key: viewed_key.into(),
            clock,
        }
    }

    pub fn storage_mode(&self) -> StorageMode {
        self.storage
    }

    /// Whether the interstitial is due for `identity`. A don't-show-again
    /// fact suppresses every frequency.
    pub fn should_show(
        &self,
        interstitial: &Interstitial,
        identity: &VisitorIdentity,
        session: &dyn SessionStore,
    ) -> InterludeResult<bool> {
        if self.has_dont_show_again(interstitial.id, identity)? {
            debug!(interstitial = %interstitial.name, visitor = identity.key(), "Suppressed by don't-show-again");
            return Ok(false);
        }

        let due = match interstitial.frequency {
            Frequency::Always => true,
            Frequency::Once => !self.has_been_viewed(interstitial.id, identity)?,
            Frequency::OncePerSession => !self.viewed_this_session(interstitial.id, session)?,
            Frequency::EveryXDays => match self.last_viewed_at(interstitial.id, identity)? {
                None => true,
                Some(last) => {
                    let elapsed = (self.clock.now() - last).num_days();
                    elapsed >= i64::from(interstitial.frequency_days_or_default())
                }
            },
        };
        Ok(due)
    }

    /// Record an outcome. The session viewed set is updated in every
    /// storage mode.
    pub fn record_view(
        &self,
        interstitial: &Interstitial,
        identity: &VisitorIdentity,
        session: &dyn SessionStore,
        action: ViewAction,
    ) -> InterludeResult<ViewRecord> {
        let now = self.clock.now();
        let record = ViewRecord::new(interstitial.id, identity, action, now);

        if self.storage.uses_store() {
            self.views.record_view(record.clone())?;
        }

        if self.storage.uses_cache() {
            self.put_fact(FactKind::Viewed, interstitial.id, identity, serde_json::Value::Bool(true))?;
            self.put_fact(FactKind::LastViewed, interstitial.id, identity, serde_json::to_value(now)?)?;
            if action == ViewAction::DontShowAgain {
                self.put_fact(FactKind::DontShow, interstitial.id, identity, serde_json::Value::Bool(true))?;
            }
        }

        self.remember_in_session(interstitial.id, session)?;

        metrics::counter!("interlude.views.recorded").increment(1);
        info!(
            interstitial = %interstitial.name,
            visitor = identity.key(),
            action = %action,
            "View recorded"
        );
        Ok(record)
    }

    /// Interstitial ids viewed during the current session.
    pub fn session_viewed(&self, session: &dyn SessionStore) -> InterludeResult<Vec<InterstitialId>> {
        match session.get(&self.viewed_key)? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }

    fn has_dont_show_again(&self, id: InterstitialId, identity: &VisitorIdentity) -> InterludeResult<bool> {
        self.has_fact(FactKind::DontShow, id, identity, |views| {
            views.has_view(id, identity, Some(ViewAction::DontShowAgain))
        })
    }

    fn has_been_viewed(&self, id: InterstitialId, identity: &VisitorIdentity) -> InterludeResult<bool> {
        self.has_fact(FactKind::Viewed, id, identity, |views| views.has_view(id, identity, None))
    }

    fn has_fact(
        &self,
        kind: FactKind,
        id: InterstitialId,
        identity: &VisitorIdentity,
        from_store: impl FnOnce(&dyn ViewStore) -> InterludeResult<bool>,
    ) -> InterludeResult<bool> {
        if self.storage.uses_cache() {
            for key in self.cache_keys(kind, id, identity) {
                if self.cache.has(&key)? {
                    return Ok(true);
                }
            }
        }
        if !self.storage.uses_store() {
            return Ok(false);
        }
        let found = from_store(self.views.as_ref())?;
        if found && self.storage.uses_cache() {
            self.put_fact(kind, id, identity, serde_json::Value::Bool(true))?;
        }
        Ok(found)
    }

    fn last_viewed_at(
        &self,
        id: InterstitialId,
        identity: &VisitorIdentity,
    ) -> InterludeResult<Option<DateTime<Utc>>> {
        if self.storage.uses_cache() {
            let mut cached: Option<DateTime<Utc>> = None;
            for key in self.cache_keys(FactKind::LastViewed, id, identity) {
                if let Some(value) = self.cache.get(&key)? {
                    if let Ok(at) = serde_json::from_value::<DateTime<Utc>>(value) {
                        cached = cached.max(Some(at));
                    }
                }
            }
            if cached.is_some() {
                return Ok(cached);
            }
        }
        if !self.storage.uses_store() {
            return Ok(None);
        }
        let last = self.views.latest_view(id, identity)?.map(|r| r.viewed_at);
        if let Some(at) = last.filter(|_| self.storage.uses_cache()) {
            self.put_fact(FactKind::LastViewed, id, identity, serde_json::to_value(at)?)?;
        }
        Ok(last)
    }

    fn viewed_this_session(&self, id: InterstitialId, session: &dyn SessionStore) -> InterludeResult<bool> {
        Ok(self.session_viewed(session)?.contains(&id))
    }

    fn remember_in_session(&self, id: InterstitialId, session: &dyn SessionStore) -> InterludeResult<()> {
        let mut viewed = self.session_viewed(session)?;
        if !viewed.contains(&id) {
            viewed.push(id);
            session.put(&self.viewed_key, serde_json::to_value(viewed)?)?;
        }
        Ok(())
    }

    fn put_fact(
        &self,
        kind: FactKind,
        id: InterstitialId,
        identity: &VisitorIdentity,
        value: serde_json::Value,
    ) -> InterludeResult<()> {
        for key in self.cache_keys(kind, id, identity) {
            self.cache.put(&key, value.clone(), self.cache_ttl)?;
        }
        Ok(())
    }

    /// `{prefix}:{kind}:{interstitial id}:{visitor key}`, plus the session
    /// id variant when the visitor is logged in.
    fn cache_keys(&self, kind: FactKind, id: InterstitialId, identity: &VisitorIdentity) -> Vec<String> {
        let key = |visitor: &str| format!("{}:{}:{}:{}", self.cache_prefix, kind.as_str(), id, visitor);
        let mut keys = vec![key(identity.key())];
        if let (Some(_), Some(session)) = (&identity.user_id, &identity.session_id) {
            keys.push(key(session.as_str()));
        }
        keys
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use interlude_cache::LocalCache;
    use interlude_core::types::CreateInterstitialRequest;
    use interlude_core::ManualClock;
    use interlude_store::{MemorySession, MemoryStore};

    struct Fixture {
        checker: FrequencyChecker,
        store: Arc<MemoryStore>,
        cache: Arc<LocalCache>,
        clock: Arc<ManualClock>,
        session: MemorySession,
    }

    fn fixture(storage: StorageMode) -> Fixture {
        fixture_with_capacity(storage, 1000)
    }

    fn fixture_with_capacity(storage: StorageMode, capacity: usize) -> Fixture {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let cache = Arc::new(LocalCache::with_clock(capacity, clock.clone()));
        let tracking = TrackingConfig {
            storage,
            ..Default::default()
        };
        let checker = FrequencyChecker::new(
            store.clone(),
            cache.clone(),
            &tracking,
            "viewed_this_session",
            clock.clone(),
        );
        Fixture {
            checker,
            store,
            cache,
            clock,
            session: MemorySession::new("sess-1"),
        }
    }

    fn interstitial(frequency: Frequency) -> Interstitial {
        interstitial_with_id(7, frequency)
    }

    fn interstitial_with_id(id: InterstitialId, frequency: Frequency) -> Interstitial {
        let mut req = CreateInterstitialRequest::named(format!("tip-{id}"), "Tip");
        req.frequency = frequency;
        Interstitial::from_request(id, req, Utc::now())
    }

    fn user() -> VisitorIdentity {
        VisitorIdentity::new(Some("42".into()), Some("sess-1".into()))
    }

    #[test]
    fn test_always_and_once() {
        let f = fixture(StorageMode::Store);
        let always = interstitial(Frequency::Always);
        let once = interstitial(Frequency::Once);

        assert!(f.checker.should_show(&once, &user(), &f.session).unwrap());
        f.checker.record_view(&once, &user(), &f.session, ViewAction::Dismissed).unwrap();
        assert!(!f.checker.should_show(&once, &user(), &f.session).unwrap());
        // Same interstitial id, so Always also has a view on record but still shows.
        assert!(f.checker.should_show(&always, &user(), &f.session).unwrap());
    }

    #[test]
    fn test_once_matches_by_session_before_login() {
        let f = fixture(StorageMode::Store);
        let once = interstitial(Frequency::Once);
        let guest = VisitorIdentity::new(None, Some("sess-1".into()));
        f.checker.record_view(&once, &guest, &f.session, ViewAction::Viewed).unwrap();

        assert!(!f.checker.should_show(&once, &user(), &f.session).unwrap());
        let elsewhere = VisitorIdentity::new(Some("99".into()), Some("sess-2".into()));
        assert!(f.checker.should_show(&once, &elsewhere, &MemorySession::new("sess-2")).unwrap());
    }

    #[test]
    fn test_once_per_session() {
        let f = fixture(StorageMode::Store);
        let i = interstitial(Frequency::OncePerSession);
        assert!(f.checker.should_show(&i, &user(), &f.session).unwrap());
        f.checker.record_view(&i, &user(), &f.session, ViewAction::Viewed).unwrap();
        assert!(!f.checker.should_show(&i, &user(), &f.session).unwrap());
        assert_eq!(f.checker.session_viewed(&f.session).unwrap(), vec![7]);

        let fresh = MemorySession::new("sess-9");
        assert!(f.checker.should_show(&i, &user(), &fresh).unwrap());
    }

    #[test]
    fn test_every_x_days() {
        let f = fixture(StorageMode::Store);
        let mut i = interstitial(Frequency::EveryXDays);
        i.frequency_days = Some(3);

        assert!(f.checker.should_show(&i, &user(), &f.session).unwrap());
        f.checker.record_view(&i, &user(), &f.session, ViewAction::Viewed).unwrap();
        assert!(!f.checker.should_show(&i, &user(), &f.session).unwrap());

        f.clock.advance(ChronoDuration::days(3) - ChronoDuration::seconds(1));
        assert!(!f.checker.should_show(&i, &user(), &f.session).unwrap());
        f.clock.advance(ChronoDuration::seconds(1));
        assert!(f.checker.should_show(&i, &user(), &f.session).unwrap());
    }

    #[test]
    fn test_every_x_days_missing_days_means_one() {
        let f = fixture(StorageMode::Both);
        let i = interstitial(Frequency::EveryXDays);
        f.checker.record_view(&i, &user(), &f.session, ViewAction::Viewed).unwrap();
        f.clock.advance(ChronoDuration::hours(23));
        assert!(!f.checker.should_show(&i, &user(), &f.session).unwrap());
        f.clock.advance(ChronoDuration::hours(1));
        assert!(f.checker.should_show(&i, &user(), &f.session).unwrap());
    }

    #[test]
    fn test_dont_show_again_is_absorbing() {
        for mode in [StorageMode::Cache, StorageMode::Store, StorageMode::Both] {
            let f = fixture(mode);
            let i = interstitial(Frequency::Always);
            f.checker.record_view(&i, &user(), &f.session, ViewAction::DontShowAgain).unwrap();
            f.clock.advance(ChronoDuration::days(10));
            f.checker.record_view(&i, &user(), &f.session, ViewAction::Viewed).unwrap();
            assert!(!f.checker.should_show(&i, &user(), &f.session).unwrap(), "{mode:?}");
        }

        // The store keeps the fact beyond any cache TTL.
        let f = fixture(StorageMode::Store);
        let i = interstitial(Frequency::Always);
        f.checker.record_view(&i, &user(), &f.session, ViewAction::DontShowAgain).unwrap();
        f.clock.advance(ChronoDuration::days(3650));
        assert!(!f.checker.should_show(&i, &user(), &f.session).unwrap());
    }

    #[test]
    fn test_cache_only_mode_never_writes_store() {
        let f = fixture(StorageMode::Cache);
        let i = interstitial(Frequency::Once);
        f.checker.record_view(&i, &user(), &f.session, ViewAction::Viewed).unwrap();
        assert_eq!(f.store.view_total(), 0);
        assert!(f.cache.has("interlude:viewed:7:42").unwrap());
        assert!(f.cache.has("interlude:last_viewed:7:42").unwrap());
        assert!(!f.cache.has("interlude:dont_show:7:42").unwrap());
        assert!(!f.checker.should_show(&i, &user(), &f.session).unwrap());
    }

    #[test]
    fn test_store_only_mode_never_writes_cache() {
        let f = fixture(StorageMode::Store);
        let i = interstitial(Frequency::Once);
        f.checker.record_view(&i, &user(), &f.session, ViewAction::Viewed).unwrap();
        assert_eq!(f.store.view_total(), 1);
        assert!(f.cache.is_empty());
    }

    #[test]
    fn test_both_mode_falls_back_to_store_after_cache_expiry() {
        let f = fixture(StorageMode::Both);
        let i = interstitial(Frequency::Once);
        f.checker.record_view(&i, &user(), &f.session, ViewAction::Viewed).unwrap();

        // Default TTL is thirty days.
        f.clock.advance(ChronoDuration::days(31));
        assert!(!f.cache.has("interlude:viewed:7:42").unwrap());
        assert!(!f.checker.should_show(&i, &user(), &f.session).unwrap());
        // The store hit refilled the cache.
        assert!(f.cache.has("interlude:viewed:7:42").unwrap());
    }

    #[test]
    fn test_cache_only_mode_keeps_latest_facts_when_cache_is_full() {
        let f = fixture_with_capacity(StorageMode::Cache, 2);
        let first = interstitial_with_id(1, Frequency::Once);
        let second = interstitial_with_id(2, Frequency::Always);

        f.checker.record_view(&first, &user(), &f.session, ViewAction::Viewed).unwrap();
        f.checker
            .record_view(&second, &user(), &f.session, ViewAction::DontShowAgain)
            .unwrap();

        assert!(f.cache.len() <= 2);
        assert!(!f.checker.should_show(&second, &user(), &f.session).unwrap());
    }

    #[test]
    fn test_cached_last_view_counts_session_facts_from_before_login() {
        let f = fixture(StorageMode::Both);
        let mut i = interstitial(Frequency::EveryXDays);
        i.frequency_days = Some(3);

        f.checker.record_view(&i, &user(), &f.session, ViewAction::Viewed).unwrap();
        f.clock.advance(ChronoDuration::days(3));

        // Logged out on the same session, viewed again as a guest.
        let guest = VisitorIdentity::new(None, Some("sess-1".into()));
        f.checker.record_view(&i, &guest, &f.session, ViewAction::Viewed).unwrap();

        // The cached user fact is three days old; the guest view is not.
        assert!(f.cache.has("interlude:last_viewed:7:42").unwrap());
        assert!(!f.checker.should_show(&i, &user(), &f.session).unwrap());
        f.clock.advance(ChronoDuration::days(3));
        assert!(f.checker.should_show(&i, &user(), &f.session).unwrap());
    }
}
