//! Trigger propagation: the route gate run on every page request and the
//! listener fed with host business events.

use interlude_core::config::FullPageConfig;
use interlude_core::types::{InterstitialType, TriggerSource};
use interlude_core::{EventName, InterludeResult, Interstitial};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::RequestContext;
use crate::manager::InterstitialManager;

/// What the host router tells the gate about the incoming request.
#[derive(Debug, Clone, Default)]
pub struct GateRequest<'a> {
    /// Request path, with or without the leading slash.
    pub path: &'a str,
    /// Named route, when the router has one. Preferred over the path.
    pub route_name: Option<&'a str>,
    /// Full URL, remembered as the place to return to after a redirect.
    pub full_url: &'a str,
    pub is_ajax: bool,
    /// Ajax requests are only checked when the client asks for it.
    pub check_requested: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// The request is not subject to interstitials.
    Skip,
    /// Send the visitor to a full-page interstitial first.
    Redirect { location: String, interstitial: Uuid },
    /// Carry on; these interstitials are queued for display on the page.
    Continue { queued: Vec<Interstitial> },
}

pub struct RouteGate {
    manager: Arc<InterstitialManager>,
    full_page: FullPageConfig,
}

impl RouteGate {
    pub fn new(manager: Arc<InterstitialManager>) -> Self {
        let full_page = manager.config().full_page.clone();
        Self { manager, full_page }
    }

    /// Decide for one request. Decision failures are propagated.
    pub fn try_handle(&self, request: &GateRequest<'_>, ctx: &mut RequestContext<'_>) -> InterludeResult<GateDecision> {
        if request.is_ajax && !request.check_requested {
            return Ok(GateDecision::Skip);
        }
        let path = request.path.trim_start_matches('/');
        if self.is_excluded(path) {
            return Ok(GateDecision::Skip);
        }

        self.manager.load_from_session(ctx)?;

        let queued = self.manager.get_queued(ctx, None);
        debug!(path, queued = queued.len(), "Checking queued interstitials");
        if let Some(full_page) = queued.iter().find(|i| i.kind == InterstitialType::FullPage) {
            return self.redirect(request, ctx, full_page);
        }

        let route = request.route_name.unwrap_or(path);
        let candidates = self.manager.get_for_route(route, ctx)?;
        if let Some(full_page) = candidates.iter().find(|i| i.kind == InterstitialType::FullPage) {
            return self.redirect(request, ctx, full_page);
        }

        for interstitial in candidates {
            self.manager.queue(ctx, interstitial, TriggerSource::Route, false)?;
        }
        Ok(GateDecision::Continue {
            queued: self.manager.get_queued(ctx, None),
        })
    }

    /// Like [`try_handle`](Self::try_handle), but a failure degrades to
    /// continuing with nothing shown.
    pub fn handle(&self, request: &GateRequest<'_>, ctx: &mut RequestContext<'_>) -> GateDecision {
        self.try_handle(request, ctx).unwrap_or_else(|e| {
            warn!(error = %e, path = request.path, "Interstitial check failed; continuing without interstitials");
            GateDecision::Continue { queued: Vec::new() }
        })
    }

    fn is_excluded(&self, path: &str) -> bool {
        [
            &self.full_page.route_prefix,
            &self.full_page.admin_prefix,
            &self.full_page.api_prefix,
        ]
        .iter()
        .map(|prefix| prefix.trim_start_matches('/'))
        .any(|prefix| !prefix.is_empty() && path.starts_with(prefix))
    }

    fn redirect(
        &self,
        request: &GateRequest<'_>,
        ctx: &RequestContext<'_>,
        interstitial: &Interstitial,
    ) -> InterludeResult<GateDecision> {
        self.manager.remember_intended_url(ctx, request.full_url)?;
        let location = format!(
            "/{}/{}",
            self.full_page.route_prefix.trim_matches('/'),
            interstitial.uuid
        );
        metrics::counter!("interlude.gate.redirects").increment(1);
        info!(interstitial = %interstitial.name, location = %location, "Redirecting to full-page interstitial");
        Ok(GateDecision::Redirect {
            location,
            interstitial: interstitial.uuid,
        })
    }
}

/// Queues the interstitials a business event triggers. The queue is
/// persisted since events usually fire just before a redirect.
pub struct EventTrigger {
    manager: Arc<InterstitialManager>,
}

impl EventTrigger {
    pub fn new(manager: Arc<InterstitialManager>) -> Self {
        Self { manager }
    }

    pub fn handle(&self, event: &EventName, ctx: &mut RequestContext<'_>) -> InterludeResult<Vec<Interstitial>> {
        let hits = self.manager.get_for_event(event, ctx)?;
        debug!(event = %event, hits = hits.len(), "Event triggered interstitials");
        for interstitial in &hits {
            self.manager
                .queue(ctx, interstitial.clone(), TriggerSource::Event(event.clone()), true)?;
        }
        Ok(hits)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::manager::Collaborators;
    use chrono::Utc;
    use interlude_cache::LocalCache;
    use interlude_core::types::CreateInterstitialRequest;
    use interlude_core::{AppConfig, InterludeError, ManualClock, Visitor};
    use interlude_store::{
        InterstitialQuery, InterstitialStore, MemorySession, MemoryStore, SessionStore,
    };
    use serde_json::json;

    fn setup() -> (Arc<InterstitialManager>, Arc<MemoryStore>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let cache = Arc::new(LocalCache::with_clock(100, clock.clone()));
        let parts = Collaborators::from_store(store.clone(), cache).with_clock(clock);
        (Arc::new(InterstitialManager::new(AppConfig::default(), parts)), store)
    }

    fn page(path: &str) -> GateRequest<'_> {
        GateRequest {
            path,
            full_url: "https://app.test/dashboard",
            ..Default::default()
        }
    }

    #[test]
    fn test_skips_ajax_and_reserved_prefixes() {
        let (manager, _) = setup();
        let gate = RouteGate::new(manager);
        let visitor = Visitor::guest();
        let session = MemorySession::new("s");
        let mut ctx = RequestContext::new(&visitor, &session);

        let ajax = GateRequest {
            is_ajax: true,
            ..page("dashboard")
        };
        assert_eq!(gate.handle(&ajax, &mut ctx), GateDecision::Skip);

        for path in ["/interstitial/abc", "admin/interstitials/3/edit", "/api/interstitials"] {
            assert_eq!(gate.handle(&page(path), &mut ctx), GateDecision::Skip, "{path}");
        }
        assert!(!ctx.queue.is_session_loaded());

        let checked = GateRequest {
            is_ajax: true,
            check_requested: true,
            ..page("dashboard")
        };
        assert_eq!(gate.handle(&checked, &mut ctx), GateDecision::Continue { queued: vec![] });
        assert!(ctx.queue.is_session_loaded());
    }

    #[test]
    fn test_route_modal_is_queued() {
        let (manager, store) = setup();
        let mut req = CreateInterstitialRequest::named("tour", "Tour");
        req.trigger_routes = vec!["dashboard*".into()];
        store.create(req).unwrap();

        let gate = RouteGate::new(manager);
        let visitor = Visitor::guest();
        let session = MemorySession::new("s");
        let mut ctx = RequestContext::new(&visitor, &session);

        match gate.handle(&page("/dashboard/home"), &mut ctx) {
            GateDecision::Continue { queued } => {
                assert_eq!(queued.len(), 1);
                assert_eq!(queued[0].name, "tour");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(ctx.queue.items()[0].source, TriggerSource::Route);
    }

    #[test]
    fn test_route_name_preferred_over_path() {
        let (manager, store) = setup();
        let mut req = CreateInterstitialRequest::named("billing", "Billing");
        req.trigger_routes = vec!["billing.*".into()];
        store.create(req).unwrap();

        let gate = RouteGate::new(manager);
        let visitor = Visitor::guest();
        let session = MemorySession::new("s");
        let mut ctx = RequestContext::new(&visitor, &session);
        let request = GateRequest {
            route_name: Some("billing.index"),
            ..page("account/billing")
        };
        assert!(matches!(
            gate.handle(&request, &mut ctx),
            GateDecision::Continue { queued } if queued.len() == 1
        ));
    }

    #[test]
    fn test_full_page_route_redirects_and_remembers_url() {
        let (manager, store) = setup();
        let mut req = CreateInterstitialRequest::named("terms", "New terms");
        req.kind = InterstitialType::FullPage;
        req.trigger_routes = vec!["dashboard".into()];
        let terms = store.create(req).unwrap();

        let gate = RouteGate::new(manager);
        let visitor = Visitor::user("1");
        let session = MemorySession::new("s");
        let mut ctx = RequestContext::new(&visitor, &session);

        assert_eq!(
            gate.handle(&page("dashboard"), &mut ctx),
            GateDecision::Redirect {
                location: format!("/interstitial/{}", terms.uuid),
                interstitial: terms.uuid,
            }
        );
        assert_eq!(
            session.get("interlude_intended_url").unwrap(),
            Some(json!("https://app.test/dashboard"))
        );
    }

    #[test]
    fn test_event_queue_survives_redirect_to_full_page() {
        let (manager, store) = setup();
        let mut req = CreateInterstitialRequest::named("thanks", "Thanks");
        req.kind = InterstitialType::FullPage;
        req.trigger_event = Some("order.placed".parse().unwrap());
        let thanks = store.create(req).unwrap();

        let listener = EventTrigger::new(manager.clone());
        let gate = RouteGate::new(manager);
        let visitor = Visitor::user("1");
        let session = MemorySession::new("s");

        let mut checkout = RequestContext::new(&visitor, &session);
        let hits = listener
            .handle(&"order.placed".parse().unwrap(), &mut checkout)
            .unwrap();
        assert_eq!(hits.len(), 1);

        let mut next = RequestContext::new(&visitor, &session);
        assert!(matches!(
            gate.handle(&page("orders/1"), &mut next),
            GateDecision::Redirect { interstitial, .. } if interstitial == thanks.uuid
        ));
    }

    struct FailingStore;

    impl InterstitialStore for FailingStore {
        fn create(&self, _: CreateInterstitialRequest) -> InterludeResult<Interstitial> {
            Err(InterludeError::Store("down".into()))
        }
        fn update(&self, _: u64, _: interlude_core::types::UpdateInterstitialRequest) -> InterludeResult<Interstitial> {
            Err(InterludeError::Store("down".into()))
        }
        fn soft_delete(&self, _: u64) -> InterludeResult<()> {
            Err(InterludeError::Store("down".into()))
        }
        fn restore(&self, _: u64) -> InterludeResult<Interstitial> {
            Err(InterludeError::Store("down".into()))
        }
        fn force_delete(&self, _: u64) -> InterludeResult<()> {
            Err(InterludeError::Store("down".into()))
        }
        fn find(&self, _: u64) -> InterludeResult<Option<Interstitial>> {
            Err(InterludeError::Store("down".into()))
        }
        fn find_with_trashed(&self, _: u64) -> InterludeResult<Option<Interstitial>> {
            Err(InterludeError::Store("down".into()))
        }
        fn find_by_uuid(&self, _: Uuid) -> InterludeResult<Option<Interstitial>> {
            Err(InterludeError::Store("down".into()))
        }
        fn find_by_name(&self, _: &str) -> InterludeResult<Option<Interstitial>> {
            Err(InterludeError::Store("down".into()))
        }
        fn query(&self, _: &InterstitialQuery) -> InterludeResult<Vec<Interstitial>> {
            Err(InterludeError::Store("down".into()))
        }
    }

    #[test]
    fn test_store_failure_propagates_or_degrades() {
        let store = Arc::new(MemoryStore::new());
        let mut parts = Collaborators::from_store(store, Arc::new(LocalCache::new(10)));
        parts.interstitials = Arc::new(FailingStore);
        let gate = RouteGate::new(Arc::new(InterstitialManager::new(AppConfig::default(), parts)));

        let visitor = Visitor::guest();
        let session = MemorySession::new("s");
        let mut ctx = RequestContext::new(&visitor, &session);
        assert!(matches!(
            gate.try_handle(&page("dashboard"), &mut ctx),
            Err(InterludeError::Store(_))
        ));

        let mut ctx = RequestContext::new(&visitor, &session);
        assert_eq!(
            gate.handle(&page("dashboard"), &mut ctx),
            GateDecision::Continue { queued: vec![] }
        );
    }
}
