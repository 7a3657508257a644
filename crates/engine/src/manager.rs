//! Interstitial manager. Composes the entity store, audience resolver and
//! frequency checker into per-context candidate sets, owns the request
//! queue lifecycle, and records visitor outcomes.
//!
//! Candidate order is priority descending with ties broken by id ascending.
//! Audience filtering runs before frequency filtering since it needs no I/O.

use interlude_cache::Cache;
use interlude_core::clock::{system_clock, Clock};
use interlude_core::event_bus::{make_event, noop_sink, EventSink, EventType};
use interlude_core::types::{InterstitialType, ResponseRecord, TriggerSource, ViewRecord};
use interlude_core::{
    AppConfig, EventName, InterludeResult, Interstitial, ViewAction,
};
use interlude_store::{InterstitialQuery, InterstitialStore, ResponseStore, ViewStore};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audience::{AttributeRoleProvider, AudienceResolver, ConditionRegistry, RoleProvider, TenantResolver};
use crate::context::RequestContext;
use crate::frequency::FrequencyChecker;
use crate::queue::{apply_queue_behavior, PersistedEntry};
use crate::renderer::{ContentRenderer, StoredContentRenderer};

/// The trigger context a candidate set is computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerContext {
    /// Rows that declare at least one trigger route.
    PageLoad,
    /// No extra restriction; event matching is done by `get_for_event`.
    Event,
    /// Inline rows with a slot.
    Inline,
    Any,
}

/// Everything the manager talks to. Defaults: stored-content renderer,
/// no-op notification sink, system clock, roles from the `roles` visitor
/// attribute, no custom conditions, no tenant resolver.
pub struct Collaborators {
    pub interstitials: Arc<dyn InterstitialStore>,
    pub views: Arc<dyn ViewStore>,
    pub responses: Arc<dyn ResponseStore>,
    pub cache: Arc<dyn Cache>,
    pub renderer: Arc<dyn ContentRenderer>,
    pub events: Arc<dyn EventSink>,
    pub clock: Arc<dyn Clock>,
    pub roles: Arc<dyn RoleProvider>,
    pub conditions: ConditionRegistry,
    pub tenants: Option<Arc<dyn TenantResolver>>,
}

impl Collaborators {
    /// Use one store for definitions, views and responses.
    pub fn from_store<S>(store: Arc<S>, cache: Arc<dyn Cache>) -> Self
    where
        S: InterstitialStore + ViewStore + ResponseStore + 'static,
    {
        Self {
            interstitials: store.clone(),
            views: store.clone(),
            responses: store,
            cache,
            renderer: Arc::new(StoredContentRenderer::default()),
            events: noop_sink(),
            clock: system_clock(),
            roles: Arc::new(AttributeRoleProvider::default()),
            conditions: ConditionRegistry::new(),
            tenants: None,
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn ContentRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_roles(mut self, roles: Arc<dyn RoleProvider>) -> Self {
        self.roles = roles;
        self
    }

    pub fn with_conditions(mut self, conditions: ConditionRegistry) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_tenants(mut self, tenants: Arc<dyn TenantResolver>) -> Self {
        self.tenants = Some(tenants);
        self
    }
}

pub struct InterstitialManager {
    interstitials: Arc<dyn InterstitialStore>,
    responses: Arc<dyn ResponseStore>,
    audience: AudienceResolver,
    frequency: FrequencyChecker,
    renderer: Arc<dyn ContentRenderer>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    config: AppConfig,
}

impl InterstitialManager {
    pub fn new(config: AppConfig, parts: Collaborators) -> Self {
        let mut audience = AudienceResolver::new(parts.roles, parts.conditions);
        if config.multi_tenant.enabled {
            audience = audience.with_tenancy(parts.tenants);
        }
        let frequency = FrequencyChecker::new(
            parts.views,
            parts.cache,
            &config.tracking,
            config.session.viewed_key.clone(),
            parts.clock.clone(),
        );
        info!(
            storage = ?config.tracking.storage,
            queue_mode = ?config.queue.mode,
            multi_tenant = config.multi_tenant.enabled,
            "Interstitial manager initialized"
        );
        Self {
            interstitials: parts.interstitials,
            responses: parts.responses,
            audience,
            frequency,
            renderer: parts.renderer,
            events: parts.events,
            clock: parts.clock,
            config,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn audience(&self) -> &AudienceResolver {
        &self.audience
    }

    pub fn frequency(&self) -> &FrequencyChecker {
        &self.frequency
    }

    // ─── Candidate queries ─────────────────────────────────────────────────

    /// Eligible interstitials for a trigger context, optionally of one type.
    pub fn get_applicable(
        &self,
        ctx: &RequestContext<'_>,
        trigger: TriggerContext,
        kind: Option<InterstitialType>,
    ) -> InterludeResult<Vec<Interstitial>> {
        let mut query = InterstitialQuery::live(self.clock.now());
        if let Some(kind) = kind {
            query = query.of_type(kind);
        }
        if self.audience.is_multi_tenant() {
            query = query.for_tenant(self.audience.current_tenant(ctx.visitor()).as_deref());
        }
        query = match trigger {
            TriggerContext::PageLoad => query.with_trigger_routes(),
            TriggerContext::Inline => query.of_type(InterstitialType::Inline).with_inline_slot(),
            TriggerContext::Event | TriggerContext::Any => query,
        };

        let rows = self.interstitials.query(&query)?;
        self.filter_eligible(rows, ctx)
    }

    pub fn get_for_event(&self, event: &EventName, ctx: &RequestContext<'_>) -> InterludeResult<Vec<Interstitial>> {
        let rows = self
            .interstitials
            .query(&InterstitialQuery::live(self.clock.now()).for_event(event))?;
        debug!(event = %event, candidates = rows.len(), "Event candidates");
        self.filter_eligible(rows, ctx)
    }

    /// Any matching pattern includes the row.
    pub fn get_for_route(&self, route: &str, ctx: &RequestContext<'_>) -> InterludeResult<Vec<Interstitial>> {
        let rows: Vec<Interstitial> = self
            .interstitials
            .query(&InterstitialQuery::live(self.clock.now()).with_trigger_routes())?
            .into_iter()
            .filter(|i| i.matches_route(route))
            .collect();
        debug!(route, candidates = rows.len(), "Route candidates");
        self.filter_eligible(rows, ctx)
    }

    pub fn get_for_slot(&self, slot: &str, ctx: &RequestContext<'_>) -> InterludeResult<Vec<Interstitial>> {
        let rows = self.interstitials.query(
            &InterstitialQuery::live(self.clock.now())
                .of_type(InterstitialType::Inline)
                .for_slot(slot),
        )?;
        self.filter_eligible(rows, ctx)
    }

    /// Audience and frequency check for a single interstitial, independent
    /// of any queue.
    pub fn should_show(&self, interstitial: &Interstitial, ctx: &RequestContext<'_>) -> InterludeResult<bool> {
        if !self.audience.matches(interstitial, ctx.visitor()) {
            return Ok(false);
        }
        self.frequency
            .should_show(interstitial, &ctx.identity(), ctx.session())
    }

    /// Look up by UUID, falling back to name.
    pub fn find(&self, identifier: &str) -> InterludeResult<Option<Interstitial>> {
        if let Ok(uuid) = Uuid::parse_str(identifier) {
            if let Some(found) = self.interstitials.find_by_uuid(uuid)? {
                return Ok(Some(found));
            }
        }
        self.interstitials.find_by_name(identifier)
    }

    fn filter_eligible(&self, rows: Vec<Interstitial>, ctx: &RequestContext<'_>) -> InterludeResult<Vec<Interstitial>> {
        let identity = ctx.identity();
        let mut eligible = Vec::with_capacity(rows.len());
        for interstitial in rows {
            if !self.audience.matches(&interstitial, ctx.visitor()) {
                debug!(interstitial = %interstitial.name, reason = "audience", "Candidate filtered");
                metrics::counter!("interlude.candidates.filtered", "reason" => "audience").increment(1);
                continue;
            }
            if !self.frequency.should_show(&interstitial, &identity, ctx.session())? {
                debug!(interstitial = %interstitial.name, reason = "frequency", "Candidate filtered");
                metrics::counter!("interlude.candidates.filtered", "reason" => "frequency").increment(1);
                continue;
            }
            eligible.push(interstitial);
        }
        Ok(eligible)
    }

    // ─── Outcomes ──────────────────────────────────────────────────────────

    /// Record an outcome and emit exactly one notification for it.
    pub fn mark_viewed(
        &self,
        ctx: &RequestContext<'_>,
        interstitial: &Interstitial,
        action: ViewAction,
    ) -> InterludeResult<ViewRecord> {
        let identity = ctx.identity();
        let record = self
            .frequency
            .record_view(interstitial, &identity, ctx.session(), action)?;
        self.events.emit(
            make_event(EventType::for_action(action), interstitial, &identity, record.viewed_at)
                .with_action(action),
        );
        Ok(record)
    }

    /// Store and/or announce a form submission per the form storage mode,
    /// then mark the interstitial completed.
    pub fn record_response(
        &self,
        ctx: &RequestContext<'_>,
        interstitial: &Interstitial,
        data: serde_json::Map<String, serde_json::Value>,
    ) -> InterludeResult<Option<ResponseRecord>> {
        let identity = ctx.identity();
        let record = ResponseRecord::new(interstitial.id, &identity, data, self.clock.now());

        let stored = if self.config.form_storage.persists() {
            self.responses.record_response(record.clone())?;
            Some(record.clone())
        } else {
            None
        };

        if self.config.form_storage.notifies() {
            self.events.emit(
                make_event(EventType::ResponseSubmitted, interstitial, &identity, record.created_at)
                    .with_data(record.data),
            );
        }

        info!(interstitial = %interstitial.name, visitor = identity.key(), "Response recorded");
        self.mark_viewed(ctx, interstitial, ViewAction::Completed)?;
        Ok(stored)
    }

    // ─── Queue ─────────────────────────────────────────────────────────────

    /// Append to the request queue. With `persist` the whole queue is also
    /// saved to the session so it survives a redirect.
    pub fn queue(
        &self,
        ctx: &mut RequestContext<'_>,
        interstitial: Interstitial,
        source: TriggerSource,
        persist: bool,
    ) -> InterludeResult<()> {
        let identity = ctx.identity();
        let event = make_event(EventType::Triggered, &interstitial, &identity, self.clock.now())
            .with_source(source.clone());
        info!(interstitial = %interstitial.name, source = %source, persist, "Interstitial queued");

        ctx.queue.push(interstitial, source);
        if persist {
            self.persist_queue(ctx)?;
        }
        self.events.emit(event);
        Ok(())
    }

    fn persist_queue(&self, ctx: &RequestContext<'_>) -> InterludeResult<()> {
        let entries = ctx.queue.to_entries();
        debug!(entries = entries.len(), "Saving queue to session");
        ctx.session()
            .put(&self.config.session.queued_key, serde_json::to_value(entries)?)?;
        metrics::counter!("interlude.queue.persisted").increment(1);
        Ok(())
    }

    /// Merge the queue persisted by a previous request, then clear it.
    /// Runs at most once per request; ids that no longer resolve are skipped.
    pub fn load_from_session(&self, ctx: &mut RequestContext<'_>) -> InterludeResult<()> {
        if ctx.queue.is_session_loaded() {
            return Ok(());
        }

        let stored = ctx.session().pull(&self.config.session.queued_key)?;
        let entries: Vec<PersistedEntry> = match stored {
            None => Vec::new(),
            Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!(error = %e, "Discarding unreadable persisted queue");
                Vec::new()
            }),
        };

        for entry in entries {
            match self.interstitials.find(entry.interstitial_id)? {
                Some(interstitial) => {
                    debug!(interstitial = %interstitial.name, source = %entry.source, "Loaded queued interstitial from session");
                    ctx.queue.push(interstitial, entry.source);
                }
                None => debug!(id = entry.interstitial_id, "Queued interstitial no longer exists"),
            }
        }

        ctx.queue.mark_session_loaded();
        Ok(())
    }

    /// The queued interstitials to present, after queue-behavior resolution.
    pub fn get_queued(&self, ctx: &RequestContext<'_>, kind: Option<InterstitialType>) -> Vec<Interstitial> {
        apply_queue_behavior(&ctx.queue.interstitials(kind), &self.config.queue)
    }

    pub fn has_queued(&self, ctx: &RequestContext<'_>, kind: Option<InterstitialType>) -> bool {
        !self.get_queued(ctx, kind).is_empty()
    }

    // ─── Presentation ──────────────────────────────────────────────────────

    pub fn render(
        &self,
        interstitial: &Interstitial,
        data: &serde_json::Map<String, serde_json::Value>,
    ) -> InterludeResult<String> {
        self.renderer.render(interstitial, data)
    }

    /// Render the top candidate for an inline slot and mark it viewed.
    pub fn render_inline(&self, ctx: &RequestContext<'_>, slot: &str) -> InterludeResult<Option<String>> {
        let Some(interstitial) = self.get_for_slot(slot, ctx)?.into_iter().next() else {
            return Ok(None);
        };
        self.mark_viewed(ctx, &interstitial, ViewAction::Viewed)?;
        self.render(&interstitial, &serde_json::Map::new()).map(Some)
    }

    /// Remember where the visitor was going before a full-page redirect.
    pub fn remember_intended_url(&self, ctx: &RequestContext<'_>, url: &str) -> InterludeResult<()> {
        ctx.session().put(
            &self.config.session.intended_url_key,
            serde_json::Value::String(url.to_string()),
        )
    }

    /// Where to send the visitor after acting on an interstitial: the
    /// clicked call-to-action's URL, the interstitial's redirect, the
    /// remembered intended URL, then `/`.
    pub fn redirect_after(
        &self,
        ctx: &RequestContext<'_>,
        interstitial: &Interstitial,
        cta: Option<&str>,
    ) -> InterludeResult<String> {
        if let Some(url) = cta.and_then(|c| interstitial.cta_redirect(c)) {
            return Ok(url.to_string());
        }
        if let Some(url) = interstitial.redirect_after.as_deref().filter(|u| !u.is_empty()) {
            return Ok(url.to_string());
        }
        if self.config.full_page.redirect_to_original {
            if let Some(serde_json::Value::String(url)) =
                ctx.session().pull(&self.config.session.intended_url_key)?
            {
                return Ok(url);
            }
        }
        Ok("/".to_string())
    }
}
