//! Administrative operations on interstitial definitions: validated
//! create/update, toggle, duplicate, trash lifecycle, listing and stats.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use interlude_core::clock::Clock;
use interlude_core::types::{CreateInterstitialRequest, InterstitialType, UpdateInterstitialRequest};
use interlude_core::validation::validate;
use interlude_core::{
    EventRegistry, InterludeError, InterludeResult, Interstitial, InterstitialId, ViewAction,
};
use interlude_store::{
    InterstitialQuery, InterstitialStore, QueryOrder, ResponseStore, TrashedScope, ViewQuery,
    ViewStore,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::info;

const STATS_WINDOW_DAYS: i64 = 30;

/// Listing filter for the admin index.
#[derive(Debug, Clone, Default)]
pub struct AdminFilter {
    pub search: Option<String>,
    pub kind: Option<InterstitialType>,
    /// `Some(true)` active only, `Some(false)` inactive only.
    pub active: Option<bool>,
    pub trashed: TrashedScope,
}

#[derive(Debug, Clone, Serialize)]
pub struct InterstitialStats {
    pub interstitial_id: InterstitialId,
    pub total_views: usize,
    pub total_responses: usize,
    pub dismissed: usize,
    pub completed: usize,
    pub dont_show_again: usize,
    pub action_breakdown: HashMap<ViewAction, usize>,
    /// View facts per calendar day (UTC) over the last thirty days.
    pub daily_views: BTreeMap<NaiveDate, usize>,
}

pub struct InterstitialAdmin {
    interstitials: Arc<dyn InterstitialStore>,
    views: Arc<dyn ViewStore>,
    responses: Arc<dyn ResponseStore>,
    events: EventRegistry,
    clock: Arc<dyn Clock>,
}

impl InterstitialAdmin {
    pub fn new(
        interstitials: Arc<dyn InterstitialStore>,
        views: Arc<dyn ViewStore>,
        responses: Arc<dyn ResponseStore>,
        events: EventRegistry,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            interstitials,
            views,
            responses,
            events,
            clock,
        }
    }

    pub fn create(&self, req: CreateInterstitialRequest) -> InterludeResult<Interstitial> {
        validate(&req, &self.events)?;
        self.interstitials.create(req)
    }

    /// Validates the definition as it would look after the update.
    pub fn update(&self, id: InterstitialId, req: UpdateInterstitialRequest) -> InterludeResult<Interstitial> {
        let mut preview = self.get(id)?;
        preview.apply_update(req.clone(), self.clock.now());
        validate(&CreateInterstitialRequest::from(&preview), &self.events)?;
        self.interstitials.update(id, req)
    }

    /// Single-item lookup; a missing or trashed row is `NotFound`.
    pub fn get(&self, id: InterstitialId) -> InterludeResult<Interstitial> {
        self.interstitials
            .find(id)?
            .ok_or_else(|| InterludeError::NotFound(format!("interstitial {id}")))
    }

    pub fn toggle(&self, id: InterstitialId) -> InterludeResult<Interstitial> {
        let current = self.get(id)?;
        let updated = self.interstitials.update(
            id,
            UpdateInterstitialRequest {
                is_active: Some(!current.is_active),
                ..Default::default()
            },
        )?;
        info!(id, active = updated.is_active, "Interstitial toggled");
        Ok(updated)
    }

    /// Copy under `<name>-copy-<unix seconds>` with a fresh UUID, inactive.
    /// The copy is validated like any new definition.
    pub fn duplicate(&self, id: InterstitialId) -> InterludeResult<Interstitial> {
        let source = self.get(id)?;
        let mut req = CreateInterstitialRequest::from(&source);
        req.name = format!("{}-copy-{}", source.name, self.clock.now().timestamp());
        req.is_active = false;
        validate(&req, &self.events)?;
        let copy = self.interstitials.create(req)?;
        info!(source = id, copy = copy.id, name = %copy.name, "Interstitial duplicated");
        Ok(copy)
    }

    pub fn delete(&self, id: InterstitialId) -> InterludeResult<()> {
        self.interstitials.soft_delete(id)
    }

    pub fn restore(&self, id: InterstitialId) -> InterludeResult<Interstitial> {
        self.interstitials.restore(id)
    }

    /// Permanently remove a row, trashed or not, with its facts.
    pub fn purge(&self, id: InterstitialId) -> InterludeResult<()> {
        self.interstitials.force_delete(id)
    }

    /// Most recently updated first.
    pub fn list(&self, filter: &AdminFilter) -> InterludeResult<Vec<Interstitial>> {
        let mut query = InterstitialQuery::new()
            .with_status(filter.active)
            .trashed(filter.trashed)
            .order_by(QueryOrder::UpdatedDesc);
        if let Some(kind) = filter.kind {
            query = query.of_type(kind);
        }
        if let Some(term) = &filter.search {
            query = query.search(term);
        }
        self.interstitials.query(&query)
    }

    pub fn stats(&self, id: InterstitialId) -> InterludeResult<InterstitialStats> {
        let interstitial = self
            .interstitials
            .find_with_trashed(id)?
            .ok_or_else(|| InterludeError::NotFound(format!("interstitial {id}")))?;

        let action_breakdown = self.views.view_counts(interstitial.id)?;
        let count = |action| action_breakdown.get(&action).copied().unwrap_or(0);

        let now = self.clock.now();
        let since: DateTime<Utc> = now - Duration::days(STATS_WINDOW_DAYS);
        let mut daily_views = BTreeMap::new();
        for record in self.views.views(&ViewQuery {
            interstitial_id: Some(interstitial.id),
            from: Some(since),
            ..Default::default()
        })? {
            *daily_views.entry(record.viewed_at.date_naive()).or_insert(0) += 1;
        }

        Ok(InterstitialStats {
            interstitial_id: interstitial.id,
            total_views: action_breakdown.values().sum(),
            total_responses: self.responses.response_count(interstitial.id)?,
            dismissed: count(ViewAction::Dismissed),
            completed: count(ViewAction::Completed),
            dont_show_again: count(ViewAction::DontShowAgain),
            daily_views,
            action_breakdown,
        })
    }
}
