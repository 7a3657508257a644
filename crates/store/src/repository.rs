//! Store traits. Every call is a single synchronous round trip; failures
//! propagate as `InterludeError::Store` so an empty result is never
//! confused with an outage.

use chrono::{DateTime, Utc};
use interlude_core::types::{
    CreateInterstitialRequest, ResponseRecord, UpdateInterstitialRequest, ViewRecord,
};
use interlude_core::{Interstitial, InterstitialId, InterludeResult, ViewAction, VisitorIdentity};
use std::collections::HashMap;
use uuid::Uuid;

use crate::query::InterstitialQuery;

pub trait InterstitialStore: Send + Sync {
    /// Insert a new definition. Fails with `DuplicateName` when a
    /// non-deleted row already uses the name.
    fn create(&self, req: CreateInterstitialRequest) -> InterludeResult<Interstitial>;

    fn update(&self, id: InterstitialId, req: UpdateInterstitialRequest) -> InterludeResult<Interstitial>;

    fn soft_delete(&self, id: InterstitialId) -> InterludeResult<()>;

    fn restore(&self, id: InterstitialId) -> InterludeResult<Interstitial>;

    /// Remove the row and every fact recorded against it.
    fn force_delete(&self, id: InterstitialId) -> InterludeResult<()>;

    /// Non-deleted row by id.
    fn find(&self, id: InterstitialId) -> InterludeResult<Option<Interstitial>>;

    fn find_with_trashed(&self, id: InterstitialId) -> InterludeResult<Option<Interstitial>>;

    fn find_by_uuid(&self, uuid: Uuid) -> InterludeResult<Option<Interstitial>>;

    fn find_by_name(&self, name: &str) -> InterludeResult<Option<Interstitial>>;

    fn query(&self, query: &InterstitialQuery) -> InterludeResult<Vec<Interstitial>>;
}

/// Filter over view facts. Unset fields do not filter; the range is
/// inclusive at `from` and exclusive at `until`.
#[derive(Debug, Clone, Default)]
pub struct ViewQuery {
    pub interstitial_id: Option<InterstitialId>,
    pub identity: Option<VisitorIdentity>,
    pub action: Option<ViewAction>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl ViewQuery {
    pub fn for_interstitial(id: InterstitialId) -> Self {
        Self {
            interstitial_id: Some(id),
            ..Default::default()
        }
    }

    pub fn action(mut self, action: ViewAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn between(mut self, from: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.until = Some(until);
        self
    }

    pub fn matches(&self, record: &ViewRecord) -> bool {
        self.interstitial_id.map_or(true, |id| record.interstitial_id == id)
            && self.identity.as_ref().map_or(true, |who| record.belongs_to(who))
            && self.action.map_or(true, |a| record.action == a)
            && self.from.map_or(true, |from| record.viewed_at >= from)
            && self.until.map_or(true, |until| record.viewed_at < until)
    }
}

pub trait ViewStore: Send + Sync {
    fn record_view(&self, record: ViewRecord) -> InterludeResult<()>;

    /// Whether `identity` has any fact for the interstitial, optionally
    /// restricted to one action.
    fn has_view(
        &self,
        interstitial_id: InterstitialId,
        identity: &VisitorIdentity,
        action: Option<ViewAction>,
    ) -> InterludeResult<bool>;

    /// Most recent fact for `identity`, any action.
    fn latest_view(
        &self,
        interstitial_id: InterstitialId,
        identity: &VisitorIdentity,
    ) -> InterludeResult<Option<ViewRecord>>;

    /// Matching facts, oldest first.
    fn views(&self, query: &ViewQuery) -> InterludeResult<Vec<ViewRecord>>;

    fn view_counts(&self, interstitial_id: InterstitialId) -> InterludeResult<HashMap<ViewAction, usize>>;

    fn count_views_before(&self, cutoff: DateTime<Utc>) -> InterludeResult<usize>;

    /// Retention sweep: delete facts with `viewed_at < cutoff`.
    fn delete_views_before(&self, cutoff: DateTime<Utc>) -> InterludeResult<usize>;
}

pub trait ResponseStore: Send + Sync {
    fn record_response(&self, record: ResponseRecord) -> InterludeResult<()>;

    /// Submissions by `identity`, oldest first.
    fn responses_for(
        &self,
        interstitial_id: InterstitialId,
        identity: &VisitorIdentity,
    ) -> InterludeResult<Vec<ResponseRecord>>;

    fn response_count(&self, interstitial_id: InterstitialId) -> InterludeResult<usize>;
}
