//! In-memory store backed by DashMap.
//!
//! Production hosts implement the store traits over their own database.
//! This provides the same API surface for development, tests and the CLI.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use interlude_core::clock::{system_clock, Clock};
use interlude_core::types::{
    CreateInterstitialRequest, ResponseRecord, UpdateInterstitialRequest, ViewRecord,
};
use interlude_core::{
    InterludeError, InterludeResult, Interstitial, InterstitialId, ViewAction, VisitorIdentity,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::query::InterstitialQuery;
use crate::repository::{InterstitialStore, ResponseStore, ViewQuery, ViewStore};

/// Thread-safe in-memory store for interstitials, view facts and responses.
pub struct MemoryStore {
    interstitials: DashMap<InterstitialId, Interstitial>,
    /// Name → id for non-deleted rows.
    names: DashMap<String, InterstitialId>,
    views: DashMap<Uuid, ViewRecord>,
    responses: DashMap<Uuid, ResponseRecord>,
    next_id: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            interstitials: DashMap::new(),
            names: DashMap::new(),
            views: DashMap::new(),
            responses: DashMap::new(),
            next_id: AtomicU64::new(1),
            clock,
        }
    }

    pub fn view_total(&self) -> usize {
        self.views.len()
    }

    fn claim_name(&self, name: &str, id: InterstitialId) -> InterludeResult<()> {
        match self.names.entry(name.to_string()) {
            Entry::Occupied(e) if *e.get() != id => Err(InterludeError::DuplicateName(name.to_string())),
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(e) => {
                e.insert(id);
                Ok(())
            }
        }
    }

    fn release_name(&self, name: &str, id: InterstitialId) {
        self.names.remove_if(name, |_, owner| *owner == id);
    }

    fn not_found(id: InterstitialId) -> InterludeError {
        InterludeError::NotFound(format!("interstitial {id}"))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InterstitialStore for MemoryStore {
    fn create(&self, req: CreateInterstitialRequest) -> InterludeResult<Interstitial> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.claim_name(&req.name, id)?;
        let row = Interstitial::from_request(id, req, self.clock.now());
        self.interstitials.insert(id, row.clone());
        info!(id, name = %row.name, uuid = %row.uuid, "Interstitial created");
        Ok(row)
    }

    fn update(&self, id: InterstitialId, req: UpdateInterstitialRequest) -> InterludeResult<Interstitial> {
        let current = self.find(id)?.ok_or_else(|| Self::not_found(id))?;
        let rename = req.name.clone().filter(|name| *name != current.name);
        if let Some(name) = &rename {
            self.claim_name(name, id)?;
        }

        let mut entry = self
            .interstitials
            .get_mut(&id)
            .ok_or_else(|| Self::not_found(id))?;
        entry.apply_update(req, self.clock.now());
        let updated = entry.clone();
        drop(entry);

        if rename.is_some() {
            self.release_name(&current.name, id);
        }
        info!(id, name = %updated.name, "Interstitial updated");
        Ok(updated)
    }

    fn soft_delete(&self, id: InterstitialId) -> InterludeResult<()> {
        let mut entry = self
            .interstitials
            .get_mut(&id)
            .filter(|e| !e.is_deleted())
            .ok_or_else(|| Self::not_found(id))?;
        entry.deleted_at = Some(self.clock.now());
        let name = entry.name.clone();
        drop(entry);

        self.release_name(&name, id);
        info!(id, name = %name, "Interstitial soft-deleted");
        Ok(())
    }

    fn restore(&self, id: InterstitialId) -> InterludeResult<Interstitial> {
        let row = self.find_with_trashed(id)?.ok_or_else(|| Self::not_found(id))?;
        if !row.is_deleted() {
            return Ok(row);
        }
        self.claim_name(&row.name, id)?;

        let mut entry = self
            .interstitials
            .get_mut(&id)
            .ok_or_else(|| Self::not_found(id))?;
        entry.deleted_at = None;
        info!(id, name = %entry.name, "Interstitial restored");
        Ok(entry.clone())
    }

    fn force_delete(&self, id: InterstitialId) -> InterludeResult<()> {
        let (_, row) = self
            .interstitials
            .remove(&id)
            .ok_or_else(|| Self::not_found(id))?;
        self.release_name(&row.name, id);
        self.views.retain(|_, v| v.interstitial_id != id);
        self.responses.retain(|_, r| r.interstitial_id != id);
        info!(id, name = %row.name, "Interstitial purged");
        Ok(())
    }

    fn find(&self, id: InterstitialId) -> InterludeResult<Option<Interstitial>> {
        Ok(self.find_with_trashed(id)?.filter(|i| !i.is_deleted()))
    }

    fn find_with_trashed(&self, id: InterstitialId) -> InterludeResult<Option<Interstitial>> {
        Ok(self.interstitials.get(&id).map(|r| r.value().clone()))
    }

    fn find_by_uuid(&self, uuid: Uuid) -> InterludeResult<Option<Interstitial>> {
        Ok(self
            .interstitials
            .iter()
            .find(|r| r.uuid == uuid && !r.is_deleted())
            .map(|r| r.value().clone()))
    }

    fn find_by_name(&self, name: &str) -> InterludeResult<Option<Interstitial>> {
        let Some(id) = self.names.get(name).map(|r| *r.value()) else {
            return Ok(None);
        };
        self.find(id)
    }

    fn query(&self, query: &InterstitialQuery) -> InterludeResult<Vec<Interstitial>> {
        let mut rows: Vec<Interstitial> = self
            .interstitials
            .iter()
            .filter(|r| query.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();
        query.sort(&mut rows);
        Ok(rows)
    }
}

impl ViewStore for MemoryStore {
    fn record_view(&self, record: ViewRecord) -> InterludeResult<()> {
        self.views.insert(record.id, record);
        Ok(())
    }

    fn has_view(
        &self,
        interstitial_id: InterstitialId,
        identity: &VisitorIdentity,
        action: Option<ViewAction>,
    ) -> InterludeResult<bool> {
        Ok(self.views.iter().any(|r| {
            r.interstitial_id == interstitial_id
                && action.map_or(true, |a| r.action == a)
                && r.belongs_to(identity)
        }))
    }

    fn latest_view(
        &self,
        interstitial_id: InterstitialId,
        identity: &VisitorIdentity,
    ) -> InterludeResult<Option<ViewRecord>> {
        Ok(self
            .views
            .iter()
            .filter(|r| r.interstitial_id == interstitial_id && r.belongs_to(identity))
            .max_by_key(|r| r.viewed_at)
            .map(|r| r.value().clone()))
    }

    fn views(&self, query: &ViewQuery) -> InterludeResult<Vec<ViewRecord>> {
        let mut records: Vec<ViewRecord> = self
            .views
            .iter()
            .filter(|r| query.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();
        records.sort_by_key(|r| r.viewed_at);
        Ok(records)
    }

    fn view_counts(&self, interstitial_id: InterstitialId) -> InterludeResult<HashMap<ViewAction, usize>> {
        let mut counts = HashMap::new();
        for r in self.views.iter().filter(|r| r.interstitial_id == interstitial_id) {
            *counts.entry(r.action).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn count_views_before(&self, cutoff: DateTime<Utc>) -> InterludeResult<usize> {
        Ok(self.views.iter().filter(|r| r.viewed_at < cutoff).count())
    }

    fn delete_views_before(&self, cutoff: DateTime<Utc>) -> InterludeResult<usize> {
        let before = self.views.len();
        self.views.retain(|_, r| r.viewed_at >= cutoff);
        Ok(before - self.views.len())
    }
}

impl ResponseStore for MemoryStore {
    fn record_response(&self, record: ResponseRecord) -> InterludeResult<()> {
        self.responses.insert(record.id, record);
        Ok(())
    }

    fn responses_for(
        &self,
        interstitial_id: InterstitialId,
        identity: &VisitorIdentity,
    ) -> InterludeResult<Vec<ResponseRecord>> {
        let mut records: Vec<ResponseRecord> = self
            .responses
            .iter()
            .filter(|r| r.interstitial_id == interstitial_id && r.belongs_to(identity))
            .map(|r| r.value().clone())
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    fn response_count(&self, interstitial_id: InterstitialId) -> InterludeResult<usize> {
        Ok(self
            .responses
            .iter()
            .filter(|r| r.interstitial_id == interstitial_id)
            .count())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;
    use interlude_core::ManualClock;
    use serde_json::json;

    fn store() -> (MemoryStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        (MemoryStore::with_clock(clock.clone()), clock)
    }

    fn visitor() -> VisitorIdentity {
        VisitorIdentity::new(Some("42".into()), Some("sess-a".into()))
    }

    #[test]
    fn test_create_assigns_sequential_ids() {
        let (store, _) = store();
        let a = store.create(CreateInterstitialRequest::named("a", "A")).unwrap();
        let b = store.create(CreateInterstitialRequest::named("b", "B")).unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        assert_ne!(a.uuid, b.uuid);
        assert_eq!(store.find_by_uuid(b.uuid).unwrap().unwrap().name, "b");
        assert_eq!(store.find_by_name("a").unwrap().unwrap().id, 1);
    }

    #[test]
    fn test_names_unique_among_live_rows() {
        let (store, _) = store();
        let a = store.create(CreateInterstitialRequest::named("welcome", "A")).unwrap();
        let dup = store.create(CreateInterstitialRequest::named("welcome", "B"));
        assert!(matches!(dup, Err(InterludeError::DuplicateName(_))));

        store.soft_delete(a.id).unwrap();
        let replacement = store.create(CreateInterstitialRequest::named("welcome", "C")).unwrap();
        assert!(matches!(store.restore(a.id), Err(InterludeError::DuplicateName(_))));

        store.force_delete(replacement.id).unwrap();
        let restored = store.restore(a.id).unwrap();
        assert!(!restored.is_deleted());
        assert_eq!(store.find_by_name("welcome").unwrap().unwrap().id, a.id);
    }

    #[test]
    fn test_update_keeps_uuid_and_moves_name() {
        let (store, clock) = store();
        let a = store.create(CreateInterstitialRequest::named("a", "A")).unwrap();
        store.create(CreateInterstitialRequest::named("b", "B")).unwrap();

        let clash = store.update(
            a.id,
            UpdateInterstitialRequest {
                name: Some("b".into()),
                ..Default::default()
            },
        );
        assert!(matches!(clash, Err(InterludeError::DuplicateName(_))));

        clock.advance(Duration::minutes(5));
        let renamed = store
            .update(
                a.id,
                UpdateInterstitialRequest {
                    name: Some("a2".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(renamed.uuid, a.uuid);
        assert!(renamed.updated_at > a.updated_at);
        assert!(store.find_by_name("a").unwrap().is_none());
        assert!(store.create(CreateInterstitialRequest::named("a", "A")).is_ok());
    }

    #[test]
    fn test_missing_rows_are_not_found() {
        let (store, _) = store();
        assert!(store.find(99).unwrap().is_none());
        assert!(store.soft_delete(99).unwrap_err().is_not_found());
        assert!(store
            .update(99, UpdateInterstitialRequest::default())
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_soft_deleted_rows_hidden_from_find() {
        let (store, _) = store();
        let a = store.create(CreateInterstitialRequest::named("a", "A")).unwrap();
        store.soft_delete(a.id).unwrap();
        assert!(store.find(a.id).unwrap().is_none());
        assert!(store.find_by_uuid(a.uuid).unwrap().is_none());
        assert!(store.find_with_trashed(a.id).unwrap().unwrap().is_deleted());
        assert!(store.query(&InterstitialQuery::new()).unwrap().is_empty());
    }

    #[test]
    fn test_view_lookup_by_user_or_session() {
        let (store, clock) = store();
        let now = clock.now();
        store
            .record_view(ViewRecord::new(1, &VisitorIdentity::new(None, Some("sess-a".into())), ViewAction::Viewed, now))
            .unwrap();
        store
            .record_view(ViewRecord::new(1, &VisitorIdentity::new(Some("42".into()), Some("sess-z".into())), ViewAction::Dismissed, now + Duration::hours(1)))
            .unwrap();

        assert!(store.has_view(1, &visitor(), None).unwrap());
        assert!(store.has_view(1, &visitor(), Some(ViewAction::Dismissed)).unwrap());
        assert!(!store.has_view(1, &visitor(), Some(ViewAction::DontShowAgain)).unwrap());
        assert!(!store.has_view(2, &visitor(), None).unwrap());

        let latest = store.latest_view(1, &visitor()).unwrap().unwrap();
        assert_eq!(latest.action, ViewAction::Dismissed);

        let stranger = VisitorIdentity::new(Some("7".into()), None);
        assert!(store.latest_view(1, &stranger).unwrap().is_none());
    }

    #[test]
    fn test_view_queries_counts_and_retention() {
        let (store, clock) = store();
        let now = clock.now();
        for (days_ago, action) in [(100, ViewAction::Viewed), (10, ViewAction::Viewed), (1, ViewAction::Completed)] {
            store
                .record_view(ViewRecord::new(1, &visitor(), action, now - Duration::days(days_ago)))
                .unwrap();
        }

        let recent = store
            .views(&ViewQuery::for_interstitial(1).between(now - Duration::days(30), now))
            .unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].viewed_at < recent[1].viewed_at);

        let viewed = store.views(&ViewQuery::for_interstitial(1).action(ViewAction::Viewed)).unwrap();
        assert_eq!(viewed.len(), 2);

        let counts = store.view_counts(1).unwrap();
        assert_eq!(counts[&ViewAction::Viewed], 2);
        assert_eq!(counts[&ViewAction::Completed], 1);

        let cutoff = now - Duration::days(90);
        assert_eq!(store.count_views_before(cutoff).unwrap(), 1);
        assert_eq!(store.delete_views_before(cutoff).unwrap(), 1);
        assert_eq!(store.view_total(), 2);
    }

    #[test]
    fn test_responses_and_purge_cascade() {
        let (store, clock) = store();
        let a = store.create(CreateInterstitialRequest::named("survey", "Survey")).unwrap();
        let mut data = serde_json::Map::new();
        data.insert("rating".into(), json!(5));
        store
            .record_response(ResponseRecord::new(a.id, &visitor(), data, clock.now()))
            .unwrap();
        store
            .record_view(ViewRecord::new(a.id, &visitor(), ViewAction::Completed, clock.now()))
            .unwrap();

        assert_eq!(store.response_count(a.id).unwrap(), 1);
        assert_eq!(store.responses_for(a.id, &visitor()).unwrap()[0].data["rating"], json!(5));

        store.force_delete(a.id).unwrap();
        assert_eq!(store.response_count(a.id).unwrap(), 0);
        assert_eq!(store.view_total(), 0);
    }
}
