//! Filtered, ordered queries over interstitial definitions.

use chrono::{DateTime, Utc};
use interlude_core::types::InterstitialType;
use interlude_core::{EventName, Interstitial};

/// How soft-deleted rows take part in a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrashedScope {
    #[default]
    Without,
    With,
    Only,
}

/// Tenant restriction. `Current(None)` keeps only rows without a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TenantScope {
    #[default]
    Any,
    Current(Option<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryOrder {
    /// Priority descending, ties broken by id ascending (creation order).
    #[default]
    PriorityDesc,
    /// Most recently updated first, ties broken by id descending.
    UpdatedDesc,
}

/// Predicate set for [`crate::InterstitialStore::query`]. Unset fields do
/// not filter.
#[derive(Debug, Clone, Default)]
pub struct InterstitialQuery {
    pub active: Option<bool>,
    pub kind: Option<InterstitialType>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub tenant: TenantScope,
    pub trigger_event: Option<EventName>,
    pub inline_slot: Option<String>,
    pub has_trigger_routes: bool,
    pub has_inline_slot: bool,
    pub trashed: TrashedScope,
    pub search: Option<String>,
    pub order: QueryOrder,
}

impl InterstitialQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Active rows whose schedule window contains `now`.
    pub fn live(now: DateTime<Utc>) -> Self {
        Self::new().active().scheduled_at(now)
    }

    pub fn active(mut self) -> Self {
        self.active = Some(true);
        self
    }

    pub fn with_status(mut self, active: Option<bool>) -> Self {
        self.active = active;
        self
    }

    pub fn of_type(mut self, kind: InterstitialType) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn scheduled_at(mut self, now: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(now);
        self
    }

    pub fn for_tenant(mut self, tenant: Option<&str>) -> Self {
        self.tenant = TenantScope::Current(tenant.map(str::to_string));
        self
    }

    pub fn for_event(mut self, event: &EventName) -> Self {
        self.trigger_event = Some(event.clone());
        self
    }

    pub fn for_slot(mut self, slot: &str) -> Self {
        self.inline_slot = Some(slot.to_string());
        self
    }

    pub fn with_trigger_routes(mut self) -> Self {
        self.has_trigger_routes = true;
        self
    }

    pub fn with_inline_slot(mut self) -> Self {
        self.has_inline_slot = true;
        self
    }

    pub fn trashed(mut self, scope: TrashedScope) -> Self {
        self.trashed = scope;
        self
    }

    pub fn search(mut self, term: &str) -> Self {
        let term = term.trim();
        self.search = (!term.is_empty()).then(|| term.to_lowercase());
        self
    }

    pub fn order_by(mut self, order: QueryOrder) -> Self {
        self.order = order;
        self
    }

    pub fn matches(&self, i: &Interstitial) -> bool {
        match self.trashed {
            TrashedScope::Without if i.is_deleted() => return false,
            TrashedScope::Only if !i.is_deleted() => return false,
            _ => {}
        }
        if self.active.is_some_and(|active| i.is_active != active) {
            return false;
        }
        if self.kind.is_some_and(|kind| i.kind != kind) {
            return false;
        }
        if self.scheduled_at.is_some_and(|now| !i.is_within_schedule(now)) {
            return false;
        }
        if let TenantScope::Current(tenant) = &self.tenant {
            if i.tenant_id.is_some() && i.tenant_id != *tenant {
                return false;
            }
        }
        if let Some(event) = &self.trigger_event {
            if i.trigger_event.as_ref() != Some(event) {
                return false;
            }
        }
        if let Some(slot) = &self.inline_slot {
            if i.inline_slot.as_deref() != Some(slot.as_str()) {
                return false;
            }
        }
        if self.has_trigger_routes && !i.has_trigger_routes() {
            return false;
        }
        if self.has_inline_slot && !i.has_inline_slot() {
            return false;
        }
        if let Some(term) = &self.search {
            if !i.name.to_lowercase().contains(term) && !i.title.to_lowercase().contains(term) {
                return false;
            }
        }
        true
    }

    /// Order rows in place. The result does not depend on the input order.
    pub fn sort(&self, rows: &mut [Interstitial]) {
        match self.order {
            QueryOrder::PriorityDesc => {
                rows.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)))
            }
            QueryOrder::UpdatedDesc => {
                rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)))
            }
        }
    }
}
