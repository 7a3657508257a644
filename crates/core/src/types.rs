//! Interstitial domain types. Targeting rules, view facts, form responses,
//! and queue entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::event_name::EventName;
use crate::routes;
use crate::visitor::VisitorIdentity;

/// Store-assigned surrogate key. Monotonic in creation order.
pub type InterstitialId = u64;

// ─── Enums ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum InterstitialType {
    #[default]
    Modal,
    FullPage,
    Inline,
}

impl InterstitialType {
    pub fn label(self) -> &'static str {
        match self {
            InterstitialType::Modal => "Modal Overlay",
            InterstitialType::FullPage => "Full Page",
            InterstitialType::Inline => "Inline Content",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Content lives in a host template referenced by name.
    ViewReference,
    /// Content body is stored on the interstitial itself.
    #[default]
    Stored,
    /// A form collecting visitor input.
    Form,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AudienceType {
    #[default]
    All,
    Authenticated,
    Guest,
    Roles,
    Custom,
}

impl AudienceType {
    pub fn label(self) -> &'static str {
        match self {
            AudienceType::All => "All Users",
            AudienceType::Authenticated => "Authenticated Only",
            AudienceType::Guest => "Guests Only",
            AudienceType::Roles => "Specific Roles",
            AudienceType::Custom => "Custom Condition",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Always,
    #[default]
    Once,
    OncePerSession,
    /// Repeats after `frequency_days` days.
    EveryXDays,
}

impl Frequency {
    pub fn label(self) -> &'static str {
        match self {
            Frequency::Always => "Every Time",
            Frequency::Once => "Once Ever",
            Frequency::OncePerSession => "Once Per Session",
            Frequency::EveryXDays => "Every X Days",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueBehavior {
    /// Use the globally configured default.
    #[default]
    Inherit,
    ShowWithOthers,
    /// When shown, nothing else is shown in the same round.
    Exclusive,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ViewAction {
    Viewed,
    Dismissed,
    Completed,
    DontShowAgain,
}

impl ViewAction {
    /// Parse the action names host endpoints receive. Unknown input is
    /// treated as a dismissal.
    pub fn parse_lenient(input: &str) -> Self {
        match input.trim() {
            "viewed" | "view" => ViewAction::Viewed,
            "complete" | "completed" => ViewAction::Completed,
            "dont_show_again" => ViewAction::DontShowAgain,
            _ => ViewAction::Dismissed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ViewAction::Viewed => "viewed",
            ViewAction::Dismissed => "dismissed",
            ViewAction::Completed => "completed",
            ViewAction::DontShowAgain => "dont_show_again",
        }
    }
}

impl fmt::Display for ViewAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Interstitial ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CtaButton {
    pub label: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

impl CtaButton {
    /// The key a clicked button is reported by: its id, else its label.
    pub fn key(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interstitial {
    pub id: InterstitialId,
    pub uuid: Uuid,
    pub tenant_id: Option<String>,
    pub name: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: InterstitialType,
    pub content_type: ContentType,
    pub content: Option<String>,
    pub view_name: Option<String>,
    pub trigger_event: Option<EventName>,
    #[serde(default)]
    pub trigger_routes: Vec<String>,
    pub trigger_schedule_start: Option<DateTime<Utc>>,
    pub trigger_schedule_end: Option<DateTime<Utc>>,
    pub audience_type: AudienceType,
    #[serde(default)]
    pub audience_roles: Vec<String>,
    pub audience_condition: Option<String>,
    pub frequency: Frequency,
    pub frequency_days: Option<u32>,
    pub priority: i32,
    #[serde(default)]
    pub cta_buttons: Vec<CtaButton>,
    pub allow_dismiss: bool,
    pub allow_dont_show_again: bool,
    pub redirect_after: Option<String>,
    pub queue_behavior: QueueBehavior,
    pub inline_slot: Option<String>,
    pub is_active: bool,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Interstitial {
    /// Build a new row from a creation request. A fresh UUID is assigned.
    pub fn from_request(id: InterstitialId, req: CreateInterstitialRequest, now: DateTime<Utc>) -> Self {
        Self {
            id,
            uuid: Uuid::new_v4(),
            tenant_id: req.tenant_id,
            name: req.name,
            title: req.title,
            kind: req.kind,
            content_type: req.content_type,
            content: req.content,
            view_name: req.view_name,
            trigger_event: req.trigger_event,
            trigger_routes: req.trigger_routes,
            trigger_schedule_start: req.trigger_schedule_start,
            trigger_schedule_end: req.trigger_schedule_end,
            audience_type: req.audience_type,
            audience_roles: req.audience_roles,
            audience_condition: req.audience_condition,
            frequency: req.frequency,
            frequency_days: req.frequency_days,
            priority: req.priority,
            cta_buttons: req.cta_buttons,
            allow_dismiss: req.allow_dismiss,
            allow_dont_show_again: req.allow_dont_show_again,
            redirect_after: req.redirect_after,
            queue_behavior: req.queue_behavior,
            inline_slot: req.inline_slot,
            is_active: req.is_active,
            metadata: req.metadata,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply an administrative update. `id`, `uuid`, and `created_at` never change.
    pub fn apply_update(&mut self, req: UpdateInterstitialRequest, now: DateTime<Utc>) {
        if let Some(v) = req.name { self.name = v; }
        if let Some(v) = req.title { self.title = v; }
        if let Some(v) = req.kind { self.kind = v; }
        if let Some(v) = req.content_type { self.content_type = v; }
        if let Some(v) = req.content { self.content = v; }
        if let Some(v) = req.view_name { self.view_name = v; }
        if let Some(v) = req.trigger_event { self.trigger_event = v; }
        if let Some(v) = req.trigger_routes { self.trigger_routes = v; }
        if let Some(v) = req.trigger_schedule_start { self.trigger_schedule_start = v; }
        if let Some(v) = req.trigger_schedule_end { self.trigger_schedule_end = v; }
        if let Some(v) = req.audience_type { self.audience_type = v; }
        if let Some(v) = req.audience_roles { self.audience_roles = v; }
        if let Some(v) = req.audience_condition { self.audience_condition = v; }
        if let Some(v) = req.frequency { self.frequency = v; }
        if let Some(v) = req.frequency_days { self.frequency_days = v; }
        if let Some(v) = req.priority { self.priority = v; }
        if let Some(v) = req.cta_buttons { self.cta_buttons = v; }
        if let Some(v) = req.allow_dismiss { self.allow_dismiss = v; }
        if let Some(v) = req.allow_dont_show_again { self.allow_dont_show_again = v; }
        if let Some(v) = req.redirect_after { self.redirect_after = v; }
        if let Some(v) = req.queue_behavior { self.queue_behavior = v; }
        if let Some(v) = req.inline_slot { self.inline_slot = v; }
        if let Some(v) = req.is_active { self.is_active = v; }
        if let Some(v) = req.tenant_id { self.tenant_id = v; }
        if let Some(v) = req.metadata { self.metadata = v; }
        self.updated_at = now;
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_scheduled(&self) -> bool {
        self.trigger_schedule_start.is_some() || self.trigger_schedule_end.is_some()
    }

    /// Inclusive at both ends; an open end never excludes.
    pub fn is_within_schedule(&self, now: DateTime<Utc>) -> bool {
        if matches!(self.trigger_schedule_start, Some(start) if now < start) {
            return false;
        }
        if matches!(self.trigger_schedule_end, Some(end) if now > end) {
            return false;
        }
        true
    }

    pub fn has_trigger_routes(&self) -> bool {
        !self.trigger_routes.is_empty()
    }

    pub fn has_inline_slot(&self) -> bool {
        self.inline_slot.as_deref().is_some_and(|s| !s.is_empty())
    }

    pub fn matches_route(&self, route: &str) -> bool {
        routes::matches_any(&self.trigger_routes, route)
    }

    /// Day count for `EveryXDays`; missing or zero counts as one day.
    pub fn frequency_days_or_default(&self) -> u32 {
        self.frequency_days.filter(|d| *d >= 1).unwrap_or(1)
    }

    /// The item's own queue behavior, or `default` when it inherits.
    /// An inheriting default resolves to `ShowWithOthers`.
    pub fn effective_queue_behavior(&self, default: QueueBehavior) -> QueueBehavior {
        match self.queue_behavior {
            QueueBehavior::Inherit => match default {
                QueueBehavior::Inherit => QueueBehavior::ShowWithOthers,
                other => other,
            },
            own => own,
        }
    }

    /// URL of the call-to-action reported as `cta`, if it has one.
    pub fn cta_redirect(&self, cta: &str) -> Option<&str> {
        self.cta_buttons
            .iter()
            .find(|b| b.key() == cta)
            .and_then(|b| b.url.as_deref())
            .filter(|url| !url.is_empty())
    }
}

// ─── Requests ──────────────────────────────────────────────────────────────

/// Administrative creation input. Missing fields take the package defaults:
/// a modal with stored content shown once to everyone, dismissable, active.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateInterstitialRequest {
    pub name: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: InterstitialType,
    pub content_type: ContentType,
    pub content: Option<String>,
    pub view_name: Option<String>,
    pub trigger_event: Option<EventName>,
    pub trigger_routes: Vec<String>,
    pub trigger_schedule_start: Option<DateTime<Utc>>,
    pub trigger_schedule_end: Option<DateTime<Utc>>,
    pub audience_type: AudienceType,
    pub audience_roles: Vec<String>,
    pub audience_condition: Option<String>,
    pub frequency: Frequency,
    pub frequency_days: Option<u32>,
    pub priority: i32,
    pub cta_buttons: Vec<CtaButton>,
    pub allow_dismiss: bool,
    pub allow_dont_show_again: bool,
    pub redirect_after: Option<String>,
    pub queue_behavior: QueueBehavior,
    pub inline_slot: Option<String>,
    pub is_active: bool,
    pub tenant_id: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Default for CreateInterstitialRequest {
    fn default() -> Self {
        Self {
            name: String::new(),
            title: String::new(),
            kind: InterstitialType::default(),
            content_type: ContentType::default(),
            content: None,
            view_name: None,
            trigger_event: None,
            trigger_routes: Vec::new(),
            trigger_schedule_start: None,
            trigger_schedule_end: None,
            audience_type: AudienceType::default(),
            audience_roles: Vec::new(),
            audience_condition: None,
            frequency: Frequency::default(),
            frequency_days: None,
            priority: 0,
            cta_buttons: Vec::new(),
            allow_dismiss: true,
            allow_dont_show_again: false,
            redirect_after: None,
            queue_behavior: QueueBehavior::default(),
            inline_slot: None,
            is_active: true,
            tenant_id: None,
            metadata: serde_json::Map::new(),
        }
    }
}

impl CreateInterstitialRequest {
    pub fn named(name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            ..Default::default()
        }
    }
}

impl From<&Interstitial> for CreateInterstitialRequest {
    fn from(i: &Interstitial) -> Self {
        Self {
            name: i.name.clone(),
            title: i.title.clone(),
            kind: i.kind,
            content_type: i.content_type,
            content: i.content.clone(),
            view_name: i.view_name.clone(),
            trigger_event: i.trigger_event.clone(),
            trigger_routes: i.trigger_routes.clone(),
            trigger_schedule_start: i.trigger_schedule_start,
            trigger_schedule_end: i.trigger_schedule_end,
            audience_type: i.audience_type,
            audience_roles: i.audience_roles.clone(),
            audience_condition: i.audience_condition.clone(),
            frequency: i.frequency,
            frequency_days: i.frequency_days,
            priority: i.priority,
            cta_buttons: i.cta_buttons.clone(),
            allow_dismiss: i.allow_dismiss,
            allow_dont_show_again: i.allow_dont_show_again,
            redirect_after: i.redirect_after.clone(),
            queue_behavior: i.queue_behavior,
            inline_slot: i.inline_slot.clone(),
            is_active: i.is_active,
            tenant_id: i.tenant_id.clone(),
            metadata: i.metadata.clone(),
        }
    }
}

/// Administrative update. `None` leaves a field untouched; for nullable
/// fields `Some(None)` clears the value.
#[derive(Debug, Clone, Default)]
pub struct UpdateInterstitialRequest {
    pub name: Option<String>,
    pub title: Option<String>,
    pub kind: Option<InterstitialType>,
    pub content_type: Option<ContentType>,
    pub content: Option<Option<String>>,
    pub view_name: Option<Option<String>>,
    pub trigger_event: Option<Option<EventName>>,
    pub trigger_routes: Option<Vec<String>>,
    pub trigger_schedule_start: Option<Option<DateTime<Utc>>>,
    pub trigger_schedule_end: Option<Option<DateTime<Utc>>>,
    pub audience_type: Option<AudienceType>,
    pub audience_roles: Option<Vec<String>>,
    pub audience_condition: Option<Option<String>>,
    pub frequency: Option<Frequency>,
    pub frequency_days: Option<Option<u32>>,
    pub priority: Option<i32>,
    pub cta_buttons: Option<Vec<CtaButton>>,
    pub allow_dismiss: Option<bool>,
    pub allow_dont_show_again: Option<bool>,
    pub redirect_after: Option<Option<String>>,
    pub queue_behavior: Option<QueueBehavior>,
    pub inline_slot: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub tenant_id: Option<Option<String>>,
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

// ─── Facts ─────────────────────────────────────────────────────────────────

/// One append-only view fact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewRecord {
    pub id: Uuid,
    pub interstitial_id: InterstitialId,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub action: ViewAction,
    pub viewed_at: DateTime<Utc>,
}

impl ViewRecord {
    pub fn new(
        interstitial_id: InterstitialId,
        identity: &VisitorIdentity,
        action: ViewAction,
        viewed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            interstitial_id,
            user_id: identity.user_id.clone(),
            session_id: identity.session_id.clone(),
            action,
            viewed_at,
        }
    }

    pub fn belongs_to(&self, identity: &VisitorIdentity) -> bool {
        identity.matches(self.user_id.as_deref(), self.session_id.as_deref())
    }
}

/// One append-only form submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseRecord {
    pub id: Uuid,
    pub interstitial_id: InterstitialId,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub data: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl ResponseRecord {
    pub fn new(
        interstitial_id: InterstitialId,
        identity: &VisitorIdentity,
        data: serde_json::Map<String, serde_json::Value>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            interstitial_id,
            user_id: identity.user_id.clone(),
            session_id: identity.session_id.clone(),
            data,
            created_at,
        }
    }

    pub fn belongs_to(&self, identity: &VisitorIdentity) -> bool {
        identity.matches(self.user_id.as_deref(), self.session_id.as_deref())
    }
}

// ─── Queue entries ─────────────────────────────────────────────────────────

/// Why an interstitial entered the request queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "event", rename_all = "snake_case")]
pub enum TriggerSource {
    Manual,
    Route,
    Event(EventName),
    Slot,
    Session,
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSource::Manual => f.write_str("manual"),
            TriggerSource::Route => f.write_str("route"),
            TriggerSource::Event(name) => write!(f, "event:{name}"),
            TriggerSource::Slot => f.write_str("slot"),
            TriggerSource::Session => f.write_str("session"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueuedInterstitial {
    pub interstitial: Interstitial,
    pub source: TriggerSource,
}
