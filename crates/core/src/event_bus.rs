//! Outcome notification bus. Fire-and-forget events for external subscribers.
//!
//! The engine accepts an `Arc<dyn EventSink>` and emits one notification per
//! outcome (triggered, viewed, dismissed, completed, response submitted).
//! Subscribers (analytics, business automations) never influence a decision.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::types::{Interstitial, InterstitialId, TriggerSource, ViewAction};
use crate::visitor::VisitorIdentity;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Triggered,
    Viewed,
    Dismissed,
    Completed,
    ResponseSubmitted,
}

impl EventType {
    /// Notification kind for a recorded view action. A don't-show-again is
    /// reported as a dismissal.
    pub fn for_action(action: ViewAction) -> Self {
        match action {
            ViewAction::Viewed => EventType::Viewed,
            ViewAction::Dismissed | ViewAction::DontShowAgain => EventType::Dismissed,
            ViewAction::Completed => EventType::Completed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterstitialEvent {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub interstitial_id: InterstitialId,
    pub interstitial_uuid: Uuid,
    pub interstitial_name: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub action: Option<ViewAction>,
    pub source: Option<TriggerSource>,
    pub data: Option<serde_json::Map<String, serde_json::Value>>,
    pub timestamp: DateTime<Utc>,
}

impl InterstitialEvent {
    pub fn with_action(mut self, action: ViewAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_source(mut self, source: TriggerSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_data(mut self, data: serde_json::Map<String, serde_json::Value>) -> Self {
        self.data = Some(data);
        self
    }
}

/// Trait for publishing outcome notifications. Implementations must not
/// block the caller on subscriber work.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: InterstitialEvent);
}

/// No-op sink for hosts that don't subscribe to outcomes.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: InterstitialEvent) {}
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<InterstitialEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<InterstitialEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn count_type(&self, event_type: EventType) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: InterstitialEvent) {
        self.events.lock().push(event);
    }
}

/// Logs every notification at debug level. Handy while wiring a host.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: InterstitialEvent) {
        tracing::debug!(
            event_type = ?event.event_type,
            interstitial = %event.interstitial_name,
            user_id = ?event.user_id,
            "interstitial notification"
        );
    }
}

/// Convenience builder for creating an `InterstitialEvent` with minimal boilerplate.
pub fn make_event(
    event_type: EventType,
    interstitial: &Interstitial,
    identity: &VisitorIdentity,
    timestamp: DateTime<Utc>,
) -> InterstitialEvent {
    InterstitialEvent {
        event_id: Uuid::new_v4(),
        event_type,
        interstitial_id: interstitial.id,
        interstitial_uuid: interstitial.uuid,
        interstitial_name: interstitial.name.clone(),
        user_id: identity.user_id.clone(),
        session_id: identity.session_id.clone(),
        action: None,
        source: None,
        data: None,
        timestamp,
    }
}

/// Convenience: create a no-op event bus.
pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

/// Convenience: create a capture sink for tests.
pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}
