//! Per-request queue of triggered interstitials and the queue-behavior
//! rules deciding which of them are actually presented together.

use interlude_core::config::{QueueConfig, QueueMode};
use interlude_core::types::{InterstitialType, QueueBehavior, QueuedInterstitial, TriggerSource};
use interlude_core::{Interstitial, InterstitialId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Session form of a queue entry. Only the id is kept; the definition is
/// re-read on the next request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub interstitial_id: InterstitialId,
    pub source: TriggerSource,
}

/// Interstitials queued during one request, in queuing order.
#[derive(Debug, Clone, Default)]
pub struct RequestQueue {
    items: Vec<QueuedInterstitial>,
    session_loaded: bool,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, interstitial: Interstitial, source: TriggerSource) {
        self.items.push(QueuedInterstitial { interstitial, source });
    }

    pub fn items(&self) -> &[QueuedInterstitial] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_session_loaded(&self) -> bool {
        self.session_loaded
    }

    pub(crate) fn mark_session_loaded(&mut self) {
        self.session_loaded = true;
    }

    pub fn to_entries(&self) -> Vec<PersistedEntry> {
        self.items
            .iter()
            .map(|q| PersistedEntry {
                interstitial_id: q.interstitial.id,
                source: q.source.clone(),
            })
            .collect()
    }

    /// Queued interstitials, optionally of one type, without duplicates.
    pub fn interstitials(&self, kind: Option<InterstitialType>) -> Vec<Interstitial> {
        let mut seen = HashSet::new();
        self.items
            .iter()
            .map(|q| &q.interstitial)
            .filter(|i| kind.map_or(true, |k| i.kind == k))
            .filter(|i| seen.insert(i.id))
            .cloned()
            .collect()
    }
}

/// Decide which queued interstitials are presented.
///
/// * `all`: everything, in queuing order.
/// * `priority`: only the highest-priority item.
/// * `configurable`: walk by priority; show-with-others items accumulate
///   until an exclusive item is met. An exclusive item is selected only
///   when nothing was selected before it, and then it stands alone.
///
/// Outside `all` mode the result depends only on priority, id and
/// behavior, never on queuing order.
pub fn apply_queue_behavior(items: &[Interstitial], config: &QueueConfig) -> Vec<Interstitial> {
    if config.mode == QueueMode::All {
        return items.to_vec();
    }

    let mut ordered = items.to_vec();
    ordered.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));

    if config.mode == QueueMode::Priority {
        ordered.truncate(1);
        return ordered;
    }

    let mut result = Vec::new();
    for interstitial in ordered {
        match interstitial.effective_queue_behavior(config.default_behavior) {
            QueueBehavior::Exclusive if result.is_empty() => {
                result.push(interstitial);
                break;
            }
            QueueBehavior::Exclusive => break,
            _ => result.push(interstitial),
        }
    }
    result
}
