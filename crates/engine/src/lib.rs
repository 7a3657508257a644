//! Decision engine for interstitials: which definitions apply to a visitor
//! in a given context, whether they may be shown again, how they queue up
//! within a request, and what happens once the visitor responds.

#![warn(clippy::unwrap_used)]

pub mod admin;
pub mod audience;
pub mod context;
pub mod frequency;
pub mod manager;
pub mod queue;
pub mod renderer;
pub mod retention;
pub mod triggers;

pub use admin::{AdminFilter, InterstitialAdmin, InterstitialStats};
pub use audience::{
    AttributeRoleProvider, AttributeTenantResolver, AudienceCondition, AudienceResolver,
    ConditionRegistry, RoleProvider, TenantResolver,
};
pub use context::RequestContext;
pub use frequency::FrequencyChecker;
pub use manager::{Collaborators, InterstitialManager, TriggerContext};
pub use queue::{apply_queue_behavior, RequestQueue};
pub use renderer::{ContentRenderer, StoredContentRenderer};
pub use retention::{RetentionSweeper, SweepReport};
pub use triggers::{EventTrigger, GateDecision, GateRequest, RouteGate};
