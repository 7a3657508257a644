//! Persistence collaborators for the decision engine: interstitial
//! definitions, view history, form responses and per-visitor sessions.
//!
//! Data is held in DashMap (development, tests, CLI evaluation); hosts swap
//! in their own database by implementing the traits in [`repository`].

#![warn(clippy::unwrap_used)]

pub mod memory;
pub mod query;
pub mod repository;
pub mod session;

pub use memory::MemoryStore;
pub use query::{InterstitialQuery, QueryOrder, TenantScope, TrashedScope};
pub use repository::{InterstitialStore, ResponseStore, ViewQuery, ViewStore};
pub use session::{MemorySession, SessionStore};
