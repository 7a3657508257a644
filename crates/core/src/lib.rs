pub mod clock;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod event_name;
pub mod routes;
pub mod templates;
pub mod types;
pub mod validation;
pub mod visitor;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use error::{InterludeError, InterludeResult};
pub use event_bus::{EventSink, EventType, InterstitialEvent};
pub use event_name::{EventName, EventRegistry};
pub use types::{Interstitial, InterstitialId, ViewAction};
pub use visitor::{Visitor, VisitorIdentity};
