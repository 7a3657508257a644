//! Visitor identity. Who a decision is being made for, and how their
//! view facts are keyed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sentinel identity used when neither a user id nor a session id is known.
pub const ANONYMOUS: &str = "anonymous";

/// The person a decision is made for. `user_id` is `None` for guests.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Visitor {
    pub user_id: Option<String>,
    /// Host-supplied attributes (roles, plan, locale, ...). Read by role
    /// providers and custom audience conditions, never by the engine itself.
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl Visitor {
    pub fn guest() -> Self {
        Self::default()
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self {
            user_id: Some(id.into()),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_none()
    }

    pub fn attribute(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(key)
    }
}

/// The (user id, session id) pair that frequency and suppression facts are
/// keyed by. Blank ids are normalised to `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VisitorIdentity {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
}

impl VisitorIdentity {
    pub fn new(user_id: Option<String>, session_id: Option<String>) -> Self {
        Self {
            user_id: user_id.filter(|id| !id.is_empty()),
            session_id: session_id.filter(|id| !id.is_empty()),
        }
    }

    pub fn for_visitor(visitor: &Visitor, session_id: &str) -> Self {
        Self::new(visitor.user_id.clone(), Some(session_id.to_string()))
    }

    /// User id when present, else session id, else [`ANONYMOUS`].
    pub fn key(&self) -> &str {
        self.user_id
            .as_deref()
            .or(self.session_id.as_deref())
            .unwrap_or(ANONYMOUS)
    }

    /// Whether a recorded fact belongs to this identity. Either id matching
    /// is enough; an identity with neither id only owns facts that carry
    /// neither.
    pub fn matches(&self, user_id: Option<&str>, session_id: Option<&str>) -> bool {
        if self.user_id.is_none() && self.session_id.is_none() {
            return user_id.is_none() && session_id.is_none();
        }
        let user_match = self.user_id.is_some() && self.user_id.as_deref() == user_id;
        let session_match = self.session_id.is_some() && self.session_id.as_deref() == session_id;
        user_match || session_match
    }
}
