//! Typed business-event names and the host's registry of known events.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{InterludeError, InterludeResult};

const MAX_EVENT_NAME_LEN: usize = 255;

/// Identifier of a host-application event (e.g. `auth.registered`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventName(String);

impl EventName {
    pub fn new(name: impl Into<String>) -> InterludeResult<Self> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(InterludeError::Validation("event name must not be empty".into()));
        }
        if trimmed.len() > MAX_EVENT_NAME_LEN {
            return Err(InterludeError::Validation(format!(
                "event name exceeds {MAX_EVENT_NAME_LEN} characters"
            )));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(InterludeError::Validation(format!(
                "event name '{trimmed}' must not contain whitespace"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EventName {
    type Err = InterludeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for EventName {
    type Error = InterludeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EventName> for String {
    fn from(value: EventName) -> Self {
        value.0
    }
}

/// Events the host application publishes and allows interstitials to
/// trigger on. Definitions naming an unregistered event are rejected at
/// creation time.
#[derive(Debug, Clone, Default)]
pub struct EventRegistry {
    names: BTreeSet<EventName>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events<I, S>(names: I) -> InterludeResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = Self::new();
        for name in names {
            registry.register(name)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, name: impl Into<String>) -> InterludeResult<EventName> {
        let name = EventName::new(name)?;
        self.names.insert(name.clone());
        Ok(name)
    }

    pub fn contains(&self, name: &EventName) -> bool {
        self.names.contains(name)
    }

    pub fn validate(&self, name: &EventName) -> InterludeResult<()> {
        if self.contains(name) {
            Ok(())
        } else {
            Err(InterludeError::Validation(format!(
                "trigger event '{name}' is not a registered event"
            )))
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &EventName> {
        self.names.iter()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_event_name_validation() {
        assert_eq!(EventName::new("  auth.login ").unwrap().as_str(), "auth.login");
        assert!(EventName::new("").is_err());
        assert!(EventName::new("user signed up").is_err());
        assert!(EventName::new("x".repeat(256)).is_err());
    }

    #[test]
    fn test_event_name_serde_is_validated() {
        let ok: EventName = serde_json::from_str("\"order.placed\"").unwrap();
        assert_eq!(ok.to_string(), "order.placed");
        assert!(serde_json::from_str::<EventName>("\"\"").is_err());
        assert_eq!(serde_json::to_string(&ok).unwrap(), "\"order.placed\"");
    }

    #[test]
    fn test_registry() {
        let registry = EventRegistry::with_events(["auth.login", "auth.registered"]).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.validate(&"auth.login".parse().unwrap()).is_ok());

        let err = registry.validate(&"order.placed".parse().unwrap()).unwrap_err();
        assert!(matches!(err, InterludeError::Validation(_)));
    }
}
