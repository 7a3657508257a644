//! Per-visitor session storage.

use dashmap::DashMap;
use interlude_core::InterludeResult;
use uuid::Uuid;

/// JSON values scoped to one visitor's session.
pub trait SessionStore: Send + Sync {
    /// Stable identifier of the session.
    fn id(&self) -> &str;

    fn get(&self, key: &str) -> InterludeResult<Option<serde_json::Value>>;

    fn put(&self, key: &str, value: serde_json::Value) -> InterludeResult<()>;

    fn forget(&self, key: &str) -> InterludeResult<()>;

    /// Read and remove in one step.
    fn pull(&self, key: &str) -> InterludeResult<Option<serde_json::Value>> {
        let value = self.get(key)?;
        if value.is_some() {
            self.forget(key)?;
        }
        Ok(value)
    }
}

/// In-process session for tests, the CLI and single-process hosts.
pub struct MemorySession {
    id: String,
    values: DashMap<String, serde_json::Value>,
}

impl MemorySession {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            values: DashMap::new(),
        }
    }

    /// A session with a random identifier.
    pub fn random() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl SessionStore for MemorySession {
    fn id(&self) -> &str {
        &self.id
    }

    fn get(&self, key: &str) -> InterludeResult<Option<serde_json::Value>> {
        Ok(self.values.get(key).map(|v| v.value().clone()))
    }

    fn put(&self, key: &str, value: serde_json::Value) -> InterludeResult<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn forget(&self, key: &str) -> InterludeResult<()> {
        self.values.remove(key);
        Ok(())
    }

    fn pull(&self, key: &str) -> InterludeResult<Option<serde_json::Value>> {
        Ok(self.values.remove(key).map(|(_, v)| v))
    }
}
