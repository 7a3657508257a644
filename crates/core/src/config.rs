use serde::Deserialize;

use crate::types::QueueBehavior;

/// Root application configuration. Loaded from environment variables
/// with the prefix `INTERLUDE__` and an optional TOML config file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub form_storage: FormStorage,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub multi_tenant: MultiTenantConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub full_page: FullPageConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Where view facts are written and read from.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    Cache,
    #[default]
    Store,
    Both,
}

impl StorageMode {
    pub fn uses_cache(self) -> bool {
        matches!(self, StorageMode::Cache | StorageMode::Both)
    }

    pub fn uses_store(self) -> bool {
        matches!(self, StorageMode::Store | StorageMode::Both)
    }
}

/// What happens to submitted form data.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FormStorage {
    Store,
    Notify,
    #[default]
    Both,
}

impl FormStorage {
    pub fn persists(self) -> bool {
        matches!(self, FormStorage::Store | FormStorage::Both)
    }

    pub fn notifies(self) -> bool {
        matches!(self, FormStorage::Notify | FormStorage::Both)
    }
}

/// Global queue resolution mode.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueMode {
    All,
    Priority,
    #[default]
    Configurable,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    #[serde(default)]
    pub storage: StorageMode,
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub mode: QueueMode,
    #[serde(default = "default_queue_behavior")]
    pub default_behavior: QueueBehavior,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MultiTenantConfig {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_queued_key")]
    pub queued_key: String,
    #[serde(default = "default_viewed_key")]
    pub viewed_key: String,
    #[serde(default = "default_intended_url_key")]
    pub intended_url_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FullPageConfig {
    #[serde(default = "default_route_prefix")]
    pub route_prefix: String,
    #[serde(default = "default_redirect_to_original")]
    pub redirect_to_original: bool,
    #[serde(default = "default_admin_prefix")]
    pub admin_prefix: String,
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_retention_days")]
    pub days: u32,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheDriver {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub driver: CacheDriver,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

// Default functions
fn default_cache_prefix() -> String {
    "interlude".to_string()
}
fn default_cache_ttl_secs() -> u64 {
    60 * 60 * 24 * 30
}
fn default_queue_behavior() -> QueueBehavior {
    QueueBehavior::ShowWithOthers
}
fn default_queued_key() -> String {
    "interlude_queued".to_string()
}
fn default_viewed_key() -> String {
    "interlude_viewed_this_session".to_string()
}
fn default_intended_url_key() -> String {
    "interlude_intended_url".to_string()
}
fn default_route_prefix() -> String {
    "interstitial".to_string()
}
fn default_redirect_to_original() -> bool {
    true
}
fn default_admin_prefix() -> String {
    "admin/interstitials".to_string()
}
fn default_api_prefix() -> String {
    "api/".to_string()
}
fn default_retention_days() -> u32 {
    90
}
fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}
fn default_max_entries() -> usize {
    1_000_000
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            storage: StorageMode::default(),
            cache_prefix: default_cache_prefix(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            mode: QueueMode::default(),
            default_behavior: default_queue_behavior(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            queued_key: default_queued_key(),
            viewed_key: default_viewed_key(),
            intended_url_key: default_intended_url_key(),
        }
    }
}

impl Default for FullPageConfig {
    fn default() -> Self {
        Self {
            route_prefix: default_route_prefix(),
            redirect_to_original: default_redirect_to_original(),
            admin_prefix: default_admin_prefix(),
            api_prefix: default_api_prefix(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: default_retention_days(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            driver: CacheDriver::default(),
            redis_url: default_redis_url(),
            max_entries: default_max_entries(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tracking: TrackingConfig::default(),
            form_storage: FormStorage::default(),
            queue: QueueConfig::default(),
            multi_tenant: MultiTenantConfig::default(),
            session: SessionConfig::default(),
            full_page: FullPageConfig::default(),
            retention: RetentionConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables only.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from an optional TOML file, overlaid with
    /// `INTERLUDE__` environment variables.
    pub fn load_from(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        let builder = builder.add_source(
            config::Environment::with_prefix("INTERLUDE")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_package_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.tracking.storage, StorageMode::Store);
        assert_eq!(config.tracking.cache_ttl_secs, 2_592_000);
        assert_eq!(config.form_storage, FormStorage::Both);
        assert_eq!(config.queue.mode, QueueMode::Configurable);
        assert_eq!(config.queue.default_behavior, QueueBehavior::ShowWithOthers);
        assert!(!config.multi_tenant.enabled);
        assert_eq!(config.retention.days, 90);
        assert_eq!(config.full_page.route_prefix, "interstitial");
    }

    #[test]
    fn test_storage_mode_flags() {
        assert!(StorageMode::Both.uses_cache() && StorageMode::Both.uses_store());
        assert!(StorageMode::Cache.uses_cache() && !StorageMode::Cache.uses_store());
        assert!(!StorageMode::Store.uses_cache() && StorageMode::Store.uses_store());
        assert!(FormStorage::Notify.notifies() && !FormStorage::Notify.persists());
    }

    #[test]
    fn test_partial_deserialize_fills_defaults() {
        let json = serde_json::json!({
            "tracking": { "storage": "both" },
            "queue": { "mode": "priority" }
        });
        let config: AppConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.tracking.storage, StorageMode::Both);
        assert_eq!(config.tracking.cache_prefix, "interlude");
        assert_eq!(config.queue.mode, QueueMode::Priority);
        assert_eq!(config.session.queued_key, "interlude_queued");
    }
}
