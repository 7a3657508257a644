//! Audience resolution: tenant scoping plus the per-interstitial audience
//! rule (everyone, signed-in, guests, roles, custom condition).
//!
//! Misconfiguration fails closed. An unknown custom condition or a missing
//! tenant resolver means "no match", logged at warn level, never an error.

use interlude_core::types::AudienceType;
use interlude_core::{Interstitial, Visitor};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Supplies the role names of a visitor, however the host models roles.
pub trait RoleProvider: Send + Sync {
    fn roles_of(&self, visitor: &Visitor) -> HashSet<String>;
}

/// Reads roles from a visitor attribute. The attribute may hold a single
/// role name, a list of names, or a list of objects with a `name` or `slug`.
pub struct AttributeRoleProvider {
    attribute: String,
}

impl AttributeRoleProvider {
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
        }
    }
}

impl Default for AttributeRoleProvider {
    fn default() -> Self {
        Self::new("roles")
    }
}

impl RoleProvider for AttributeRoleProvider {
    fn roles_of(&self, visitor: &Visitor) -> HashSet<String> {
        let Some(value) = visitor.attribute(&self.attribute) else {
            return HashSet::new();
        };
        match value {
            serde_json::Value::String(role) => HashSet::from([role.clone()]),
            serde_json::Value::Array(items) => items.iter().filter_map(role_name).collect(),
            _ => HashSet::new(),
        }
    }
}

fn role_name(item: &serde_json::Value) -> Option<String> {
    match item {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Object(obj) => obj
            .get("name")
            .or_else(|| obj.get("slug"))
            .and_then(|v| v.as_str())
            .map(str::to_string),
        _ => None,
    }
}

/// Resolves the tenant the current visitor belongs to.
pub trait TenantResolver: Send + Sync {
    fn resolve(&self, visitor: &Visitor) -> Option<String>;
}

/// Tenant taken from a visitor attribute (string or number).
pub struct AttributeTenantResolver {
    attribute: String,
}

impl AttributeTenantResolver {
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
        }
    }
}

impl TenantResolver for AttributeTenantResolver {
    fn resolve(&self, visitor: &Visitor) -> Option<String> {
        match visitor.attribute(&self.attribute)? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// A host-defined audience rule referenced by name from
/// `Interstitial::audience_condition`.
pub trait AudienceCondition: Send + Sync {
    fn passes(&self, visitor: &Visitor, interstitial: &Interstitial) -> bool;
}

impl<F> AudienceCondition for F
where
    F: Fn(&Visitor, &Interstitial) -> bool + Send + Sync,
{
    fn passes(&self, visitor: &Visitor, interstitial: &Interstitial) -> bool {
        self(visitor, interstitial)
    }
}

/// Named custom conditions supplied by the host.
#[derive(Default, Clone)]
pub struct ConditionRegistry {
    conditions: HashMap<String, Arc<dyn AudienceCondition>>,
}

impl ConditionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, condition: Arc<dyn AudienceCondition>) {
        self.conditions.insert(name.into(), condition);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn AudienceCondition>> {
        self.conditions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.conditions.contains_key(name)
    }
}

pub struct AudienceResolver {
    multi_tenant: bool,
    tenants: Option<Arc<dyn TenantResolver>>,
    roles: Arc<dyn RoleProvider>,
    conditions: ConditionRegistry,
}

impl AudienceResolver {
    pub fn new(roles: Arc<dyn RoleProvider>, conditions: ConditionRegistry) -> Self {
        Self {
            multi_tenant: false,
            tenants: None,
            roles,
            conditions,
        }
    }

    /// Enable tenant scoping. Without a resolver every tenant-bound
    /// interstitial is excluded.
    pub fn with_tenancy(mut self, tenants: Option<Arc<dyn TenantResolver>>) -> Self {
        if tenants.is_none() {
            warn!("Multi-tenancy enabled without a tenant resolver; tenant-bound interstitials will never match");
        }
        self.multi_tenant = true;
        self.tenants = tenants;
        self
    }

    pub fn is_multi_tenant(&self) -> bool {
        self.multi_tenant
    }

    /// The visitor's tenant, when tenancy is enabled and resolvable.
    pub fn current_tenant(&self, visitor: &Visitor) -> Option<String> {
        self.tenants.as_ref().and_then(|t| t.resolve(visitor))
    }

    pub fn matches(&self, interstitial: &Interstitial, visitor: &Visitor) -> bool {
        if !self.matches_tenant(interstitial, visitor) {
            return false;
        }

        match interstitial.audience_type {
            AudienceType::All => true,
            AudienceType::Authenticated => !visitor.is_anonymous(),
            AudienceType::Guest => visitor.is_anonymous(),
            AudienceType::Roles => self.matches_roles(interstitial, visitor),
            AudienceType::Custom => self.matches_condition(interstitial, visitor),
        }
    }

    fn matches_tenant(&self, interstitial: &Interstitial, visitor: &Visitor) -> bool {
        if !self.multi_tenant {
            return true;
        }
        let Some(required) = &interstitial.tenant_id else {
            return true;
        };
        let current = self.current_tenant(visitor);
        let matched = current.as_deref() == Some(required.as_str());
        if !matched {
            debug!(
                interstitial = %interstitial.name,
                required = %required,
                current = ?current,
                "Tenant mismatch"
            );
        }
        matched
    }

    fn matches_roles(&self, interstitial: &Interstitial, visitor: &Visitor) -> bool {
        if visitor.is_anonymous() {
            return false;
        }
        if interstitial.audience_roles.is_empty() {
            return true;
        }
        let held = self.roles.roles_of(visitor);
        interstitial.audience_roles.iter().any(|r| held.contains(r))
    }

    fn matches_condition(&self, interstitial: &Interstitial, visitor: &Visitor) -> bool {
        let Some(name) = interstitial.audience_condition.as_deref().filter(|n| !n.is_empty()) else {
            return true;
        };
        match self.conditions.get(name) {
            Some(condition) => condition.passes(visitor, interstitial),
            None => {
                warn!(
                    interstitial = %interstitial.name,
                    condition = name,
                    "Unknown audience condition; treating as no match"
                );
                false
            }
        }
    }
}

impl Default for AudienceResolver {
    fn default() -> Self {
        Self::new(Arc::new(AttributeRoleProvider::default()), ConditionRegistry::new())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use interlude_core::types::CreateInterstitialRequest;
    use serde_json::json;

    fn interstitial(audience: AudienceType) -> Interstitial {
        let mut req = CreateInterstitialRequest::named("promo", "Promo");
        req.audience_type = audience;
        Interstitial::from_request(1, req, Utc::now())
    }

    #[test]
    fn test_basic_audiences() {
        let resolver = AudienceResolver::default();
        let guest = Visitor::guest();
        let user = Visitor::user("42");

        assert!(resolver.matches(&interstitial(AudienceType::All), &guest));
        assert!(resolver.matches(&interstitial(AudienceType::Authenticated), &user));
        assert!(!resolver.matches(&interstitial(AudienceType::Authenticated), &guest));
        assert!(resolver.matches(&interstitial(AudienceType::Guest), &guest));
        assert!(!resolver.matches(&interstitial(AudienceType::Guest), &user));
    }

    #[test]
    fn test_roles() {
        let resolver = AudienceResolver::default();
        let mut i = interstitial(AudienceType::Roles);

        // Empty role list admits any signed-in visitor.
        assert!(resolver.matches(&i, &Visitor::user("1")));
        assert!(!resolver.matches(&i, &Visitor::guest()));

        i.audience_roles = vec!["admin".into(), "editor".into()];
        let editor = Visitor::user("2").with_attribute("roles", json!(["viewer", "editor"]));
        let viewer = Visitor::user("3").with_attribute("roles", json!(["viewer"]));
        let no_roles = Visitor::user("4");
        assert!(resolver.matches(&i, &editor));
        assert!(!resolver.matches(&i, &viewer));
        assert!(!resolver.matches(&i, &no_roles));
    }

    #[test]
    fn test_attribute_role_shapes() {
        let provider = AttributeRoleProvider::default();
        let scalar = Visitor::user("1").with_attribute("roles", json!("admin"));
        let objects = Visitor::user("1")
            .with_attribute("roles", json!([{"name": "admin"}, {"slug": "billing"}, 7]));
        assert_eq!(provider.roles_of(&scalar), HashSet::from(["admin".to_string()]));
        assert_eq!(
            provider.roles_of(&objects),
            HashSet::from(["admin".to_string(), "billing".to_string()])
        );

        let single = AttributeRoleProvider::new("role");
        let v = Visitor::user("1").with_attribute("role", json!("support"));
        assert!(single.roles_of(&v).contains("support"));
    }

    #[test]
    fn test_custom_condition() {
        let mut conditions = ConditionRegistry::new();
        conditions.register(
            "pro_plan",
            Arc::new(|v: &Visitor, _: &Interstitial| v.attribute("plan") == Some(&json!("pro"))),
        );
        let resolver = AudienceResolver::new(Arc::new(AttributeRoleProvider::default()), conditions);

        let mut i = interstitial(AudienceType::Custom);
        // No condition reference passes everyone.
        assert!(resolver.matches(&i, &Visitor::guest()));

        i.audience_condition = Some("pro_plan".into());
        assert!(resolver.matches(&i, &Visitor::user("1").with_attribute("plan", json!("pro"))));
        assert!(!resolver.matches(&i, &Visitor::user("1").with_attribute("plan", json!("free"))));

        i.audience_condition = Some("missing".into());
        assert!(!resolver.matches(&i, &Visitor::user("1")));
    }

    #[test]
    fn test_tenant_isolation() {
        let resolver = AudienceResolver::default()
            .with_tenancy(Some(Arc::new(AttributeTenantResolver::new("tenant_id"))));
        let mut i = interstitial(AudienceType::All);
        i.tenant_id = Some("5".into());

        let t5 = Visitor::guest().with_attribute("tenant_id", json!(5));
        let t6 = Visitor::guest().with_attribute("tenant_id", json!("6"));
        assert!(resolver.matches(&i, &t5));
        assert!(!resolver.matches(&i, &t6));
        assert!(!resolver.matches(&i, &Visitor::guest()));

        i.tenant_id = None;
        assert!(resolver.matches(&i, &t6));
    }

    #[test]
    fn test_tenancy_without_resolver_fails_closed() {
        let resolver = AudienceResolver::default().with_tenancy(None);
        let mut i = interstitial(AudienceType::All);
        assert!(resolver.matches(&i, &Visitor::guest()));
        i.tenant_id = Some("5".into());
        assert!(!resolver.matches(&i, &Visitor::guest()));
    }
}
