//! Policy definitions and the policy store contract
//!
//! A policy is a named collection of rules attached either to a resource
//! kind (resource policy, optionally scoped) or to a principal or role set
//! (principal policy, constrained by resource selectors). Stores bump a
//! monotonic epoch on every mutation; the decision cache folds the epoch
//! into its keys, so mutations invalidate cached decisions automatically.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};

use crate::derived_roles::DerivedRole;
use crate::error::{AuthzError, Result};
use crate::types::{Effect, Resource};

/// A single `(actions, roles, condition, effect)` predicate inside a policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Rule name, unique within its policy by convention
    pub name: String,

    /// Actions this rule covers; `"*"` matches any action
    pub actions: Vec<String>,

    /// Effect produced when the rule matches
    pub effect: Effect,

    /// Roles required for the rule to apply; empty means any role
    #[serde(default)]
    pub roles: Vec<String>,

    /// Optional boolean condition source
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl Rule {
    pub fn new(name: impl Into<String>, actions: Vec<String>, effect: Effect) -> Self {
        Self {
            name: name.into(),
            actions,
            effect,
            roles: Vec::new(),
            condition: None,
        }
    }

    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Whether this rule covers the given action
    pub fn matches_action(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a == "*" || a == action)
    }

    /// Whether this rule applies to a principal holding the given roles
    pub fn matches_roles(&self, principal_roles: &[String]) -> bool {
        if self.roles.is_empty() {
            return true;
        }

        self.roles
            .iter()
            .any(|required| principal_roles.iter().any(|held| held == required))
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(AuthzError::InvalidPolicy(
                "rule name cannot be empty".to_string(),
            ));
        }
        if self.actions.is_empty() {
            return Err(AuthzError::InvalidPolicy(format!(
                "rule '{}' must cover at least one action",
                self.name
            )));
        }
        if self.actions.iter().any(|a| a.is_empty()) {
            return Err(AuthzError::InvalidPolicy(format!(
                "rule '{}' has an empty action",
                self.name
            )));
        }
        Ok(())
    }
}

/// Resource constraint carried by principal policies
///
/// Matching is kind equality (`"*"` matches any kind), an optional glob id
/// pattern, and exact attribute equality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSelector {
    /// Resource kind this selector applies to
    pub kind: String,

    /// Optional glob pattern over the resource id (e.g. "doc-*")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_pattern: Option<String>,

    /// Attribute values the resource must carry
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
}

impl ResourceSelector {
    pub fn kind(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id_pattern: None,
            attributes: HashMap::new(),
        }
    }

    pub fn with_id_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.id_pattern = Some(pattern.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Whether the selector matches the given resource
    pub fn matches_resource(&self, resource: &Resource) -> bool {
        if self.kind != "*" && self.kind != resource.kind {
            return false;
        }

        if let Some(pattern) = &self.id_pattern {
            if !glob_match(pattern, &resource.id) {
                return false;
            }
        }

        self.attributes
            .iter()
            .all(|(k, v)| resource.attributes.get(k) == Some(v))
    }
}

/// Match a glob pattern (only `*` is special) against a value
fn glob_match(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    if pattern.contains('*') {
        let regex_pattern = format!("^{}$", regex::escape(pattern).replace(r"\*", ".*"));
        if let Ok(regex) = regex::Regex::new(&regex_pattern) {
            return regex.is_match(value);
        }
    }

    pattern == value
}

/// A named collection of rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Unique name within the store
    pub name: String,

    /// Resource kind this policy governs; `"*"` matches any kind
    pub resource_kind: String,

    /// Exact scope segment this policy lives at; empty means global
    #[serde(default)]
    pub scope: String,

    /// True when attached to a principal or role set rather than a resource
    #[serde(default)]
    pub principal_policy: bool,

    /// Principal a principal-specific policy is attached to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal_id: Option<String>,

    /// Roles a role-based principal policy is attached to
    #[serde(default)]
    pub roles: Vec<String>,

    /// Resource selectors, consulted only for principal policies
    #[serde(default)]
    pub resources: Vec<ResourceSelector>,

    /// Ordered rules
    pub rules: Vec<Rule>,
}

impl Policy {
    /// Create a resource policy for a kind
    pub fn resource_policy(name: impl Into<String>, resource_kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_kind: resource_kind.into(),
            scope: String::new(),
            principal_policy: false,
            principal_id: None,
            roles: Vec::new(),
            resources: Vec::new(),
            rules: Vec::new(),
        }
    }

    /// Create a policy attached to a specific principal
    pub fn principal_policy(
        name: impl Into<String>,
        resource_kind: impl Into<String>,
        principal_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            resource_kind: resource_kind.into(),
            scope: String::new(),
            principal_policy: true,
            principal_id: Some(principal_id.into()),
            roles: Vec::new(),
            resources: Vec::new(),
            rules: Vec::new(),
        }
    }

    /// Create a principal policy attached to a role set
    pub fn role_policy(
        name: impl Into<String>,
        resource_kind: impl Into<String>,
        roles: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            resource_kind: resource_kind.into(),
            scope: String::new(),
            principal_policy: true,
            principal_id: None,
            roles,
            resources: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_resource_selector(mut self, selector: ResourceSelector) -> Self {
        self.resources.push(selector);
        self
    }

    /// Whether the policy governs the given resource kind
    pub fn matches_kind(&self, resource_kind: &str) -> bool {
        self.resource_kind == "*" || self.resource_kind == resource_kind
    }

    /// Whether any rule covers any of the given actions
    pub fn covers_any_action(&self, actions: &[String]) -> bool {
        self.rules
            .iter()
            .any(|rule| actions.iter().any(|action| rule.matches_action(action)))
    }

    /// Whether the resource satisfies this policy's selectors
    ///
    /// Only meaningful for principal policies; an empty selector list
    /// leaves the resource unconstrained.
    pub fn selectors_match(&self, resource: &Resource) -> bool {
        if self.resources.is_empty() {
            return true;
        }
        self.resources.iter().any(|s| s.matches_resource(resource))
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(AuthzError::InvalidPolicy(
                "policy name cannot be empty".to_string(),
            ));
        }
        if self.resource_kind.is_empty() {
            return Err(AuthzError::InvalidPolicy(format!(
                "policy '{}' must name a resource kind",
                self.name
            )));
        }
        if self.rules.is_empty() {
            return Err(AuthzError::InvalidPolicy(format!(
                "policy '{}' must contain at least one rule",
                self.name
            )));
        }
        for rule in &self.rules {
            rule.validate()?;
        }
        Ok(())
    }
}

/// A loadable bundle of policies and derived roles
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicySet {
    #[serde(default)]
    pub policies: Vec<Policy>,

    #[serde(default, rename = "derivedRoles")]
    pub derived_roles: Vec<DerivedRole>,
}

/// Lookup and mutation surface the decision engine depends on
///
/// Implementations must bump the epoch on every mutation. Reads may run
/// concurrently; writes are serialized by the implementation.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Get a policy by name
    async fn get(&self, name: &str) -> Result<Option<Policy>>;

    /// Enumerate all policies
    async fn get_all(&self) -> Result<Vec<Policy>>;

    /// Resource policies for a kind that cover any of the actions
    async fn find_policies(&self, resource_kind: &str, actions: &[String]) -> Result<Vec<Policy>>;

    /// Resource policies at an exact scope for a kind covering the actions
    async fn find_policies_for_scope(
        &self,
        scope: &str,
        resource_kind: &str,
        actions: &[String],
    ) -> Result<Vec<Policy>>;

    /// Principal-specific policies for a principal id and kind
    async fn find_policies_by_principal(
        &self,
        principal_id: &str,
        resource_kind: &str,
    ) -> Result<Vec<Policy>>;

    /// Role-based principal policies whose role set intersects `roles`
    async fn find_policies_by_roles(
        &self,
        roles: &[String],
        resource_kind: &str,
    ) -> Result<Vec<Policy>>;

    /// Add or replace a policy
    async fn add(&self, policy: Policy) -> Result<()>;

    /// Remove a policy by name
    async fn remove(&self, name: &str) -> Result<()>;

    /// Remove all policies
    async fn clear(&self) -> Result<()>;

    /// Number of stored policies
    async fn count(&self) -> usize;

    /// Replace the store contents with a policy set
    async fn load(&self, set: PolicySet) -> Result<()>;

    /// Re-apply the last loaded policy set
    async fn reload(&self) -> Result<()>;

    /// All derived-role definitions
    async fn get_derived_roles(&self) -> Result<Vec<DerivedRole>>;

    /// A derived-role definition by name
    async fn get_derived_role(&self, name: &str) -> Result<Option<DerivedRole>>;

    /// Add or replace a derived role
    async fn add_derived_role(&self, role: DerivedRole) -> Result<()>;

    /// Remove a derived role by name
    async fn remove_derived_role(&self, name: &str) -> Result<()>;

    /// Remove all derived roles
    async fn clear_derived_roles(&self) -> Result<()>;

    /// Monotonic counter bumped on any mutation
    fn epoch(&self) -> u64;
}

/// Reference in-memory policy store
pub struct MemoryPolicyStore {
    policies: RwLock<HashMap<String, Policy>>,
    derived_roles: RwLock<HashMap<String, DerivedRole>>,
    last_loaded: Mutex<Option<PolicySet>>,
    epoch: AtomicU64,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self {
            policies: RwLock::new(HashMap::new()),
            derived_roles: RwLock::new(HashMap::new()),
            last_loaded: Mutex::new(None),
            epoch: AtomicU64::new(0),
        }
    }

    fn bump_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }
}

impl Default for MemoryPolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn get(&self, name: &str) -> Result<Option<Policy>> {
        Ok(self.policies.read().await.get(name).cloned())
    }

    async fn get_all(&self) -> Result<Vec<Policy>> {
        let mut all: Vec<Policy> = self.policies.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn find_policies(&self, resource_kind: &str, actions: &[String]) -> Result<Vec<Policy>> {
        let mut found: Vec<Policy> = self
            .policies
            .read()
            .await
            .values()
            .filter(|p| !p.principal_policy)
            .filter(|p| p.matches_kind(resource_kind))
            .filter(|p| actions.is_empty() || p.covers_any_action(actions))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn find_policies_for_scope(
        &self,
        scope: &str,
        resource_kind: &str,
        actions: &[String],
    ) -> Result<Vec<Policy>> {
        let mut found: Vec<Policy> = self
            .policies
            .read()
            .await
            .values()
            .filter(|p| !p.principal_policy)
            .filter(|p| p.scope == scope)
            .filter(|p| p.matches_kind(resource_kind))
            .filter(|p| actions.is_empty() || p.covers_any_action(actions))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn find_policies_by_principal(
        &self,
        principal_id: &str,
        resource_kind: &str,
    ) -> Result<Vec<Policy>> {
        let mut found: Vec<Policy> = self
            .policies
            .read()
            .await
            .values()
            .filter(|p| p.principal_policy)
            .filter(|p| p.principal_id.as_deref() == Some(principal_id))
            .filter(|p| p.matches_kind(resource_kind))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn find_policies_by_roles(
        &self,
        roles: &[String],
        resource_kind: &str,
    ) -> Result<Vec<Policy>> {
        let mut found: Vec<Policy> = self
            .policies
            .read()
            .await
            .values()
            .filter(|p| p.principal_policy && p.principal_id.is_none())
            .filter(|p| p.roles.iter().any(|r| roles.contains(r)))
            .filter(|p| p.matches_kind(resource_kind))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn add(&self, policy: Policy) -> Result<()> {
        policy.validate()?;
        self.policies
            .write()
            .await
            .insert(policy.name.clone(), policy);
        self.bump_epoch();
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        if self.policies.write().await.remove(name).is_none() {
            return Err(AuthzError::PolicyNotFound(name.to_string()));
        }
        self.bump_epoch();
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.policies.write().await.clear();
        self.bump_epoch();
        Ok(())
    }

    async fn count(&self) -> usize {
        self.policies.read().await.len()
    }

    async fn load(&self, set: PolicySet) -> Result<()> {
        for policy in &set.policies {
            policy.validate()?;
        }
        for role in &set.derived_roles {
            role.validate()?;
        }

        // Build fresh maps first so a bad set never half-replaces the store
        let mut fresh_policies = HashMap::with_capacity(set.policies.len());
        for policy in &set.policies {
            if fresh_policies
                .insert(policy.name.clone(), policy.clone())
                .is_some()
            {
                return Err(AuthzError::InvalidPolicy(format!(
                    "duplicate policy name '{}'",
                    policy.name
                )));
            }
        }
        let mut fresh_roles = HashMap::with_capacity(set.derived_roles.len());
        for role in &set.derived_roles {
            fresh_roles.insert(role.name.clone(), role.clone());
        }

        *self.policies.write().await = fresh_policies;
        *self.derived_roles.write().await = fresh_roles;
        *self.last_loaded.lock().await = Some(set);
        self.bump_epoch();
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        let snapshot = self.last_loaded.lock().await.clone();
        match snapshot {
            Some(set) => self.load(set).await,
            None => Err(AuthzError::PolicyStore(
                "nothing loaded; reload has no source".to_string(),
            )),
        }
    }

    async fn get_derived_roles(&self) -> Result<Vec<DerivedRole>> {
        let mut all: Vec<DerivedRole> =
            self.derived_roles.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn get_derived_role(&self, name: &str) -> Result<Option<DerivedRole>> {
        Ok(self.derived_roles.read().await.get(name).cloned())
    }

    async fn add_derived_role(&self, role: DerivedRole) -> Result<()> {
        role.validate()?;
        self.derived_roles
            .write()
            .await
            .insert(role.name.clone(), role);
        self.bump_epoch();
        Ok(())
    }

    async fn remove_derived_role(&self, name: &str) -> Result<()> {
        if self.derived_roles.write().await.remove(name).is_none() {
            return Err(AuthzError::RoleNotFound(name.to_string()));
        }
        self.bump_epoch();
        Ok(())
    }

    async fn clear_derived_roles(&self) -> Result<()> {
        self.derived_roles.write().await.clear();
        self.bump_epoch();
        Ok(())
    }

    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn allow_rule(name: &str, actions: &[&str]) -> Rule {
        Rule::new(
            name,
            actions.iter().map(|a| a.to_string()).collect(),
            Effect::Allow,
        )
    }

    #[test]
    fn test_rule_action_matching() {
        let rule = allow_rule("read-only", &["read"]);
        assert!(rule.matches_action("read"));
        assert!(!rule.matches_action("write"));

        let wildcard = allow_rule("anything", &["*"]);
        assert!(wildcard.matches_action("read"));
        assert!(wildcard.matches_action("delete"));
    }

    #[test]
    fn test_rule_role_matching() {
        let any_role = allow_rule("open", &["read"]);
        assert!(any_role.matches_roles(&["anyone".to_string()]));
        assert!(any_role.matches_roles(&[]));

        let admin_only = allow_rule("admin", &["read"]).with_roles(vec!["admin".to_string()]);
        assert!(admin_only.matches_roles(&["admin".to_string(), "user".to_string()]));
        assert!(!admin_only.matches_roles(&["user".to_string()]));
    }

    #[test]
    fn test_rule_validation() {
        assert!(allow_rule("ok", &["read"]).validate().is_ok());
        assert!(Rule::new("bad", vec![], Effect::Allow).validate().is_err());
        assert!(Rule::new("", vec!["read".to_string()], Effect::Allow)
            .validate()
            .is_err());
    }

    #[test]
    fn test_selector_matching() {
        let resource = Resource::new("document", "doc-42")
            .with_attribute("classification", "internal");

        assert!(ResourceSelector::kind("document").matches_resource(&resource));
        assert!(ResourceSelector::kind("*").matches_resource(&resource));
        assert!(!ResourceSelector::kind("report").matches_resource(&resource));

        assert!(ResourceSelector::kind("document")
            .with_id_pattern("doc-*")
            .matches_resource(&resource));
        assert!(!ResourceSelector::kind("document")
            .with_id_pattern("rpt-*")
            .matches_resource(&resource));

        assert!(ResourceSelector::kind("document")
            .with_attribute("classification", "internal")
            .matches_resource(&resource));
        assert!(!ResourceSelector::kind("document")
            .with_attribute("classification", "public")
            .matches_resource(&resource));
    }

    #[test]
    fn test_policy_selectors_empty_is_unconstrained() {
        let policy = Policy::principal_policy("p", "document", "u1")
            .with_rule(allow_rule("r", &["read"]));
        assert!(policy.selectors_match(&Resource::new("document", "any")));
    }

    #[test]
    fn test_policy_validation() {
        let ok = Policy::resource_policy("doc", "document").with_rule(allow_rule("r", &["read"]));
        assert!(ok.validate().is_ok());

        let no_rules = Policy::resource_policy("doc", "document");
        assert!(no_rules.validate().is_err());
    }

    #[tokio::test]
    async fn test_store_crud_and_epoch() {
        let store = MemoryPolicyStore::new();
        assert_eq!(store.epoch(), 0);

        let policy =
            Policy::resource_policy("doc", "document").with_rule(allow_rule("r", &["read"]));
        store.add(policy).await.unwrap();
        assert_eq!(store.epoch(), 1);
        assert_eq!(store.count().await, 1);

        assert!(store.get("doc").await.unwrap().is_some());
        assert!(store.get("missing").await.unwrap().is_none());

        store.remove("doc").await.unwrap();
        assert_eq!(store.epoch(), 2);
        assert_eq!(store.count().await, 0);

        assert!(store.remove("doc").await.is_err());
    }

    #[tokio::test]
    async fn test_find_policies_filters() {
        let store = MemoryPolicyStore::new();

        store
            .add(Policy::resource_policy("doc-global", "document")
                .with_rule(allow_rule("read", &["read"])))
            .await
            .unwrap();
        store
            .add(Policy::resource_policy("doc-scoped", "document")
                .with_scope("acme.corp")
                .with_rule(allow_rule("read", &["read"])))
            .await
            .unwrap();
        store
            .add(Policy::principal_policy("alice", "document", "u1")
                .with_rule(allow_rule("read", &["read"])))
            .await
            .unwrap();
        store
            .add(Policy::role_policy("admins", "document", vec!["admin".to_string()])
                .with_rule(allow_rule("any", &["*"])))
            .await
            .unwrap();

        let actions = vec!["read".to_string()];

        let resource = store.find_policies("document", &actions).await.unwrap();
        assert_eq!(
            resource.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            vec!["doc-global", "doc-scoped"]
        );

        let scoped = store
            .find_policies_for_scope("acme.corp", "document", &actions)
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].name, "doc-scoped");

        let by_principal = store
            .find_policies_by_principal("u1", "document")
            .await
            .unwrap();
        assert_eq!(by_principal.len(), 1);
        assert_eq!(by_principal[0].name, "alice");

        let by_roles = store
            .find_policies_by_roles(&["admin".to_string()], "document")
            .await
            .unwrap();
        assert_eq!(by_roles.len(), 1);
        assert_eq!(by_roles[0].name, "admins");

        let none = store
            .find_policies_by_roles(&["viewer".to_string()], "document")
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_action_coverage_filter() {
        let store = MemoryPolicyStore::new();
        store
            .add(Policy::resource_policy("writes", "document")
                .with_rule(allow_rule("write", &["write"])))
            .await
            .unwrap();

        let for_read = store
            .find_policies("document", &["read".to_string()])
            .await
            .unwrap();
        assert!(for_read.is_empty());

        let for_write = store
            .find_policies("document", &["write".to_string()])
            .await
            .unwrap();
        assert_eq!(for_write.len(), 1);
    }

    #[tokio::test]
    async fn test_load_and_reload() {
        let store = MemoryPolicyStore::new();

        let set: PolicySet = serde_json::from_value(json!({
            "policies": [{
                "name": "doc",
                "resource_kind": "document",
                "rules": [{"name": "read", "actions": ["read"], "effect": "ALLOW"}]
            }],
            "derivedRoles": [{
                "name": "editor",
                "parentRoles": ["member"]
            }]
        }))
        .unwrap();

        store.load(set).await.unwrap();
        assert_eq!(store.count().await, 1);
        assert_eq!(store.get_derived_roles().await.unwrap().len(), 1);
        let epoch_after_load = store.epoch();

        // Mutate, then reload restores the loaded set
        store.clear().await.unwrap();
        assert_eq!(store.count().await, 0);

        store.reload().await.unwrap();
        assert_eq!(store.count().await, 1);
        assert!(store.epoch() > epoch_after_load);
    }

    #[tokio::test]
    async fn test_reload_without_load_fails() {
        let store = MemoryPolicyStore::new();
        assert!(store.reload().await.is_err());
    }

    #[tokio::test]
    async fn test_derived_role_crud() {
        let store = MemoryPolicyStore::new();

        store
            .add_derived_role(DerivedRole::new(
                "editor",
                vec!["member".to_string()],
                None,
            ))
            .await
            .unwrap();

        assert!(store.get_derived_role("editor").await.unwrap().is_some());
        assert_eq!(store.get_derived_roles().await.unwrap().len(), 1);

        store.remove_derived_role("editor").await.unwrap();
        assert!(store.get_derived_role("editor").await.unwrap().is_none());
        assert!(store.remove_derived_role("editor").await.is_err());
    }
}
