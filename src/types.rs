//! Core request and response types for authorization checks

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Effect of a matched rule or of the configured default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Effect {
    /// Allow the action
    Allow,
    /// Deny the action
    Deny,
}

impl Effect {
    pub fn is_allow(self) -> bool {
        matches!(self, Effect::Allow)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Effect::Allow => "ALLOW",
            Effect::Deny => "DENY",
        }
    }
}

/// Principal (user, service account, agent) making a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    /// Stable principal identifier (e.g., "user:alice@example.com")
    pub id: String,

    /// Base roles held by the principal
    #[serde(default)]
    pub roles: Vec<String>,

    /// Additional attributes (department, clearance, projectId, ...)
    #[serde(default)]
    pub attributes: HashMap<String, Value>,

    /// Optional dotted scope the principal belongs to
    #[serde(default)]
    pub scope: String,
}

impl Principal {
    /// Create a new principal with no roles or attributes
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: Vec::new(),
            attributes: HashMap::new(),
            scope: String::new(),
        }
    }

    /// Add a role to the principal
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Add an attribute to the principal
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Set the principal's scope
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }
}

/// Resource being accessed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource kind (document, api, database, ...)
    pub kind: String,

    /// Resource identifier
    pub id: String,

    /// Additional attributes (ownerId, sensitivity, ...)
    #[serde(default)]
    pub attributes: HashMap<String, Value>,

    /// Optional dotted scope the resource lives in
    #[serde(default)]
    pub scope: String,
}

impl Resource {
    /// Create a new resource
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            attributes: HashMap::new(),
            scope: String::new(),
        }
    }

    /// Add an attribute to the resource
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Set the resource's scope
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }
}

/// Authorization request: one principal, one resource, one or more actions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRequest {
    /// Opaque request identifier, propagated into the response.
    /// Generated when empty.
    #[serde(default)]
    pub request_id: String,

    /// Who is making the request
    pub principal: Principal,

    /// What is being accessed
    pub resource: Resource,

    /// Actions to authorize (order preserved in the response)
    pub actions: Vec<String>,

    /// Additional context, surfaced to expressions as `request` and `context`
    #[serde(default)]
    pub context: HashMap<String, Value>,
}

impl CheckRequest {
    pub fn new(principal: Principal, resource: Resource, actions: Vec<String>) -> Self {
        Self {
            request_id: String::new(),
            principal,
            resource,
            actions,
            context: HashMap::new(),
        }
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = id.into();
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Basic structural validation of the request
    pub fn validate(&self) -> Result<(), String> {
        if self.principal.id.is_empty() {
            return Err("principal.id cannot be empty".to_string());
        }
        if self.resource.kind.is_empty() {
            return Err("resource.kind cannot be empty".to_string());
        }
        if self.actions.is_empty() {
            return Err("actions cannot be empty".to_string());
        }
        if self.actions.iter().any(|a| a.is_empty()) {
            return Err("actions cannot contain empty strings".to_string());
        }
        Ok(())
    }
}

/// Per-action outcome of a check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    /// The requested action
    pub action: String,

    /// The resulting effect
    pub effect: Effect,

    /// Name of the policy that produced the effect, if any rule matched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,

    /// Name of the matched rule within the policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,

    /// Whether any rule matched (false means the default effect applied)
    pub matched: bool,
}

impl ActionResult {
    pub fn matched(
        action: impl Into<String>,
        effect: Effect,
        policy: impl Into<String>,
        rule: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            effect,
            policy: Some(policy.into()),
            rule: Some(rule.into()),
            matched: true,
        }
    }

    pub fn unmatched(action: impl Into<String>, default_effect: Effect) -> Self {
        Self {
            action: action.into(),
            effect: default_effect,
            policy: None,
            rule: None,
            matched: false,
        }
    }
}

/// How the resource scope was resolved for a check
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeResolution {
    /// The effective scope requested (resource scope, falling back to
    /// principal scope)
    pub requested_scope: String,

    /// The inheritance chain, most specific first
    pub chain: Vec<String>,

    /// The scope whose policies were selected: a concrete scope,
    /// "(global)" or "(invalid)"
    pub matched_scope: String,
}

/// Which policy tiers contributed candidates to a check
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyResolution {
    /// Principal-specific policies selected
    pub principal_policies: usize,

    /// Role-based principal policies selected
    pub role_policies: usize,

    /// Resource policies selected after scope resolution
    pub resource_policies: usize,
}

impl PolicyResolution {
    pub fn total(&self) -> usize {
        self.principal_policies + self.role_policies + self.resource_policies
    }
}

/// Metadata attached to every check response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// Wall-clock duration of the evaluation in microseconds
    pub evaluation_duration_us: u64,

    /// Total number of candidate policies across all tiers
    pub policies_evaluated: usize,

    /// Whether this response was served from the decision cache
    pub cache_hit: bool,

    /// Derived roles added to the principal during this check
    #[serde(default)]
    pub derived_roles: Vec<String>,

    /// Scope resolution details, when scope resolution ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_resolution: Option<ScopeResolution>,

    /// Per-tier policy selection counts
    #[serde(default)]
    pub policy_resolution: PolicyResolution,
}

/// Response to a [`CheckRequest`]: one result per distinct action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResponse {
    /// Request identifier, propagated from the request
    pub request_id: String,

    /// One entry per distinct requested action, in request order
    pub results: Vec<ActionResult>,

    /// Evaluation metadata
    pub metadata: ResponseMetadata,
}

impl CheckResponse {
    /// Look up the result for a specific action
    pub fn result_for(&self, action: &str) -> Option<&ActionResult> {
        self.results.iter().find(|r| r.action == action)
    }

    /// True if every requested action was allowed
    pub fn all_allowed(&self) -> bool {
        self.results.iter().all(|r| r.effect.is_allow())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_principal_builder() {
        let principal = Principal::new("user:alice")
            .with_role("admin")
            .with_attribute("department", "engineering")
            .with_scope("acme.corp");

        assert_eq!(principal.id, "user:alice");
        assert_eq!(principal.roles, vec!["admin".to_string()]);
        assert_eq!(
            principal.attributes.get("department"),
            Some(&json!("engineering"))
        );
        assert_eq!(principal.scope, "acme.corp");
    }

    #[test]
    fn test_resource_builder() {
        let resource = Resource::new("document", "d1")
            .with_attribute("ownerId", "user:alice")
            .with_scope("acme.corp.eng");

        assert_eq!(resource.kind, "document");
        assert_eq!(resource.attributes.get("ownerId"), Some(&json!("user:alice")));
    }

    #[test]
    fn test_request_validation() {
        let request = CheckRequest::new(
            Principal::new("u1"),
            Resource::new("document", "d1"),
            vec!["read".to_string()],
        );
        assert!(request.validate().is_ok());

        let empty_actions = CheckRequest::new(
            Principal::new("u1"),
            Resource::new("document", "d1"),
            vec![],
        );
        assert!(empty_actions.validate().is_err());

        let empty_principal = CheckRequest::new(
            Principal::new(""),
            Resource::new("document", "d1"),
            vec!["read".to_string()],
        );
        assert!(empty_principal.validate().is_err());
    }

    #[test]
    fn test_effect_serialization() {
        assert_eq!(serde_json::to_string(&Effect::Allow).unwrap(), "\"ALLOW\"");
        assert_eq!(serde_json::to_string(&Effect::Deny).unwrap(), "\"DENY\"");
    }

    #[test]
    fn test_action_result_constructors() {
        let hit = ActionResult::matched("read", Effect::Allow, "doc-policy", "allow-read");
        assert!(hit.matched);
        assert_eq!(hit.policy.as_deref(), Some("doc-policy"));

        let miss = ActionResult::unmatched("write", Effect::Deny);
        assert!(!miss.matched);
        assert!(miss.policy.is_none());
    }
}
