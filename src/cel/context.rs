//! Evaluation context for CEL expressions

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::types::{Principal, Resource};

/// Variables available during CEL evaluation
///
/// Every program sees five bindings: `principal`, `resource`, `request`,
/// `context`, plus the aliases `P` (principal) and `R` (resource).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvalContext {
    /// Principal attributes (id, roles, scope, attributes)
    pub principal: HashMap<String, Value>,

    /// Resource attributes (kind, id, scope, attributes)
    pub resource: HashMap<String, Value>,

    /// Request metadata, mirrors `context`
    pub request: HashMap<String, Value>,

    /// Additional context variables
    pub context: HashMap<String, Value>,
}

impl EvalContext {
    /// Create an empty evaluation context
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the principal map
    pub fn with_principal(mut self, principal: HashMap<String, Value>) -> Self {
        self.principal = principal;
        self
    }

    /// Set the resource map
    pub fn with_resource(mut self, resource: HashMap<String, Value>) -> Self {
        self.resource = resource;
        self
    }

    /// Set the request map
    pub fn with_request(mut self, request: HashMap<String, Value>) -> Self {
        self.request = request;
        self
    }

    /// Set the context map
    pub fn with_context(mut self, context: HashMap<String, Value>) -> Self {
        self.context = context;
        self
    }

    /// Build an evaluation context from request parts
    ///
    /// `roles` is passed separately so the engine can surface the expanded
    /// (derived) role set rather than the principal's base roles.
    pub fn for_request(
        principal: &Principal,
        roles: &[String],
        resource: &Resource,
        context: &HashMap<String, Value>,
    ) -> Self {
        let mut principal_map = HashMap::new();
        principal_map.insert("id".to_string(), Value::String(principal.id.clone()));
        principal_map.insert(
            "roles".to_string(),
            Value::Array(roles.iter().cloned().map(Value::String).collect()),
        );
        principal_map.insert("scope".to_string(), Value::String(principal.scope.clone()));
        principal_map.insert(
            "attributes".to_string(),
            Value::Object(principal.attributes.clone().into_iter().collect()),
        );
        // Attributes are also surfaced at the top level, so both
        // `principal.attributes.dept` and `principal.dept` resolve.
        for (k, v) in &principal.attributes {
            principal_map.entry(k.clone()).or_insert_with(|| v.clone());
        }

        let mut resource_map = HashMap::new();
        resource_map.insert("kind".to_string(), Value::String(resource.kind.clone()));
        resource_map.insert("id".to_string(), Value::String(resource.id.clone()));
        resource_map.insert("scope".to_string(), Value::String(resource.scope.clone()));
        resource_map.insert(
            "attributes".to_string(),
            Value::Object(resource.attributes.clone().into_iter().collect()),
        );

        Self {
            principal: principal_map,
            resource: resource_map,
            request: context.clone(),
            context: context.clone(),
        }
    }

    /// Flatten into the variable bindings handed to the CEL interpreter
    pub fn to_variables(&self) -> HashMap<String, Value> {
        let mut vars = HashMap::new();

        let principal = Value::Object(self.principal.clone().into_iter().collect());
        vars.insert("principal".to_string(), principal.clone());
        vars.insert("P".to_string(), principal);

        let resource = Value::Object(self.resource.clone().into_iter().collect());
        vars.insert("resource".to_string(), resource.clone());
        vars.insert("R".to_string(), resource);

        vars.insert(
            "request".to_string(),
            Value::Object(self.request.clone().into_iter().collect()),
        );
        vars.insert(
            "context".to_string(),
            Value::Object(self.context.clone().into_iter().collect()),
        );

        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_variables_includes_aliases() {
        let mut principal = HashMap::new();
        principal.insert("role".to_string(), json!("admin"));

        let ctx = EvalContext::new().with_principal(principal);
        let vars = ctx.to_variables();

        assert!(vars.contains_key("principal"));
        assert!(vars.contains_key("P"));
        assert_eq!(vars.get("principal"), vars.get("P"));
        assert!(vars.contains_key("request"));
        assert!(vars.contains_key("context"));
    }

    #[test]
    fn test_for_request() {
        let principal = Principal::new("u1")
            .with_role("user")
            .with_attribute("projectId", "p42");
        let resource = Resource::new("document", "d1").with_attribute("ownerId", "u1");
        let mut context = HashMap::new();
        context.insert("ip".to_string(), json!("10.0.0.1"));

        let roles = vec!["user".to_string(), "editor".to_string()];
        let ctx = EvalContext::for_request(&principal, &roles, &resource, &context);

        assert_eq!(ctx.principal.get("id"), Some(&json!("u1")));
        assert_eq!(ctx.principal.get("roles"), Some(&json!(["user", "editor"])));
        // Top-level attribute mirror
        assert_eq!(ctx.principal.get("projectId"), Some(&json!("p42")));
        assert_eq!(
            ctx.resource.get("attributes"),
            Some(&json!({"ownerId": "u1"}))
        );
        // Context surfaces under both names
        assert_eq!(ctx.request.get("ip"), ctx.context.get("ip"));
    }

    #[test]
    fn test_attribute_does_not_shadow_id() {
        let principal = Principal::new("u1").with_attribute("id", "spoofed");
        let resource = Resource::new("document", "d1");
        let ctx = EvalContext::for_request(&principal, &[], &resource, &HashMap::new());

        assert_eq!(ctx.principal.get("id"), Some(&json!("u1")));
    }
}
