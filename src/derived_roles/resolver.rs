//! Derived-role resolution
//!
//! The resolver takes the derived-role definitions together with the
//! request's principal and resource, and computes the expanded role set:
//! base roles plus every derived role whose parent patterns and condition
//! hold. Conditions are evaluated through the shared CEL engine against
//! `{principal, resource, context: {}}`.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use super::graph::RoleGraph;
use super::types::DerivedRole;
use crate::cel::{CelEngine, EvalContext};
use crate::error::Result;
use crate::types::{Principal, Resource};

/// Resolves derived roles into an expanded role set
///
/// Results are memoized by a fingerprint of the definitions and the request
/// parts that feed condition evaluation, so repeated checks with identical
/// inputs skip the graph walk. Definition changes fingerprint differently
/// and therefore never see stale entries.
pub struct DerivedRoleResolver {
    /// Shared expression engine (program cache included)
    cel: Arc<CelEngine>,

    /// Memoized resolutions, keyed by input fingerprint
    cache: DashMap<[u8; 32], Vec<String>>,

    /// Coarse bound on the memo cache
    max_cache_size: usize,
}

impl DerivedRoleResolver {
    pub fn new(cel: Arc<CelEngine>) -> Self {
        Self {
            cel,
            cache: DashMap::new(),
            max_cache_size: 10_000,
        }
    }

    /// Computes the expanded role set for a principal
    ///
    /// Steps:
    /// 1. Seed with the principal's base roles
    /// 2. Validate every definition
    /// 3. Build the dependency graph and reject cycles
    /// 4. Evaluate definitions in topological order; activation requires a
    ///    matching parent pattern and a passing condition
    /// 5. Return the full set, sorted lexicographically
    ///
    /// Condition evaluation failures deactivate the role and the walk
    /// continues; structural failures (validation, cycles) fail the call.
    pub fn resolve(
        &self,
        definitions: &[DerivedRole],
        principal: &Principal,
        resource: &Resource,
    ) -> Result<Vec<String>> {
        if definitions.is_empty() {
            let mut roles = principal.roles.clone();
            roles.sort();
            roles.dedup();
            return Ok(roles);
        }

        let key = Self::fingerprint(definitions, principal, resource);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached.clone());
        }

        for definition in definitions {
            definition.validate()?;
        }

        let order = Self::build_graph(definitions).topological_sort()?;

        let by_name: HashMap<&str, &DerivedRole> = definitions
            .iter()
            .map(|d| (d.name.as_str(), d))
            .collect();

        let mut current_roles = principal.roles.clone();

        for role_name in &order {
            let Some(definition) = by_name.get(role_name.as_str()) else {
                continue;
            };

            if !definition.matches(&current_roles) {
                continue;
            }

            if self.condition_holds(definition, principal, &current_roles, resource) {
                if !current_roles.contains(&definition.name) {
                    current_roles.push(definition.name.clone());
                }
            }
        }

        current_roles.sort();
        current_roles.dedup();

        if self.cache.len() >= self.max_cache_size {
            self.cache.clear();
        }
        self.cache.insert(key, current_roles.clone());

        Ok(current_roles)
    }

    /// Drops all memoized resolutions
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Number of memoized resolutions
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    fn build_graph(definitions: &[DerivedRole]) -> RoleGraph {
        let mut graph = RoleGraph::new();

        for definition in definitions {
            graph.add_node(definition.name.clone());
        }

        for definition in definitions {
            for parent in &definition.parent_roles {
                // Edges only between derived roles; base roles are leaves
                if definitions.iter().any(|d| &d.name == parent) {
                    graph.add_dependency(&definition.name, parent);
                }
            }
        }

        graph
    }

    fn condition_holds(
        &self,
        definition: &DerivedRole,
        principal: &Principal,
        current_roles: &[String],
        resource: &Resource,
    ) -> bool {
        let condition = match &definition.condition {
            Some(c) if !c.is_empty() => c,
            _ => return true,
        };

        // Conditions run under {principal, resource, context: {}}
        let ctx = EvalContext::for_request(principal, current_roles, resource, &HashMap::new());

        match self.cel.evaluate_expression(condition, &ctx) {
            Ok(holds) => holds,
            Err(e) => {
                warn!(
                    role = %definition.name,
                    error = %e,
                    "derived-role condition failed to evaluate; role not activated"
                );
                false
            }
        }
    }

    fn fingerprint(
        definitions: &[DerivedRole],
        principal: &Principal,
        resource: &Resource,
    ) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();

        for definition in definitions {
            hasher.update(definition.name.as_bytes());
            for parent in &definition.parent_roles {
                hasher.update(parent.as_bytes());
            }
            if let Some(condition) = &definition.condition {
                hasher.update(condition.as_bytes());
            }
            hasher.update(b"|");
        }

        let mut roles = principal.roles.clone();
        roles.sort();
        for role in &roles {
            hasher.update(role.as_bytes());
        }

        hasher.update(principal.id.as_bytes());
        hash_attributes(&mut hasher, &principal.attributes);
        hasher.update(resource.id.as_bytes());
        hasher.update(resource.kind.as_bytes());
        hash_attributes(&mut hasher, &resource.attributes);

        *hasher.finalize().as_bytes()
    }
}

fn hash_attributes(hasher: &mut blake3::Hasher, attributes: &HashMap<String, serde_json::Value>) {
    let mut keys: Vec<&String> = attributes.keys().collect();
    keys.sort();
    for key in keys {
        hasher.update(key.as_bytes());
        hasher.update(attributes[key].to_string().as_bytes());
    }
}
