//! Derived role definitions

use serde::{Deserialize, Serialize};

use crate::error::{AuthzError, Result};

/// Parsed form of a parent-role pattern
///
/// Patterns come in four shapes: a literal role name, the universal `*`,
/// a namespace (`admin:*` covers every role under `admin:`) and a
/// capability (`*:viewer` covers every role granting `viewer`). Parsing
/// once up front keeps the match itself allocation-free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RolePattern<'p> {
    Any,
    Exact(&'p str),
    Namespace(&'p str),
    Capability(&'p str),
}

impl<'p> RolePattern<'p> {
    fn parse(pattern: &'p str) -> Self {
        if pattern == "*" {
            Self::Any
        } else if let Some(namespace) = pattern.strip_suffix(":*") {
            Self::Namespace(namespace)
        } else if let Some(capability) = pattern.strip_prefix("*:") {
            Self::Capability(capability)
        } else {
            Self::Exact(pattern)
        }
    }

    fn matches(self, role: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(want) => role == want,
            // The tail after "namespace:" must be non-empty: "admin:" on
            // its own names no role
            Self::Namespace(namespace) => role
                .strip_prefix(namespace)
                .and_then(|tail| tail.strip_prefix(':'))
                .is_some_and(|tail| !tail.is_empty()),
            Self::Capability(capability) => role
                .strip_suffix(capability)
                .is_some_and(|head| head.len() > 1 && head.ends_with(':')),
        }
    }
}

/// A role computed from parent roles and an optional condition
///
/// A derived role activates for a principal when at least one of its parent
/// role patterns matches the principal's current role set and its condition
/// (if present) evaluates to true.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DerivedRole {
    /// Unique derived role name (e.g., "document_approver")
    pub name: String,

    /// Parent role patterns; supports wildcards: `*`, `prefix:*`, `*:suffix`
    #[serde(rename = "parentRoles")]
    pub parent_roles: Vec<String>,

    /// Optional boolean condition; empty means always true
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl DerivedRole {
    /// Creates a new derived role
    pub fn new(
        name: impl Into<String>,
        parent_roles: Vec<String>,
        condition: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            parent_roles,
            condition,
        }
    }

    /// Checks whether the parent-role requirement is met
    ///
    /// At least one parent pattern must match one of the principal's roles.
    pub fn matches(&self, principal_roles: &[String]) -> bool {
        self.parent_roles.iter().any(|pattern| {
            let pattern = RolePattern::parse(pattern);
            principal_roles.iter().any(|role| pattern.matches(role))
        })
    }

    /// Validates the definition
    ///
    /// Rules: non-empty name, at least one parent role, no empty parent
    /// roles, no self-reference, at most one wildcard per pattern.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(AuthzError::InvalidDerivedRole {
                role: String::new(),
                reason: "name cannot be empty".to_string(),
            });
        }

        if self.parent_roles.is_empty() {
            return Err(AuthzError::InvalidDerivedRole {
                role: self.name.clone(),
                reason: "must have at least one parent role".to_string(),
            });
        }

        for parent in &self.parent_roles {
            if parent.is_empty() {
                return Err(AuthzError::InvalidDerivedRole {
                    role: self.name.clone(),
                    reason: "parent role cannot be empty".to_string(),
                });
            }

            if parent == &self.name {
                return Err(AuthzError::InvalidDerivedRole {
                    role: self.name.clone(),
                    reason: "cannot reference itself as a parent role".to_string(),
                });
            }

            if parent.matches('*').count() > 1 {
                return Err(AuthzError::InvalidDerivedRole {
                    role: self.name.clone(),
                    reason: format!("pattern '{}' has multiple wildcards", parent),
                });
            }
        }

        Ok(())
    }
}
