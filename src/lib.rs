//! # Authorization Engine (authz)
//!
//! Policy-based authorization decision engine with support for:
//! - Principal-first policy resolution (principal > role > resource tiers)
//! - Hierarchical scoped policies with wildcard matching
//! - Derived roles with conditional logic and cycle detection
//! - Sandboxed boolean conditions with compiled-program caching
//! - Epoch-invalidated decision caching
//! - Background policy embedding with a pluggable vector index
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use authz::engine::{DecisionEngine, EngineConfig};
//! use authz::policy::{MemoryPolicyStore, Policy, PolicyStore, Rule};
//! use authz::types::{CheckRequest, Effect, Principal, Resource};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryPolicyStore::new());
//! store
//!     .add(Policy::resource_policy("doc-access", "document").with_rule(
//!         Rule::new("admin-all", vec!["*".to_string()], Effect::Allow)
//!             .with_roles(vec!["admin".to_string()]),
//!     ))
//!     .await?;
//!
//! let engine = DecisionEngine::new(EngineConfig::default(), store)?;
//!
//! let request = CheckRequest::new(
//!     Principal::new("u1").with_role("admin"),
//!     Resource::new("document", "d1"),
//!     vec!["read".to_string()],
//! );
//! let response = engine.check(&request, &CancellationToken::new()).await?;
//! assert!(response.all_allowed());
//! # Ok(())
//! # }
//! ```

pub mod cel;
pub mod derived_roles;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod policy;
pub mod scope;
pub mod types;
pub mod vector;

pub use engine::{DecisionEngine, EngineConfig};
pub use error::{AuthzError, Result};
pub use policy::{MemoryPolicyStore, Policy, PolicySet, PolicyStore, ResourceSelector, Rule};
pub use scope::{Scope, ScopeChain, ScopeConfig, ScopeError, ScopeResolver};
pub use types::{
    ActionResult, CheckRequest, CheckResponse, Effect, Principal, Resource, ResponseMetadata,
};
