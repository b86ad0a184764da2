//! Error types for the authorization engine

use thiserror::Error;

use crate::cel::CelError;
use crate::scope::ScopeError;
use crate::vector::VectorError;

/// Result type alias for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;

/// Authorization engine errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Malformed principal, resource or action list
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Scope validation or chain building failed
    #[error("invalid scope: {0}")]
    InvalidScope(#[from] ScopeError),

    /// Expression source is ill-formed or ill-typed
    #[error("expression compilation failed: {0}")]
    Compile(CelError),

    /// Expression raised or returned a non-boolean result
    #[error("expression evaluation failed: {0}")]
    Eval(CelError),

    /// Derived role definition failed validation
    #[error("invalid derived role '{role}': {reason}")]
    InvalidDerivedRole { role: String, reason: String },

    /// Circular dependency detected in derived roles
    #[error("circular derived-role dependency: {}", cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    /// Derived role not found
    #[error("derived role '{0}' not found")]
    RoleNotFound(String),

    /// Policy not found in the store
    #[error("policy '{0}' not found")]
    PolicyNotFound(String),

    /// Invalid policy definition
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    /// Backing policy store failed
    #[error("policy store error: {0}")]
    PolicyStore(String),

    /// Vector index operation failed
    #[error("vector store error: {0}")]
    Vector(#[from] VectorError),

    /// Operation was cancelled by the caller
    #[error("operation cancelled")]
    Cancelled,

    /// Shutdown or operation deadline expired
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Unexpected invariant violation
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for AuthzError {
    fn from(err: anyhow::Error) -> Self {
        AuthzError::Internal(err.to_string())
    }
}
