//! Error types for CEL operations

use thiserror::Error;

/// CEL operation errors
#[derive(Error, Debug, Clone)]
pub enum CelError {
    #[error("CEL compilation failed: {0}")]
    CompilationError(String),

    #[error("CEL evaluation failed: {0}")]
    EvaluationError(String),

    #[error("type conversion error: {0}")]
    TypeConversionError(String),

    #[error("function execution error: {0}")]
    FunctionError(String),

    #[error("expression did not return a boolean result")]
    NonBooleanResult,
}

/// Result type for CEL operations
pub type Result<T> = std::result::Result<T, CelError>;
