//! Error types for expression operations

use thiserror::Error;

/// Expression subsystem errors
///
/// These are programmer errors: they must propagate, never be downgraded to
/// a denial.
#[derive(Debug, Clone, Error)]
pub enum ExprError {
    #[error("expression compilation failed: {0}")]
    Compilation(String),

    #[error("expression evaluation failed: {0}")]
    Evaluation(String),

    #[error("expression did not produce a boolean")]
    NonBooleanResult,

    #[error("invalid filter target: {0}")]
    InvalidFilterTarget(String),
}

/// Result type for expression operations
pub type Result<T> = std::result::Result<T, ExprError>;
