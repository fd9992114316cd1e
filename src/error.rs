//! Error types for the authorization engine

use thiserror::Error;

use crate::authn::AuthenticationError;
use crate::expr::ExprError;

/// Authorization engine errors
///
/// Access denial is never represented here. A denied check is a normal
/// [`Decision`](crate::Decision); these variants are reserved for evaluation
/// faults, configuration mistakes, and structural failures that must
/// propagate to the configuration boundary.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Configuration mistake detected while assembling or driving the engine
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Expression compilation or evaluation fault
    #[error("expression error: {0}")]
    Expression(#[from] ExprError),

    /// A deferred authentication manager structurally refers back to a
    /// known authority
    #[error("dependency cycle: deferred authentication manager '{0}' targets a known authority")]
    CycleDetected(String),

    /// The guarded target invocation itself failed
    #[error("invocation failed: {0}")]
    Invocation(String),

    /// Fault raised by the authentication authority, passed through unchanged
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;
