//! Authentication types and the authentication-manager contract
//!
//! Credential verification itself is out of scope; this module defines the
//! shapes the decision engine consumes (an authenticated or anonymous
//! principal with its authority set) and the authority contract the
//! [`delegator`] resolves lazily.

mod delegator;

pub use delegator::{AuthenticationManagerDelegator, DeferredAuthenticationManager};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Authenticated (or anonymous) identity with its authority set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authentication {
    principal: String,
    authorities: Vec<String>,
    authenticated: bool,
    anonymous: bool,
}

impl Authentication {
    /// A fully authenticated principal with its authorities
    pub fn authenticated(
        principal: impl Into<String>,
        authorities: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            principal: principal.into(),
            authorities: authorities.into_iter().map(Into::into).collect(),
            authenticated: true,
            anonymous: false,
        }
    }

    /// A known principal that has not (yet) been authenticated
    pub fn unauthenticated(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            authorities: Vec::new(),
            authenticated: false,
            anonymous: false,
        }
    }

    /// The designated anonymous marker
    pub fn anonymous() -> Self {
        Self {
            principal: "anonymous".to_string(),
            authorities: Vec::new(),
            authenticated: true,
            anonymous: true,
        }
    }

    /// Principal name
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// Authorities held by this principal
    pub fn authorities(&self) -> &[String] {
        &self.authorities
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn is_anonymous(&self) -> bool {
        self.anonymous
    }

    /// Exact, case-sensitive authority membership. No prefix convention is
    /// applied here; callers construct the full authority name.
    pub fn has_authority(&self, name: &str) -> bool {
        self.authorities.iter().any(|a| a == name)
    }
}

/// Opaque credentials handed to an authentication authority
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Claimed principal name
    pub name: String,

    /// Secret material; never inspected by this crate
    pub secret: String,
}

impl Credentials {
    pub fn new(name: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            secret: secret.into(),
        }
    }
}

/// Authentication authority errors
#[derive(Debug, Clone, Error)]
pub enum AuthenticationError {
    /// The presented credentials were rejected
    #[error("bad credentials for '{0}'")]
    BadCredentials(String),

    /// The authority could not be reached or is not operational
    #[error("authentication authority unavailable: {0}")]
    Unavailable(String),

    /// The deferred authority failed to build; fatal for the delegator
    #[error("authentication manager resolution failed: {0}")]
    ResolutionFailed(String),
}

/// Contract of an authentication authority
///
/// Implementations may block or suspend internally (credential stores are
/// external collaborators); the decision engine never assumes an immediate
/// return.
pub trait AuthenticationManager: Send + Sync {
    fn authenticate(
        &self,
        credentials: &Credentials,
    ) -> std::result::Result<Authentication, AuthenticationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authenticated_principal() {
        let authn = Authentication::authenticated("alice", ["ADMIN", "USER"]);
        assert!(authn.is_authenticated());
        assert!(!authn.is_anonymous());
        assert!(authn.has_authority("ADMIN"));
        assert!(!authn.has_authority("admin"));
    }

    #[test]
    fn test_anonymous_marker() {
        let authn = Authentication::anonymous();
        assert!(authn.is_anonymous());
        assert!(authn.authorities().is_empty());
    }

    #[test]
    fn test_no_implicit_prefixing() {
        let authn = Authentication::authenticated("bob", ["ROLE_ADMIN"]);
        assert!(authn.has_authority("ROLE_ADMIN"));
        assert!(!authn.has_authority("ADMIN"));
    }
}
