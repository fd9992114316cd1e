//! Lazy resolution of the authentication authority
//!
//! Constructing an authentication authority can itself require an
//! authorization check against the very authority being constructed. The
//! delegator breaks that cycle: it holds a deferred builder, rejects
//! structurally cyclic configurations at construction, and resolves the
//! concrete authority exactly once on first use.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

use tracing::{info, warn};

use crate::authn::{Authentication, AuthenticationError, AuthenticationManager, Credentials};
use crate::error::{AuthzError, Result};

type BuildFn =
    Box<dyn FnOnce() -> std::result::Result<Arc<dyn AuthenticationManager>, AuthenticationError> + Send>;

/// A named, one-shot builder for an authentication authority.
///
/// `lazy_target` is the identifier of another authority this builder embeds
/// a lazy reference to, if any. The delegator inspects it structurally; the
/// builder is never invoked during that inspection.
pub struct DeferredAuthenticationManager {
    name: String,
    lazy_target: Option<String>,
    build: BuildFn,
}

impl DeferredAuthenticationManager {
    pub fn new(
        name: impl Into<String>,
        build: impl FnOnce() -> std::result::Result<Arc<dyn AuthenticationManager>, AuthenticationError>
            + Send
            + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            lazy_target: None,
            build: Box::new(build),
        }
    }

    /// Record an embedded lazy reference to another authority
    pub fn with_lazy_target(mut self, target: impl Into<String>) -> Self {
        self.lazy_target = Some(target.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lazy_target(&self) -> Option<&str> {
        self.lazy_target.as_deref()
    }

    fn build(self) -> std::result::Result<Arc<dyn AuthenticationManager>, AuthenticationError> {
        (self.build)()
    }
}

impl fmt::Debug for DeferredAuthenticationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredAuthenticationManager")
            .field("name", &self.name)
            .field("lazy_target", &self.lazy_target)
            .finish_non_exhaustive()
    }
}

enum Slot {
    Deferred(DeferredAuthenticationManager),
    Failed(String),
}

/// Resolves the authentication authority on first use, exactly once.
///
/// States: Unresolved (builder pending) → Resolving (first caller holds the
/// lock) → Resolved (authority cached, builder discarded). A build failure
/// is terminal: the delegator transitions to a failed state and never
/// retries. Reads after resolution take no lock.
pub struct AuthenticationManagerDelegator {
    name: String,
    resolved: OnceLock<Arc<dyn AuthenticationManager>>,
    slot: Mutex<Option<Slot>>,
}

impl AuthenticationManagerDelegator {
    /// Accept a deferred builder after checking it for a dependency cycle.
    ///
    /// `known_authority_names` holds the identifiers of every authority the
    /// surrounding system could eventually offer. If the builder's embedded
    /// lazy reference names one of them, the configuration is cyclic and
    /// construction fails with [`AuthzError::CycleDetected`] before any use.
    pub fn new(
        deferred: DeferredAuthenticationManager,
        known_authority_names: &HashSet<String>,
    ) -> Result<Self> {
        if let Some(target) = deferred.lazy_target() {
            if known_authority_names.contains(target) {
                return Err(AuthzError::CycleDetected(deferred.name().to_string()));
            }
        }

        Ok(Self {
            name: deferred.name().to_string(),
            resolved: OnceLock::new(),
            slot: Mutex::new(Some(Slot::Deferred(deferred))),
        })
    }

    /// Delegate to the resolved authority, resolving it first if necessary.
    ///
    /// Faults raised by the resolved authority pass through unchanged.
    pub fn authenticate(
        &self,
        credentials: &Credentials,
    ) -> std::result::Result<Authentication, AuthenticationError> {
        self.delegate()?.authenticate(credentials)
    }

    fn delegate(
        &self,
    ) -> std::result::Result<Arc<dyn AuthenticationManager>, AuthenticationError> {
        // Fast path: resolved delegates are read without the lock.
        if let Some(delegate) = self.resolved.get() {
            return Ok(delegate.clone());
        }

        let mut slot = self
            .slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        // A racing caller may have resolved while we waited on the lock.
        if let Some(delegate) = self.resolved.get() {
            return Ok(delegate.clone());
        }

        if let Some(Slot::Failed(reason)) = &*slot {
            return Err(AuthenticationError::ResolutionFailed(reason.clone()));
        }

        match slot.take() {
            Some(Slot::Deferred(deferred)) => match deferred.build() {
                Ok(delegate) => {
                    let _ = self.resolved.set(delegate.clone());
                    info!(name = %self.name, "authentication manager resolved");
                    Ok(delegate)
                }
                Err(err) => {
                    warn!(name = %self.name, error = %err, "authentication manager resolution failed");
                    *slot = Some(Slot::Failed(err.to_string()));
                    Err(err)
                }
            },
            _ => Err(AuthenticationError::ResolutionFailed(
                "resolution state lost".to_string(),
            )),
        }
    }
}

impl AuthenticationManager for AuthenticationManagerDelegator {
    fn authenticate(
        &self,
        credentials: &Credentials,
    ) -> std::result::Result<Authentication, AuthenticationError> {
        AuthenticationManagerDelegator::authenticate(self, credentials)
    }
}

impl fmt::Debug for AuthenticationManagerDelegator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationManagerDelegator")
            .field("name", &self.name)
            .field("resolved", &self.resolved.get().is_some())
            .finish_non_exhaustive()
    }
}
