//! Authorization managers and the principal-supplier seam
//!
//! A manager evaluates a principal against a resource and produces a
//! [`Decision`]. The principal arrives through a deferred supplier so that
//! managers which never consult it (`PermitAll`, `DenyAll`) never force
//! authentication-context construction. Every manager carries both a
//! blocking and a non-blocking entry point with identical decision
//! semantics.

mod delegating;

pub use delegating::{
    DelegatingAuthorizationManager, DelegatingAuthorizationManagerBuilder, MatcherEntry,
};

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::authn::Authentication;
use crate::decision::Decision;
use crate::error::Result;
use crate::expr::{CompiledExpression, EvalContext, ExpressionCompiler};
use crate::resource::ResourceDescriptor;

/// Deferred access to the current principal (blocking model)
pub trait PrincipalSupplier: Send + Sync {
    /// Materialize the principal. Only called when a manager actually
    /// needs it.
    fn principal(&self) -> Arc<Authentication>;
}

impl<F> PrincipalSupplier for F
where
    F: Fn() -> Arc<Authentication> + Send + Sync,
{
    fn principal(&self) -> Arc<Authentication> {
        self()
    }
}

/// Deferred access to the current principal (non-blocking model)
#[async_trait]
pub trait AsyncPrincipalSupplier: Send + Sync {
    async fn principal(&self) -> Arc<Authentication>;
}

/// An already-materialized principal usable in both models
#[derive(Debug, Clone)]
pub struct StaticPrincipal(pub Arc<Authentication>);

impl PrincipalSupplier for StaticPrincipal {
    fn principal(&self) -> Arc<Authentication> {
        self.0.clone()
    }
}

#[async_trait]
impl AsyncPrincipalSupplier for StaticPrincipal {
    async fn principal(&self) -> Arc<Authentication> {
        self.0.clone()
    }
}

/// Memoizing supplier: the wrapped loader runs at most once, however many
/// managers consult the principal during one evaluation
pub struct CachedPrincipal<F> {
    load: F,
    cell: OnceLock<Arc<Authentication>>,
}

impl<F> CachedPrincipal<F>
where
    F: Fn() -> Arc<Authentication> + Send + Sync,
{
    pub fn new(load: F) -> Self {
        Self {
            load,
            cell: OnceLock::new(),
        }
    }
}

impl<F> PrincipalSupplier for CachedPrincipal<F>
where
    F: Fn() -> Arc<Authentication> + Send + Sync,
{
    fn principal(&self) -> Arc<Authentication> {
        self.cell.get_or_init(|| (self.load)()).clone()
    }
}

/// Evaluates a principal against a resource, producing a decision.
///
/// Denial is a normal [`Decision`], never an error; `Err` is reserved for
/// genuine evaluation faults and must not be silently converted to a grant.
#[async_trait(?Send)]
pub trait AuthorizationManager: Send + Sync {
    /// Blocking model: the decision is computed on the calling thread
    fn check(
        &self,
        principal: &dyn PrincipalSupplier,
        resource: &ResourceDescriptor,
    ) -> Result<Decision>;

    /// Non-blocking model: the decision is a deferred computation that may
    /// suspend on the principal supplier. Same semantics as [`check`].
    ///
    /// [`check`]: AuthorizationManager::check
    async fn check_async(
        &self,
        principal: &dyn AsyncPrincipalSupplier,
        resource: &ResourceDescriptor,
    ) -> Result<Decision>;
}

/// Always grants. Never consults the principal.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermitAll;

#[async_trait(?Send)]
impl AuthorizationManager for PermitAll {
    fn check(
        &self,
        _principal: &dyn PrincipalSupplier,
        _resource: &ResourceDescriptor,
    ) -> Result<Decision> {
        Ok(Decision::granted("permit all"))
    }

    async fn check_async(
        &self,
        _principal: &dyn AsyncPrincipalSupplier,
        _resource: &ResourceDescriptor,
    ) -> Result<Decision> {
        Ok(Decision::granted("permit all"))
    }
}

/// Always denies. Never consults the principal.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

#[async_trait(?Send)]
impl AuthorizationManager for DenyAll {
    fn check(
        &self,
        _principal: &dyn PrincipalSupplier,
        _resource: &ResourceDescriptor,
    ) -> Result<Decision> {
        Ok(Decision::denied("deny all"))
    }

    async fn check_async(
        &self,
        _principal: &dyn AsyncPrincipalSupplier,
        _resource: &ResourceDescriptor,
    ) -> Result<Decision> {
        Ok(Decision::denied("deny all"))
    }
}

/// Grants any authenticated, non-anonymous principal
#[derive(Debug, Clone, Copy, Default)]
pub struct Authenticated;

impl Authenticated {
    fn decide(authn: &Authentication) -> Decision {
        if authn.is_authenticated() && !authn.is_anonymous() {
            Decision::granted("authenticated")
        } else {
            Decision::denied("full authentication required")
        }
    }
}

#[async_trait(?Send)]
impl AuthorizationManager for Authenticated {
    fn check(
        &self,
        principal: &dyn PrincipalSupplier,
        _resource: &ResourceDescriptor,
    ) -> Result<Decision> {
        Ok(Self::decide(&principal.principal()))
    }

    async fn check_async(
        &self,
        principal: &dyn AsyncPrincipalSupplier,
        _resource: &ResourceDescriptor,
    ) -> Result<Decision> {
        Ok(Self::decide(&*principal.principal().await))
    }
}

/// Grants principals holding one exact authority.
///
/// Comparison is exact and case-sensitive; prefix conventions such as
/// `ROLE_` are the caller's concern when constructing the name.
#[derive(Debug, Clone)]
pub struct HasAuthority {
    authority: String,
}

impl HasAuthority {
    pub fn new(authority: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
        }
    }

    fn decide(&self, authn: &Authentication) -> Decision {
        if authn.has_authority(&self.authority) {
            Decision::granted(format!("authority '{}' present", self.authority))
        } else {
            Decision::denied(format!("authority '{}' missing", self.authority))
        }
    }
}

#[async_trait(?Send)]
impl AuthorizationManager for HasAuthority {
    fn check(
        &self,
        principal: &dyn PrincipalSupplier,
        _resource: &ResourceDescriptor,
    ) -> Result<Decision> {
        Ok(self.decide(&principal.principal()))
    }

    async fn check_async(
        &self,
        principal: &dyn AsyncPrincipalSupplier,
        _resource: &ResourceDescriptor,
    ) -> Result<Decision> {
        Ok(self.decide(&*principal.principal().await))
    }
}

/// Grants principals holding any of the listed authorities
#[derive(Debug, Clone)]
pub struct HasAnyAuthority {
    authorities: Vec<String>,
}

impl HasAnyAuthority {
    pub fn new(authorities: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            authorities: authorities.into_iter().map(Into::into).collect(),
        }
    }

    fn decide(&self, authn: &Authentication) -> Decision {
        if self.authorities.iter().any(|a| authn.has_authority(a)) {
            Decision::granted("authority present")
        } else {
            Decision::denied(format!(
                "none of [{}] present",
                self.authorities.join(", ")
            ))
        }
    }
}

#[async_trait(?Send)]
impl AuthorizationManager for HasAnyAuthority {
    fn check(
        &self,
        principal: &dyn PrincipalSupplier,
        _resource: &ResourceDescriptor,
    ) -> Result<Decision> {
        Ok(self.decide(&principal.principal()))
    }

    async fn check_async(
        &self,
        principal: &dyn AsyncPrincipalSupplier,
        _resource: &ResourceDescriptor,
    ) -> Result<Decision> {
        Ok(self.decide(&*principal.principal().await))
    }
}

/// Delegates the decision to a compiled boolean expression evaluated against
/// the principal, the resource, and the invocation arguments by name
pub struct ExpressionManager {
    expression: Arc<dyn CompiledExpression>,
}

impl ExpressionManager {
    pub fn new(expression: Arc<dyn CompiledExpression>) -> Self {
        Self { expression }
    }

    /// Compile the source with the given compiler
    pub fn from_source(compiler: &dyn ExpressionCompiler, source: &str) -> Result<Self> {
        Ok(Self {
            expression: compiler.compile(source)?,
        })
    }

    fn decide(&self, authn: &Authentication, resource: &ResourceDescriptor) -> Result<Decision> {
        let ctx = EvalContext::for_evaluation(Some(authn), resource);
        let granted = self.expression.evaluate_bool(&ctx)?;
        debug!(granted, "expression policy evaluated");
        Ok(if granted {
            Decision::granted("expression granted access")
        } else {
            Decision::denied("expression denied access")
        })
    }
}

#[async_trait(?Send)]
impl AuthorizationManager for ExpressionManager {
    fn check(
        &self,
        principal: &dyn PrincipalSupplier,
        resource: &ResourceDescriptor,
    ) -> Result<Decision> {
        self.decide(&principal.principal(), resource)
    }

    async fn check_async(
        &self,
        principal: &dyn AsyncPrincipalSupplier,
        resource: &ResourceDescriptor,
    ) -> Result<Decision> {
        self.decide(&*principal.principal().await, resource)
    }
}

/// Receives the outcome of composed authorization checks
pub trait AuthorizationEventPublisher: Send + Sync {
    fn decision_made(&self, resource: &ResourceDescriptor, decision: &Decision);
}

/// Publishes decision events to the tracing subscriber
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventPublisher;

impl AuthorizationEventPublisher for TracingEventPublisher {
    fn decision_made(&self, resource: &ResourceDescriptor, decision: &Decision) {
        if decision.is_granted() {
            debug!(?resource, reason = decision.reason(), "access granted");
        } else {
            info!(?resource, reason = decision.reason(), "access denied");
        }
    }
}
