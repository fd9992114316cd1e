//! Invocation interception pipeline
//!
//! Composes the fixed advice order around a guarded method call:
//! PRE_FILTER → PRE_AUTHORIZE → invoke → POST_AUTHORIZE → POST_FILTER.
//! The gate is either the method's pre-authorization expression or a
//! registered authorization manager; configuring both on one target is a
//! configuration error.

mod filter;

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::authn::Authentication;
use crate::decision::Decision;
use crate::error::{AuthzError, Result};
use crate::expr::{EvalContext, ExpressionAttribute, ExpressionAttributeRegistry};
use crate::manager::{AsyncPrincipalSupplier, AuthorizationManager, PrincipalSupplier};
use crate::resource::{
    InvocationHandle, InvocationResource, MethodInvocation, Payload, ResourceDescriptor,
};

const RETURN_OBJECT: &str = "returnObject";

/// Outcome of a guarded invocation
#[derive(Debug)]
pub enum ChainOutcome {
    /// The call ran; the (possibly filtered) return value
    Proceeded(Payload),

    /// A gate denied the invocation or its result
    Denied(Decision),
}

impl ChainOutcome {
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied(_))
    }
}

/// Interceptor chain for method-level authorization.
///
/// The post-authorization gate runs after the target has executed: it
/// denies visibility of the return value, but side effects the call already
/// performed are not undone.
pub struct InterceptorChain {
    registry: Arc<ExpressionAttributeRegistry>,
    gate: Option<Arc<dyn AuthorizationManager>>,
}

impl InterceptorChain {
    /// Chain driven purely by registered policy expressions
    pub fn new(registry: Arc<ExpressionAttributeRegistry>) -> Self {
        Self {
            registry,
            gate: None,
        }
    }

    /// Chain whose gating step is a registered manager.
    ///
    /// Targets guarded this way must not also carry a pre-authorization
    /// expression.
    pub fn with_gate(
        registry: Arc<ExpressionAttributeRegistry>,
        gate: Arc<dyn AuthorizationManager>,
    ) -> Self {
        Self {
            registry,
            gate: Some(gate),
        }
    }

    /// Run the pipeline in the blocking model
    pub fn invoke(
        &self,
        invocation: MethodInvocation,
        principal: &dyn PrincipalSupplier,
    ) -> Result<ChainOutcome> {
        let attribute = self.registry.attribute(&invocation.resource)?;
        let (mut resource, handle) = invocation.into_parts();
        self.reject_conflicting_gates(&attribute, &resource)?;

        // expressions observe the principal; materialize it once for the
        // whole pipeline, and not at all when no expression applies
        let authn = if attribute.is_null() {
            None
        } else {
            Some(principal.principal())
        };

        apply_pre_filter(&attribute, authn.as_deref(), &mut resource)?;

        if let Some(expression) = attribute.pre_authorize() {
            let ctx = EvalContext::for_invocation(authn.as_deref(), &resource);
            if !expression.evaluate_bool(&ctx)? {
                debug!("pre-authorization expression denied the invocation");
                return Ok(ChainOutcome::Denied(Decision::denied(
                    "pre-authorization expression denied access",
                )));
            }
        } else if let Some(gate) = &self.gate {
            let descriptor = ResourceDescriptor::Invocation(resource);
            let decision = gate.check(principal, &descriptor)?;
            resource = reclaim(descriptor)?;
            if !decision.is_granted() {
                debug!("gate manager denied the invocation");
                return Ok(ChainOutcome::Denied(decision));
            }
        }

        finish(&attribute, authn.as_deref(), resource, handle)
    }

    /// Run the pipeline in the non-blocking model. Same semantics as
    /// [`invoke`](InterceptorChain::invoke).
    pub async fn invoke_async(
        &self,
        invocation: MethodInvocation,
        principal: &dyn AsyncPrincipalSupplier,
    ) -> Result<ChainOutcome> {
        let attribute = self.registry.attribute(&invocation.resource)?;
        let (mut resource, handle) = invocation.into_parts();
        self.reject_conflicting_gates(&attribute, &resource)?;

        let authn = if attribute.is_null() {
            None
        } else {
            Some(principal.principal().await)
        };

        apply_pre_filter(&attribute, authn.as_deref(), &mut resource)?;

        if let Some(expression) = attribute.pre_authorize() {
            let ctx = EvalContext::for_invocation(authn.as_deref(), &resource);
            if !expression.evaluate_bool(&ctx)? {
                debug!("pre-authorization expression denied the invocation");
                return Ok(ChainOutcome::Denied(Decision::denied(
                    "pre-authorization expression denied access",
                )));
            }
        } else if let Some(gate) = &self.gate {
            let descriptor = ResourceDescriptor::Invocation(resource);
            let decision = gate.check_async(principal, &descriptor).await?;
            resource = reclaim(descriptor)?;
            if !decision.is_granted() {
                debug!("gate manager denied the invocation");
                return Ok(ChainOutcome::Denied(decision));
            }
        }

        finish(&attribute, authn.as_deref(), resource, handle)
    }

    fn reject_conflicting_gates(
        &self,
        attribute: &ExpressionAttribute,
        resource: &InvocationResource,
    ) -> Result<()> {
        if attribute.pre_authorize().is_some() && self.gate.is_some() {
            return Err(AuthzError::InvalidConfiguration(format!(
                "{}::{} carries a pre-authorization expression and a gate manager",
                resource.target_type, resource.method
            )));
        }
        Ok(())
    }
}

fn apply_pre_filter(
    attribute: &ExpressionAttribute,
    authn: Option<&Authentication>,
    resource: &mut InvocationResource,
) -> Result<()> {
    let Some(pre_filter) = attribute.pre_filter() else {
        return Ok(());
    };

    let index = filter::select_filter_target(&resource.arguments, pre_filter.filter_target())?;
    // the base context sees the arguments before narrowing
    let base = EvalContext::for_invocation(authn, resource);

    let value = std::mem::replace(&mut resource.arguments[index].value, Payload::Unit);
    resource.arguments[index].value =
        filter::filter_payload(value, pre_filter.expression(), &base)?;
    debug!(argument = %resource.arguments[index].name, "pre-filter narrowed argument");
    Ok(())
}

/// Invoke the target and run the post-invocation stages; shared by both
/// execution models
fn finish(
    attribute: &ExpressionAttribute,
    authn: Option<&Authentication>,
    mut resource: InvocationResource,
    handle: InvocationHandle,
) -> Result<ChainOutcome> {
    // the post-stage context captures the arguments before the call
    // consumes them
    let post_base = EvalContext::for_invocation(authn, &resource);

    let arguments = std::mem::take(&mut resource.arguments);
    let mut payload = (*handle)(arguments)?;

    if let Some(expression) = attribute.post_authorize() {
        let ctx = post_base
            .clone()
            .with_variable(RETURN_OBJECT, payload.as_json().unwrap_or(Value::Null));
        if !expression.evaluate_bool(&ctx)? {
            // the call has already executed; only the result's visibility
            // is denied
            debug!("post-authorization expression denied the result");
            return Ok(ChainOutcome::Denied(Decision::denied(
                "post-authorization expression denied the result",
            )));
        }
    }

    if let Some(expression) = attribute.post_filter() {
        payload = filter::filter_payload(payload, expression, &post_base)?;
        debug!("post-filter narrowed the result");
    }

    Ok(ChainOutcome::Proceeded(payload))
}

fn reclaim(descriptor: ResourceDescriptor) -> Result<InvocationResource> {
    descriptor
        .into_invocation()
        .ok_or_else(|| AuthzError::Invocation("invocation descriptor lost".to_string()))
}
