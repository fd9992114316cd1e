//! # Warden
//!
//! An authorization decision engine built around ordered-matcher dispatch:
//! an immutable list of (matcher, manager) pairs evaluated first-match-wins
//! with a deny-by-default terminal, expression-based policies compiled once
//! and cached, an interceptor pipeline for guarded method calls, and a lazy
//! delegator that resolves the authentication authority without triggering
//! initialization cycles.
//!
//! ## Features
//!
//! - **Deny by default** — a resource matched by no rule is inaccessible
//! - **First match wins** — overlap between matchers is resolved purely by
//!   registration order
//! - **Lazy principal** — managers that never consult the principal never
//!   force authentication-context construction
//! - **Two execution models** — every decision is available blocking and
//!   non-blocking, with identical semantics
//! - **Pluggable expressions** — CEL by default, any compiler behind the
//!   same interface
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use warden::{
//!     Authentication, AuthorizationManager, DelegatingAuthorizationManager, DenyAll,
//!     PathPatternMatcher, PermitAll, RequestResource, ResourceDescriptor,
//! };
//!
//! fn main() -> warden::Result<()> {
//!     let manager = DelegatingAuthorizationManager::builder()
//!         .add(Arc::new(PathPatternMatcher::new("/admin/**")?), Arc::new(DenyAll))?
//!         .add(Arc::new(PathPatternMatcher::new("/**")?), Arc::new(PermitAll))?
//!         .build();
//!
//!     let supplier = || Arc::new(Authentication::anonymous());
//!
//!     let public = ResourceDescriptor::Request(RequestResource::new("GET", "/public"));
//!     assert!(manager.check(&supplier, &public)?.is_granted());
//!
//!     let admin = ResourceDescriptor::Request(RequestResource::new("GET", "/admin/x"));
//!     assert!(!manager.check(&supplier, &admin)?.is_granted());
//!
//!     Ok(())
//! }
//! ```

pub mod authn;
pub mod decision;
pub mod error;
pub mod expr;
pub mod interceptor;
pub mod manager;
pub mod matcher;
pub mod resource;

// Re-export commonly used types
pub use authn::{
    Authentication, AuthenticationError, AuthenticationManager, AuthenticationManagerDelegator,
    Credentials, DeferredAuthenticationManager,
};
pub use decision::Decision;
pub use error::{AuthzError, Result};
pub use expr::{
    AttributeKind, CelCompiler, CompiledExpression, EvalContext, ExpressionAttribute,
    ExpressionAttributeRegistry, ExpressionCompiler, ExprError, PolicySource,
};
pub use interceptor::{ChainOutcome, InterceptorChain};
pub use manager::{
    AsyncPrincipalSupplier, Authenticated, AuthorizationEventPublisher, AuthorizationManager,
    CachedPrincipal, DelegatingAuthorizationManager, DelegatingAuthorizationManagerBuilder,
    DenyAll, ExpressionManager, HasAnyAuthority, HasAuthority, MatcherEntry, PermitAll,
    PrincipalSupplier, StaticPrincipal, TracingEventPublisher,
};
pub use matcher::{
    AndMatcher, AnyMatcher, MarkerMatcher, MethodNameMatcher, MethodPathMatcher, NotMatcher,
    OrMatcher, PathPattern, PathPatternMatcher, ResourceMatcher, TargetTypeMatcher,
};
pub use resource::{
    Argument, InvocationResource, MethodInvocation, Payload, RequestResource, ResourceDescriptor,
    ValueStream,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
