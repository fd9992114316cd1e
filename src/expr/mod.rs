//! Policy expression engine
//!
//! Pluggable expression compilation (CEL by default), evaluation contexts,
//! and the compiled-attribute registry used by expression-based managers
//! and the interceptor chain.

pub mod compiler;
pub mod context;
mod convert;
pub mod error;
pub mod registry;

pub use compiler::{CelCompiler, CompiledExpression, ExpressionCompiler};
pub use context::EvalContext;
pub use error::{ExprError, Result};
pub use registry::{
    AttributeKind, ExpressionAttribute, ExpressionAttributeRegistry, FilterExpression,
    PolicySource,
};
