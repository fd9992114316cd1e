//! Expression compilation with compiled-program caching
//!
//! The engine is agnostic to expression syntax: policies arrive as opaque
//! source text, the configured [`ExpressionCompiler`] turns them into
//! [`CompiledExpression`] handles, and evaluation is a single
//! context-in/value-out call. CEL is the default syntax.

use std::sync::Arc;

use cel_interpreter::{Context, Program};
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use crate::expr::context::EvalContext;
use crate::expr::convert::{from_cel, to_cel};
use crate::expr::error::{ExprError, Result};

/// A policy expression compiled for repeated evaluation
pub trait CompiledExpression: Send + Sync {
    /// Evaluate against the context, producing a value
    fn evaluate(&self, ctx: &EvalContext) -> Result<Value>;

    /// Evaluate and require a boolean outcome
    fn evaluate_bool(&self, ctx: &EvalContext) -> Result<bool> {
        match self.evaluate(ctx)? {
            Value::Bool(b) => Ok(b),
            _ => Err(ExprError::NonBooleanResult),
        }
    }
}

/// Compiles policy source text into executable expressions
pub trait ExpressionCompiler: Send + Sync {
    fn compile(&self, source: &str) -> Result<Arc<dyn CompiledExpression>>;
}

/// CEL-backed compiler with a thread-safe compiled-program cache.
///
/// Concurrent misses for the same source may both compile; compilation is
/// idempotent and the last write wins.
pub struct CelCompiler {
    program_cache: DashMap<String, Arc<CelExpression>>,
}

impl CelCompiler {
    pub fn new() -> Self {
        Self {
            program_cache: DashMap::new(),
        }
    }

    /// Number of cached compiled programs
    pub fn cached_programs(&self) -> usize {
        self.program_cache.len()
    }
}

impl Default for CelCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionCompiler for CelCompiler {
    fn compile(&self, source: &str) -> Result<Arc<dyn CompiledExpression>> {
        if let Some(compiled) = self.program_cache.get(source) {
            return Ok(compiled.value().clone() as Arc<dyn CompiledExpression>);
        }

        let program = Program::compile(source)
            .map_err(|e| ExprError::Compilation(format!("{:?}", e)))?;
        debug!(source, "compiled policy expression");

        let compiled = Arc::new(CelExpression { program });
        self.program_cache
            .insert(source.to_string(), compiled.clone());

        Ok(compiled as Arc<dyn CompiledExpression>)
    }
}

/// A compiled CEL program
pub struct CelExpression {
    program: Program,
}

impl CompiledExpression for CelExpression {
    fn evaluate(&self, ctx: &EvalContext) -> Result<Value> {
        let mut cel_context = Context::default();
        for (name, value) in ctx.to_variables() {
            let _ = cel_context.add_variable(name, to_cel(&value));
        }

        let result = self
            .program
            .execute(&cel_context)
            .map_err(|e| ExprError::Evaluation(format!("{:?}", e)))?;

        Ok(from_cel(&result))
    }
}

// Thread safety: the compiled program is immutable after construction and
// every evaluation builds its own Context.
unsafe impl Send for CelExpression {}
unsafe impl Sync for CelExpression {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn test_context() -> EvalContext {
        let mut principal = HashMap::new();
        principal.insert("name".to_string(), json!("alice"));
        principal.insert("authorities".to_string(), json!(["ADMIN", "AUDIT"]));

        let mut resource = HashMap::new();
        resource.insert("path".to_string(), json!("/admin/users"));

        EvalContext::new()
            .with_principal(principal)
            .with_resource(resource)
    }

    #[test]
    fn test_boolean_literal() {
        let compiler = CelCompiler::new();
        let expr = compiler.compile("true").unwrap();
        assert!(expr.evaluate_bool(&test_context()).unwrap());
    }

    #[test]
    fn test_authority_membership() {
        let compiler = CelCompiler::new();
        let expr = compiler.compile("'ADMIN' in principal.authorities").unwrap();
        assert!(expr.evaluate_bool(&test_context()).unwrap());

        let expr = compiler.compile("'VIEWER' in principal.authorities").unwrap();
        assert!(!expr.evaluate_bool(&test_context()).unwrap());
    }

    #[test]
    fn test_alias_access() {
        let compiler = CelCompiler::new();
        let expr = compiler.compile("P.name == 'alice'").unwrap();
        assert!(expr.evaluate_bool(&test_context()).unwrap());
    }

    #[test]
    fn test_compilation_is_cached() {
        let compiler = CelCompiler::new();
        let _ = compiler.compile("1 == 1").unwrap();
        assert_eq!(compiler.cached_programs(), 1);

        let _ = compiler.compile("1 == 1").unwrap();
        assert_eq!(compiler.cached_programs(), 1);

        let _ = compiler.compile("2 == 2").unwrap();
        assert_eq!(compiler.cached_programs(), 2);
    }

    #[test]
    fn test_malformed_expression() {
        let compiler = CelCompiler::new();
        let result = compiler.compile("not valid @#$");
        assert!(matches!(result, Err(ExprError::Compilation(_))));
    }

    #[test]
    fn test_non_boolean_outcome() {
        let compiler = CelCompiler::new();
        let expr = compiler.compile("'hello'").unwrap();
        assert!(matches!(
            expr.evaluate_bool(&test_context()),
            Err(ExprError::NonBooleanResult)
        ));
    }
}
