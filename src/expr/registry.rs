//! Compiled policy-attribute registry
//!
//! Maps a method signature to its compiled policy expressions, computing
//! each at most once. Policy sources are registered at configuration time
//! (method-level, or type-level as a fallback); compiled attributes are
//! cached in a concurrent map on first lookup. The shared NULL attribute
//! marks "no policy present" and is distinct from "not yet resolved", so
//! unannotated methods never re-miss the cache.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use tracing::debug;

use crate::error::{AuthzError, Result};
use crate::expr::compiler::{CompiledExpression, ExpressionCompiler};
use crate::resource::InvocationResource;

/// Kind of policy expression attached to a method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    PreAuthorize,
    PostAuthorize,
    PreFilter,
    PostFilter,
}

impl AttributeKind {
    const ALL: [AttributeKind; 4] = [
        AttributeKind::PreAuthorize,
        AttributeKind::PostAuthorize,
        AttributeKind::PreFilter,
        AttributeKind::PostFilter,
    ];
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PreAuthorize => "pre-authorize",
            Self::PostAuthorize => "post-authorize",
            Self::PreFilter => "pre-filter",
            Self::PostFilter => "post-filter",
        };
        f.write_str(name)
    }
}

/// Uncompiled policy source registered for a method or target type
#[derive(Debug, Clone)]
pub struct PolicySource {
    kind: AttributeKind,
    expression: String,
    filter_target: Option<String>,
}

impl PolicySource {
    /// Gate evaluated before the call runs
    pub fn pre_authorize(expression: impl Into<String>) -> Self {
        Self {
            kind: AttributeKind::PreAuthorize,
            expression: expression.into(),
            filter_target: None,
        }
    }

    /// Gate evaluated against the produced return value
    pub fn post_authorize(expression: impl Into<String>) -> Self {
        Self {
            kind: AttributeKind::PostAuthorize,
            expression: expression.into(),
            filter_target: None,
        }
    }

    /// Filter narrowing the sole filterable argument
    pub fn pre_filter(expression: impl Into<String>) -> Self {
        Self {
            kind: AttributeKind::PreFilter,
            expression: expression.into(),
            filter_target: None,
        }
    }

    /// Filter narrowing the named argument
    pub fn pre_filter_on(
        expression: impl Into<String>,
        filter_target: impl Into<String>,
    ) -> Self {
        Self {
            kind: AttributeKind::PreFilter,
            expression: expression.into(),
            filter_target: Some(filter_target.into()),
        }
    }

    /// Filter narrowing the returned collection, map, or stream
    pub fn post_filter(expression: impl Into<String>) -> Self {
        Self {
            kind: AttributeKind::PostFilter,
            expression: expression.into(),
            filter_target: None,
        }
    }

    pub fn kind(&self) -> AttributeKind {
        self.kind
    }
}

/// Filter expression plus its optional explicit target argument
#[derive(Clone)]
pub struct FilterExpression {
    expression: Arc<dyn CompiledExpression>,
    filter_target: Option<String>,
}

impl FilterExpression {
    pub fn expression(&self) -> &Arc<dyn CompiledExpression> {
        &self.expression
    }

    pub fn filter_target(&self) -> Option<&str> {
        self.filter_target.as_deref()
    }
}

/// Compiled policy attributes for one method.
///
/// At most one expression of each kind; all slots empty for the NULL
/// attribute.
#[derive(Default)]
pub struct ExpressionAttribute {
    pre_authorize: Option<Arc<dyn CompiledExpression>>,
    post_authorize: Option<Arc<dyn CompiledExpression>>,
    pre_filter: Option<FilterExpression>,
    post_filter: Option<Arc<dyn CompiledExpression>>,
}

impl ExpressionAttribute {
    pub fn pre_authorize(&self) -> Option<&Arc<dyn CompiledExpression>> {
        self.pre_authorize.as_ref()
    }

    pub fn post_authorize(&self) -> Option<&Arc<dyn CompiledExpression>> {
        self.post_authorize.as_ref()
    }

    pub fn pre_filter(&self) -> Option<&FilterExpression> {
        self.pre_filter.as_ref()
    }

    pub fn post_filter(&self) -> Option<&Arc<dyn CompiledExpression>> {
        self.post_filter.as_ref()
    }

    /// Whether no policy applies to the method
    pub fn is_null(&self) -> bool {
        self.pre_authorize.is_none()
            && self.post_authorize.is_none()
            && self.pre_filter.is_none()
            && self.post_filter.is_none()
    }
}

fn null_attribute() -> Arc<ExpressionAttribute> {
    static NULL: OnceLock<Arc<ExpressionAttribute>> = OnceLock::new();
    NULL.get_or_init(|| Arc::new(ExpressionAttribute::default()))
        .clone()
}

type MethodKey = (String, String);

/// Registry of policy sources and their compiled attributes
pub struct ExpressionAttributeRegistry {
    compiler: Arc<dyn ExpressionCompiler>,
    method_sources: HashMap<MethodKey, Vec<PolicySource>>,
    type_sources: HashMap<String, Vec<PolicySource>>,
    cache: DashMap<MethodKey, Arc<ExpressionAttribute>>,
}

impl ExpressionAttributeRegistry {
    pub fn new(compiler: Arc<dyn ExpressionCompiler>) -> Self {
        Self {
            compiler,
            method_sources: HashMap::new(),
            type_sources: HashMap::new(),
            cache: DashMap::new(),
        }
    }

    /// Register policy sources for one method.
    ///
    /// More than one source of the same kind on a method is a configuration
    /// error, rejected here rather than at call time.
    pub fn register_method(
        &mut self,
        target_type: impl Into<String>,
        method: impl Into<String>,
        sources: Vec<PolicySource>,
    ) -> Result<()> {
        let key = (target_type.into(), method.into());
        ensure_unique_kinds(&format!("{}::{}", key.0, key.1), &sources)?;
        self.method_sources.insert(key, sources);
        Ok(())
    }

    /// Register fallback policy sources for a whole target type
    pub fn register_type(
        &mut self,
        target_type: impl Into<String>,
        sources: Vec<PolicySource>,
    ) -> Result<()> {
        let target_type = target_type.into();
        ensure_unique_kinds(&target_type, &sources)?;
        self.type_sources.insert(target_type, sources);
        Ok(())
    }

    /// Resolve the compiled attribute for an invocation.
    ///
    /// Resolution order: method-level sources, else type-level sources,
    /// else the NULL attribute. Concurrent first lookups may both compile;
    /// compiled results for one key are semantically identical, so the last
    /// write winning is harmless.
    pub fn attribute(&self, invocation: &InvocationResource) -> Result<Arc<ExpressionAttribute>> {
        let key = (invocation.target_type.clone(), invocation.method.clone());

        if let Some(attribute) = self.cache.get(&key) {
            return Ok(attribute.clone());
        }

        let sources = self
            .method_sources
            .get(&key)
            .or_else(|| self.type_sources.get(&invocation.target_type));

        let attribute = match sources {
            None => null_attribute(),
            Some(sources) => {
                debug!(target = %key.0, method = %key.1, "compiling policy attribute");
                Arc::new(self.compile(sources)?)
            }
        };

        self.cache.insert(key, attribute.clone());
        Ok(attribute)
    }

    fn compile(&self, sources: &[PolicySource]) -> Result<ExpressionAttribute> {
        let mut attribute = ExpressionAttribute::default();
        for source in sources {
            let compiled = self.compiler.compile(&source.expression)?;
            match source.kind {
                AttributeKind::PreAuthorize => attribute.pre_authorize = Some(compiled),
                AttributeKind::PostAuthorize => attribute.post_authorize = Some(compiled),
                AttributeKind::PreFilter => {
                    attribute.pre_filter = Some(FilterExpression {
                        expression: compiled,
                        filter_target: source.filter_target.clone(),
                    })
                }
                AttributeKind::PostFilter => attribute.post_filter = Some(compiled),
            }
        }
        Ok(attribute)
    }
}

fn ensure_unique_kinds(scope: &str, sources: &[PolicySource]) -> Result<()> {
    for kind in AttributeKind::ALL {
        if sources.iter().filter(|s| s.kind == kind).count() > 1 {
            return Err(AuthzError::InvalidConfiguration(format!(
                "duplicate {} expression on {}",
                kind, scope
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::compiler::CelCompiler;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn registry() -> ExpressionAttributeRegistry {
        ExpressionAttributeRegistry::new(Arc::new(CelCompiler::new()))
    }

    #[test]
    fn test_null_attribute_for_unregistered_method() {
        let registry = registry();
        let invocation = InvocationResource::new("OrderService", "list");

        let attribute = registry.attribute(&invocation).unwrap();
        assert!(attribute.is_null());

        // the sentinel is shared, not rebuilt per miss
        let again = registry.attribute(&invocation).unwrap();
        assert!(Arc::ptr_eq(&attribute, &again));
    }

    #[test]
    fn test_method_level_overrides_type_level() {
        let mut registry = registry();
        registry
            .register_type("OrderService", vec![PolicySource::pre_authorize("false")])
            .unwrap();
        registry
            .register_method(
                "OrderService",
                "list",
                vec![PolicySource::pre_authorize("true")],
            )
            .unwrap();

        let method_attr = registry
            .attribute(&InvocationResource::new("OrderService", "list"))
            .unwrap();
        let type_attr = registry
            .attribute(&InvocationResource::new("OrderService", "delete"))
            .unwrap();

        let ctx = crate::expr::EvalContext::new();
        assert!(method_attr
            .pre_authorize()
            .unwrap()
            .evaluate_bool(&ctx)
            .unwrap());
        assert!(!type_attr
            .pre_authorize()
            .unwrap()
            .evaluate_bool(&ctx)
            .unwrap());
    }

    #[test]
    fn test_duplicate_kind_rejected_at_population() {
        let mut registry = registry();
        let result = registry.register_method(
            "OrderService",
            "list",
            vec![
                PolicySource::pre_authorize("true"),
                PolicySource::pre_authorize("false"),
            ],
        );
        assert!(matches!(result, Err(AuthzError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_one_of_each_kind_is_accepted() {
        let mut registry = registry();
        registry
            .register_method(
                "OrderService",
                "list",
                vec![
                    PolicySource::pre_authorize("true"),
                    PolicySource::post_authorize("true"),
                    PolicySource::pre_filter("filterObject != ''"),
                    PolicySource::post_filter("filterObject != ''"),
                ],
            )
            .unwrap();

        let attribute = registry
            .attribute(&InvocationResource::new("OrderService", "list"))
            .unwrap();
        assert!(attribute.pre_authorize().is_some());
        assert!(attribute.post_authorize().is_some());
        assert!(attribute.pre_filter().is_some());
        assert!(attribute.post_filter().is_some());
    }

    #[test]
    fn test_idempotent_resolution_under_concurrent_first_access() {
        struct CountingCompiler {
            inner: CelCompiler,
            compilations: AtomicUsize,
        }

        impl ExpressionCompiler for CountingCompiler {
            fn compile(
                &self,
                source: &str,
            ) -> crate::expr::Result<Arc<dyn CompiledExpression>> {
                self.compilations.fetch_add(1, Ordering::SeqCst);
                self.inner.compile(source)
            }
        }

        let compiler = Arc::new(CountingCompiler {
            inner: CelCompiler::new(),
            compilations: AtomicUsize::new(0),
        });
        let mut registry = ExpressionAttributeRegistry::new(compiler.clone());
        registry
            .register_method(
                "OrderService",
                "list",
                vec![PolicySource::pre_authorize("'ADMIN' in principal.authorities")],
            )
            .unwrap();
        let registry = Arc::new(registry);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || {
                    registry
                        .attribute(&InvocationResource::new("OrderService", "list"))
                        .unwrap()
                })
            })
            .collect();

        let attributes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // concurrent misses may each compile, but every resolved attribute
        // behaves identically
        assert!(compiler.compilations.load(Ordering::SeqCst) >= 1);
        let authn = crate::authn::Authentication::authenticated("alice", ["ADMIN"]);
        let resource = crate::resource::ResourceDescriptor::Invocation(
            InvocationResource::new("OrderService", "list"),
        );
        let ctx = crate::expr::EvalContext::for_evaluation(Some(&authn), &resource);
        for attribute in attributes {
            assert!(attribute.pre_authorize().unwrap().evaluate_bool(&ctx).unwrap());
        }

        // later lookups are cache hits
        let before = compiler.compilations.load(Ordering::SeqCst);
        let _ = registry
            .attribute(&InvocationResource::new("OrderService", "list"))
            .unwrap();
        assert_eq!(compiler.compilations.load(Ordering::SeqCst), before);
    }
}
