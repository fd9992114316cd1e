//! Resource matchers
//!
//! Pure predicates selecting which policy applies to a resource. Matchers
//! hold no mutable state; they are invoked from many request threads
//! without synchronization.

pub mod pattern;

pub use pattern::PathPattern;

use std::sync::Arc;

use regex::Regex;

use crate::error::{AuthzError, Result};
use crate::resource::ResourceDescriptor;

/// Predicate over a resource descriptor
pub trait ResourceMatcher: Send + Sync {
    /// Pure, side-effect-free match decision
    fn matches(&self, resource: &ResourceDescriptor) -> bool;
}

/// Matches request resources by path pattern, any method
#[derive(Debug, Clone)]
pub struct PathPatternMatcher {
    pattern: PathPattern,
}

impl PathPatternMatcher {
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            pattern: PathPattern::parse(pattern)?,
        })
    }

    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }
}

impl ResourceMatcher for PathPatternMatcher {
    fn matches(&self, resource: &ResourceDescriptor) -> bool {
        resource
            .request()
            .is_some_and(|request| self.pattern.matches(&request.path))
    }
}

/// Matches request resources by method equality and path pattern
#[derive(Debug, Clone)]
pub struct MethodPathMatcher {
    method: String,
    pattern: PathPattern,
}

impl MethodPathMatcher {
    pub fn new(method: impl Into<String>, pattern: &str) -> Result<Self> {
        Ok(Self {
            method: method.into(),
            pattern: PathPattern::parse(pattern)?,
        })
    }
}

impl ResourceMatcher for MethodPathMatcher {
    fn matches(&self, resource: &ResourceDescriptor) -> bool {
        resource.request().is_some_and(|request| {
            request.method.eq_ignore_ascii_case(&self.method)
                && self.pattern.matches(&request.path)
        })
    }
}

/// Matches every resource
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyMatcher;

impl ResourceMatcher for AnyMatcher {
    fn matches(&self, _resource: &ResourceDescriptor) -> bool {
        true
    }
}

/// Matches invocation resources carrying a policy marker
#[derive(Debug, Clone)]
pub struct MarkerMatcher {
    marker: String,
}

impl MarkerMatcher {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }
}

impl ResourceMatcher for MarkerMatcher {
    fn matches(&self, resource: &ResourceDescriptor) -> bool {
        resource
            .invocation()
            .is_some_and(|invocation| invocation.has_marker(&self.marker))
    }
}

/// Matches invocation resources by method-name regex
#[derive(Debug, Clone)]
pub struct MethodNameMatcher {
    regex: Regex,
}

impl MethodNameMatcher {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| {
            AuthzError::InvalidConfiguration(format!("invalid method-name pattern: {}", e))
        })?;
        Ok(Self { regex })
    }
}

impl ResourceMatcher for MethodNameMatcher {
    fn matches(&self, resource: &ResourceDescriptor) -> bool {
        resource
            .invocation()
            .is_some_and(|invocation| self.regex.is_match(&invocation.method))
    }
}

/// Matches invocation resources by declaring-type regex
#[derive(Debug, Clone)]
pub struct TargetTypeMatcher {
    regex: Regex,
}

impl TargetTypeMatcher {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| {
            AuthzError::InvalidConfiguration(format!("invalid target-type pattern: {}", e))
        })?;
        Ok(Self { regex })
    }
}

impl ResourceMatcher for TargetTypeMatcher {
    fn matches(&self, resource: &ResourceDescriptor) -> bool {
        resource
            .invocation()
            .is_some_and(|invocation| self.regex.is_match(&invocation.target_type))
    }
}

/// Matches when every inner matcher matches
pub struct AndMatcher {
    inner: Vec<Arc<dyn ResourceMatcher>>,
}

impl AndMatcher {
    pub fn new(inner: Vec<Arc<dyn ResourceMatcher>>) -> Self {
        Self { inner }
    }
}

impl ResourceMatcher for AndMatcher {
    fn matches(&self, resource: &ResourceDescriptor) -> bool {
        self.inner.iter().all(|m| m.matches(resource))
    }
}

/// Matches when any inner matcher matches
pub struct OrMatcher {
    inner: Vec<Arc<dyn ResourceMatcher>>,
}

impl OrMatcher {
    pub fn new(inner: Vec<Arc<dyn ResourceMatcher>>) -> Self {
        Self { inner }
    }
}

impl ResourceMatcher for OrMatcher {
    fn matches(&self, resource: &ResourceDescriptor) -> bool {
        self.inner.iter().any(|m| m.matches(resource))
    }
}

/// Inverts an inner matcher
pub struct NotMatcher {
    inner: Arc<dyn ResourceMatcher>,
}

impl NotMatcher {
    pub fn new(inner: Arc<dyn ResourceMatcher>) -> Self {
        Self { inner }
    }
}

impl ResourceMatcher for NotMatcher {
    fn matches(&self, resource: &ResourceDescriptor) -> bool {
        !self.inner.matches(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{InvocationResource, RequestResource};

    fn request(method: &str, path: &str) -> ResourceDescriptor {
        ResourceDescriptor::Request(RequestResource::new(method, path))
    }

    fn invocation(target: &str, method: &str) -> ResourceDescriptor {
        ResourceDescriptor::Invocation(InvocationResource::new(target, method))
    }

    #[test]
    fn test_path_matcher_ignores_invocations() {
        let matcher = PathPatternMatcher::new("/**").unwrap();
        assert!(matcher.matches(&request("GET", "/anything")));
        assert!(!matcher.matches(&invocation("OrderService", "list")));
    }

    #[test]
    fn test_method_path_matcher() {
        let matcher = MethodPathMatcher::new("POST", "/orders/**").unwrap();
        assert!(matcher.matches(&request("POST", "/orders/42")));
        assert!(matcher.matches(&request("post", "/orders/42")));
        assert!(!matcher.matches(&request("GET", "/orders/42")));
        assert!(!matcher.matches(&request("POST", "/users/42")));
    }

    #[test]
    fn test_marker_matcher() {
        let matcher = MarkerMatcher::new("secured");
        let marked = ResourceDescriptor::Invocation(
            InvocationResource::new("OrderService", "list").with_marker("secured"),
        );
        assert!(matcher.matches(&marked));
        assert!(!matcher.matches(&invocation("OrderService", "list")));
        assert!(!matcher.matches(&request("GET", "/orders")));
    }

    #[test]
    fn test_method_name_matcher() {
        let matcher = MethodNameMatcher::new("^delete.*").unwrap();
        assert!(matcher.matches(&invocation("OrderService", "deleteOrder")));
        assert!(!matcher.matches(&invocation("OrderService", "listOrders")));
    }

    #[test]
    fn test_target_type_matcher() {
        let matcher = TargetTypeMatcher::new(".*Service$").unwrap();
        assert!(matcher.matches(&invocation("OrderService", "list")));
        assert!(!matcher.matches(&invocation("OrderRepository", "list")));
    }

    #[test]
    fn test_combinators() {
        let admin: Arc<dyn ResourceMatcher> =
            Arc::new(PathPatternMatcher::new("/admin/**").unwrap());
        let get: Arc<dyn ResourceMatcher> =
            Arc::new(MethodPathMatcher::new("GET", "/**").unwrap());

        let both = AndMatcher::new(vec![admin.clone(), get.clone()]);
        assert!(both.matches(&request("GET", "/admin/x")));
        assert!(!both.matches(&request("POST", "/admin/x")));

        let either = OrMatcher::new(vec![admin.clone(), get]);
        assert!(either.matches(&request("POST", "/admin/x")));

        let outside = NotMatcher::new(admin);
        assert!(outside.matches(&request("GET", "/public")));
        assert!(!outside.matches(&request("GET", "/admin/x")));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        assert!(MethodNameMatcher::new("(").is_err());
        assert!(TargetTypeMatcher::new("[").is_err());
    }
}
