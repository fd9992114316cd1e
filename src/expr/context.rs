//! Evaluation context for policy expressions

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::authn::Authentication;
use crate::resource::{InvocationResource, ResourceDescriptor};

/// Variables available during expression evaluation.
///
/// `principal` and `resource` are always present (with their `P`/`R`
/// aliases); invocation arguments are exposed by name; pipeline variables
/// such as `filterObject` and `returnObject` are bound per evaluation.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    principal: HashMap<String, Value>,
    resource: HashMap<String, Value>,
    arguments: HashMap<String, Value>,
    variables: HashMap<String, Value>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the context for one evaluation of a resource by a principal
    pub fn for_evaluation(
        authn: Option<&Authentication>,
        resource: &ResourceDescriptor,
    ) -> Self {
        match resource {
            ResourceDescriptor::Request(request) => {
                let mut map = HashMap::new();
                map.insert("method".to_string(), json!(request.method));
                map.insert("path".to_string(), json!(request.path));
                map.insert(
                    "path_variables".to_string(),
                    json!(request.path_variables),
                );
                Self::new().with_authentication(authn).with_resource(map)
            }
            ResourceDescriptor::Invocation(invocation) => Self::for_invocation(authn, invocation),
        }
    }

    /// Build the context for one evaluation of an invocation resource
    pub fn for_invocation(
        authn: Option<&Authentication>,
        invocation: &InvocationResource,
    ) -> Self {
        let mut ctx = Self::new().with_authentication(authn);

        let mut map = HashMap::new();
        map.insert("target_type".to_string(), json!(invocation.target_type));
        map.insert("method".to_string(), json!(invocation.method));
        map.insert("markers".to_string(), json!(invocation.markers));
        ctx.resource = map;

        for argument in &invocation.arguments {
            // single-pass streams have no JSON view and stay out of the context
            if let Some(value) = argument.value.as_json() {
                ctx.arguments.insert(argument.name.clone(), value);
            }
        }
        ctx
    }

    fn with_authentication(mut self, authn: Option<&Authentication>) -> Self {
        let mut map = HashMap::new();
        match authn {
            Some(authn) => {
                map.insert("name".to_string(), json!(authn.principal()));
                map.insert("authorities".to_string(), json!(authn.authorities()));
                map.insert("authenticated".to_string(), json!(authn.is_authenticated()));
                map.insert("anonymous".to_string(), json!(authn.is_anonymous()));
            }
            None => {
                map.insert("name".to_string(), json!(""));
                map.insert("authorities".to_string(), json!([]));
                map.insert("authenticated".to_string(), json!(false));
                map.insert("anonymous".to_string(), json!(true));
            }
        }
        self.principal = map;
        self
    }

    /// Replace the principal attributes
    pub fn with_principal(mut self, principal: HashMap<String, Value>) -> Self {
        self.principal = principal;
        self
    }

    /// Replace the resource attributes
    pub fn with_resource(mut self, resource: HashMap<String, Value>) -> Self {
        self.resource = resource;
        self
    }

    /// Expose an argument by name
    pub fn with_argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    /// Bind a pipeline variable (e.g., `filterObject`, `returnObject`)
    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    /// Flatten into the variable map handed to the expression runtime.
    ///
    /// Arguments never shadow the reserved `principal`/`resource` names or
    /// their aliases; pipeline variables are bound last.
    pub fn to_variables(&self) -> HashMap<String, Value> {
        const RESERVED: [&str; 4] = ["principal", "P", "resource", "R"];

        let mut vars = HashMap::new();

        let principal = Value::Object(self.principal.clone().into_iter().collect());
        vars.insert("principal".to_string(), principal.clone());
        vars.insert("P".to_string(), principal);

        let resource = Value::Object(self.resource.clone().into_iter().collect());
        vars.insert("resource".to_string(), resource.clone());
        vars.insert("R".to_string(), resource);

        for (name, value) in &self.arguments {
            if !RESERVED.contains(&name.as_str()) {
                vars.insert(name.clone(), value.clone());
            }
        }

        for (name, value) in &self.variables {
            vars.insert(name.clone(), value.clone());
        }

        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Payload, RequestResource};

    #[test]
    fn test_principal_and_aliases() {
        let authn = Authentication::authenticated("alice", ["ADMIN"]);
        let resource = ResourceDescriptor::Request(RequestResource::new("GET", "/a"));
        let vars = EvalContext::for_evaluation(Some(&authn), &resource).to_variables();

        assert!(vars.contains_key("principal"));
        assert_eq!(vars.get("principal"), vars.get("P"));
        assert_eq!(vars["principal"]["name"], json!("alice"));
        assert_eq!(vars["resource"]["path"], json!("/a"));
    }

    #[test]
    fn test_missing_principal_is_anonymous() {
        let resource = ResourceDescriptor::Request(RequestResource::new("GET", "/a"));
        let vars = EvalContext::for_evaluation(None, &resource).to_variables();

        assert_eq!(vars["principal"]["anonymous"], json!(true));
        assert_eq!(vars["principal"]["authenticated"], json!(false));
    }

    #[test]
    fn test_invocation_arguments_by_name() {
        let invocation = InvocationResource::new("OrderService", "list")
            .with_argument("limit", Payload::Scalar(json!(10)))
            .with_argument("names", Payload::List(vec![json!("bob")]));
        let resource = ResourceDescriptor::Invocation(invocation);
        let vars = EvalContext::for_evaluation(None, &resource).to_variables();

        assert_eq!(vars["limit"], json!(10));
        assert_eq!(vars["names"], json!(["bob"]));
        assert_eq!(vars["resource"]["method"], json!("list"));
    }

    #[test]
    fn test_arguments_never_shadow_reserved_names() {
        let invocation = InvocationResource::new("OrderService", "list")
            .with_argument("principal", Payload::Scalar(json!("impostor")));
        let resource = ResourceDescriptor::Invocation(invocation);
        let vars = EvalContext::for_evaluation(None, &resource).to_variables();

        assert_eq!(vars["principal"]["anonymous"], json!(true));
    }

    #[test]
    fn test_pipeline_variables() {
        let ctx = EvalContext::new().with_variable("filterObject", json!("bob"));
        assert_eq!(ctx.to_variables()["filterObject"], json!("bob"));
    }
}
