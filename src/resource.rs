//! Resource descriptors and invocation payloads
//!
//! A [`ResourceDescriptor`] names what an actor is trying to reach: an
//! inbound request (method + path) or an intercepted method call. The enum
//! guarantees that exactly one variant is populated; no evaluation path ever
//! inspects the other.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Resource under authorization
#[derive(Debug)]
pub enum ResourceDescriptor {
    /// Request-level authorization target
    Request(RequestResource),

    /// Method-level authorization target
    Invocation(InvocationResource),
}

impl ResourceDescriptor {
    /// The request variant, if this descriptor holds one
    pub fn request(&self) -> Option<&RequestResource> {
        match self {
            Self::Request(resource) => Some(resource),
            Self::Invocation(_) => None,
        }
    }

    /// The invocation variant, if this descriptor holds one
    pub fn invocation(&self) -> Option<&InvocationResource> {
        match self {
            Self::Request(_) => None,
            Self::Invocation(resource) => Some(resource),
        }
    }

    pub(crate) fn into_invocation(self) -> Option<InvocationResource> {
        match self {
            Self::Request(_) => None,
            Self::Invocation(resource) => Some(resource),
        }
    }
}

/// Inbound request resource (method + path)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestResource {
    /// Request method (e.g., "GET", "POST")
    pub method: String,

    /// Request path (e.g., "/admin/users")
    pub path: String,

    /// Path variables bound by the dispatch boundary
    #[serde(default)]
    pub path_variables: HashMap<String, String>,
}

impl RequestResource {
    /// Create a request resource from a method and path
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            path_variables: HashMap::new(),
        }
    }

    /// Bind a path variable
    pub fn with_path_variable(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.path_variables.insert(name.into(), value.into());
        self
    }
}

/// Intercepted method-call resource
///
/// `markers` carries the policy markers the configuration boundary
/// discovered on the target (the annotation-presence analogue); matchers
/// select on them without any reflection at this layer.
#[derive(Debug)]
pub struct InvocationResource {
    /// Declaring type of the guarded method
    pub target_type: String,

    /// Method name
    pub method: String,

    /// Policy markers present on the target
    pub markers: Vec<String>,

    /// Named arguments of the call
    pub arguments: Vec<Argument>,
}

impl InvocationResource {
    /// Create an invocation resource for a target type and method
    pub fn new(target_type: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            method: method.into(),
            markers: Vec::new(),
            arguments: Vec::new(),
        }
    }

    /// Add a policy marker
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.markers.push(marker.into());
        self
    }

    /// Add a named argument
    pub fn with_argument(mut self, name: impl Into<String>, value: Payload) -> Self {
        self.arguments.push(Argument::new(name, value));
        self
    }

    /// Whether the given marker is present
    pub fn has_marker(&self, marker: &str) -> bool {
        self.markers.iter().any(|m| m == marker)
    }
}

/// Named argument of a guarded call
#[derive(Debug)]
pub struct Argument {
    /// Argument name
    pub name: String,

    /// Argument value
    pub value: Payload,
}

impl Argument {
    /// Create a named argument
    pub fn new(name: impl Into<String>, value: Payload) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Value model for arguments and return values
///
/// Filtering preserves the container variant: a filtered `List` stays a
/// `List`, a filtered `Map` stays a `Map`, a filtered `Stream` stays a
/// lazy `Stream`.
pub enum Payload {
    /// No value (void return)
    Unit,

    /// A single value
    Scalar(Value),

    /// An ordered collection
    List(Vec<Value>),

    /// A keyed collection; iteration order is the key order
    Map(BTreeMap<String, Value>),

    /// A finite, single-pass stream
    Stream(ValueStream),
}

impl Payload {
    /// JSON view of the payload for expression evaluation.
    ///
    /// Streams have no JSON view: they are single-pass and must not be
    /// consumed to build an evaluation context.
    pub fn as_json(&self) -> Option<Value> {
        match self {
            Self::Unit => Some(Value::Null),
            Self::Scalar(value) => Some(value.clone()),
            Self::List(items) => Some(Value::Array(items.clone())),
            Self::Map(map) => Some(Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            )),
            Self::Stream(_) => None,
        }
    }

    /// Whether the payload is a filterable container
    pub fn is_filterable(&self) -> bool {
        matches!(self, Self::List(_) | Self::Map(_) | Self::Stream(_))
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit => f.write_str("Unit"),
            Self::Scalar(value) => f.debug_tuple("Scalar").field(value).finish(),
            Self::List(items) => f.debug_tuple("List").field(items).finish(),
            Self::Map(map) => f.debug_tuple("Map").field(map).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Unit, Self::Unit) => true,
            (Self::Scalar(a), Self::Scalar(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            // streams are single-pass and never comparable
            _ => false,
        }
    }
}

/// Item produced by a [`ValueStream`]
pub type StreamItem = Result<Value>;

/// Finite, single-pass, lazy stream of values.
///
/// Dropping the stream before it is exhausted fires its close hook; a
/// filtered view built by the interceptor chain owns its upstream stream, so
/// closing the view early propagates the close signal upstream. A fully
/// consumed stream does not fire the hook.
pub struct ValueStream {
    iter: Box<dyn Iterator<Item = StreamItem> + Send>,
    on_close: Option<Box<dyn FnOnce() + Send>>,
    exhausted: bool,
}

impl ValueStream {
    /// Stream over a fixed set of values
    pub fn from_values(values: Vec<Value>) -> Self {
        Self::from_results(values.into_iter().map(Ok))
    }

    /// Stream over an arbitrary fallible source
    pub fn from_results<I>(iter: I) -> Self
    where
        I: Iterator<Item = StreamItem> + Send + 'static,
    {
        Self {
            iter: Box::new(iter),
            on_close: None,
            exhausted: false,
        }
    }

    /// Attach an early-close hook, fired when the stream is dropped before
    /// full consumption
    pub fn with_close_hook(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(hook));
        self
    }

    /// Consume the remainder of the stream into a vector
    pub fn into_values(self) -> Result<Vec<Value>> {
        let mut out = Vec::new();
        for item in self {
            out.push(item?);
        }
        Ok(out)
    }
}

impl Iterator for ValueStream {
    type Item = StreamItem;

    fn next(&mut self) -> Option<Self::Item> {
        match self.iter.next() {
            Some(item) => Some(item),
            None => {
                self.exhausted = true;
                None
            }
        }
    }
}

impl Drop for ValueStream {
    fn drop(&mut self) {
        if !self.exhausted {
            if let Some(hook) = self.on_close.take() {
                hook();
            }
        }
    }
}

impl fmt::Debug for ValueStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueStream").finish_non_exhaustive()
    }
}

/// Capability to actually run the guarded call
pub type InvocationHandle = Arc<dyn Fn(Vec<Argument>) -> Result<Payload> + Send + Sync>;

/// A guarded method call: the invocation resource plus the handle capable of
/// running it
pub struct MethodInvocation {
    /// Invocation resource describing the call
    pub resource: InvocationResource,
    handle: InvocationHandle,
}

impl MethodInvocation {
    /// Pair an invocation resource with the handle that runs the call
    pub fn new(
        resource: InvocationResource,
        handle: impl Fn(Vec<Argument>) -> Result<Payload> + Send + Sync + 'static,
    ) -> Self {
        Self {
            resource,
            handle: Arc::new(handle),
        }
    }

    pub(crate) fn into_parts(self) -> (InvocationResource, InvocationHandle) {
        (self.resource, self.handle)
    }
}

impl fmt::Debug for MethodInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodInvocation")
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}
