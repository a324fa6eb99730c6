//! Endpoints: registered handlers plus their routing metadata.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::routing::args::{Signature, Value};
use crate::routing::error::BoxError;
use crate::routing::objects::ObjectId;
use crate::routing::pattern::PathPattern;

/// Result of a handler body.
pub type HandlerResult = Result<Value, BoxError>;

type SyncFn = dyn Fn(Invocation) -> HandlerResult + Send + Sync;
type AsyncFn = dyn Fn(Invocation) -> BoxFuture<'static, HandlerResult> + Send + Sync;

static NEXT_ENDPOINT: AtomicU64 = AtomicU64::new(1);

/// Opaque handle returned by registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(u64);

impl EndpointId {
    pub(crate) fn next() -> Self {
        Self(NEXT_ENDPOINT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "endpoint#{}", self.0)
    }
}

/// Callable body of an endpoint.
#[derive(Clone)]
pub enum Handler {
    Sync(Arc<SyncFn>),
    Async(Arc<AsyncFn>),
}

impl Handler {
    /// Wrap a synchronous function.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(Invocation) -> HandlerResult + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(f))
    }

    /// Wrap an asynchronous function.
    pub fn asynchronous<F, Fut>(f: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::Async(Arc::new(move |inv| f(inv).boxed()))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync(_) => write!(f, "Handler::Sync"),
            Self::Async(_) => write!(f, "Handler::Async"),
        }
    }
}

/// Handler definition handed to `Router::register`.
#[derive(Debug, Clone)]
pub struct HandlerSpec {
    pub name: String,
    /// Class owning the method, `None` for free functions.
    pub class: Option<String>,
    pub signature: Signature,
    pub handler: Handler,
}

impl HandlerSpec {
    /// Global function.
    pub fn function(name: &str, signature: Signature, handler: Handler) -> Self {
        Self {
            name: name.to_string(),
            class: None,
            signature,
            handler,
        }
    }

    /// Method of `class`; the signature must start with the receiver.
    pub fn method(class: &str, name: &str, signature: Signature, handler: Handler) -> Self {
        Self {
            name: name.to_string(),
            class: Some(class.to_string()),
            signature,
            handler,
        }
    }

    /// `Class.name` or `name`.
    pub fn qualified_name(&self) -> String {
        match &self.class {
            Some(class) => format!("{}.{}", class, self.name),
            None => self.name.clone(),
        }
    }
}

/// Display metadata and ownership hint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointMeta {
    pub label: Option<String>,
    pub title: Option<String>,
    pub style: Vec<String>,
    /// Dotted path (from the routing root) of the object that owns this
    /// method when the route itself does not carry `<self>`.
    pub owner: Option<String>,
}

impl EndpointMeta {
    pub fn titled(title: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            ..Self::default()
        }
    }

    pub fn owned_by(mut self, path: &str) -> Self {
        self.owner = Some(path.to_string());
        self
    }
}

/// Registered endpoint. Immutable after registration.
#[derive(Debug)]
pub struct Endpoint {
    pub id: EndpointId,
    pub spec: HandlerSpec,
    pub pattern: Option<PathPattern>,
    pub meta: EndpointMeta,
}

impl Endpoint {
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn qualified_name(&self) -> String {
        self.spec.qualified_name()
    }

    pub fn signature(&self) -> &Signature {
        &self.spec.signature
    }

    pub fn is_method(&self) -> bool {
        self.spec.class.is_some()
    }

    /// Title for listings: title, then label, then handler name.
    pub fn display_title(&self) -> &str {
        self.meta
            .title
            .as_deref()
            .or(self.meta.label.as_deref())
            .unwrap_or(&self.spec.name)
    }
}

/// Arguments handed to a handler body.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Qualified handler name.
    pub endpoint: String,
    pub receiver: Option<ObjectId>,
    /// Positional values, named slots first then var-positional extras.
    pub args: Vec<Value>,
    /// Keyword-only values and var-keyword extras.
    pub kwargs: BTreeMap<String, Value>,
    pub(crate) positional_names: Vec<String>,
}

impl Invocation {
    /// Look a parameter up by name across positional and keyword values.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.positional_names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.args.get(i))
            .or_else(|| self.kwargs.get(name))
    }

    /// String parameter, if present and a string.
    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Var-positional extras.
    pub fn extra_args(&self) -> &[Value] {
        self.args.get(self.positional_names.len()..).unwrap_or(&[])
    }
}
