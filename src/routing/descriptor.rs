//! Registered route descriptors.

use std::fmt;
use std::sync::Arc;

use axum::http::Method;

use crate::dispatch::{DispatchError, HandlerResult};
use crate::http::cors::Cors;
use crate::http::request::Request;
use crate::routing::pattern::{PathParams, Pattern};

/// A request handler: receives the request and its typed path parameters.
pub type Handler =
    Arc<dyn Fn(&Request, &PathParams) -> Result<HandlerResult, DispatchError> + Send + Sync>;

/// Wrap a closure as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&Request, &PathParams) -> Result<HandlerResult, DispatchError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Every method a route with an empty method list accepts.
pub const ALL_METHODS: [Method; 7] = [
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
    Method::OPTIONS,
];

/// Identifies the route a request was dispatched to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Derived from the identity of the handler.
    Handler(usize),
    Named(String),
}

impl Endpoint {
    pub fn of(handler: &Handler) -> Self {
        Endpoint::Handler(Arc::as_ptr(handler) as *const () as usize)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Handler(id) => write!(f, "handler@{id:#x}"),
            Endpoint::Named(name) => f.write_str(name),
        }
    }
}

impl From<&str> for Endpoint {
    fn from(name: &str) -> Self {
        Endpoint::Named(name.to_string())
    }
}

impl From<String> for Endpoint {
    fn from(name: String) -> Self {
        Endpoint::Named(name)
    }
}

/// A route declaration. Immutable once registered.
pub struct RouteDescriptor {
    pub(crate) pattern: Pattern,
    pub(crate) methods: Vec<Method>,
    pub(crate) handler: Handler,
    pub(crate) endpoint: Endpoint,
    pub(crate) template: Option<String>,
    pub(crate) file: bool,
    pub(crate) mimetype: Option<String>,
    pub(crate) cors: Option<Cors>,
    pub(crate) host: Option<String>,
    pub(crate) strict_slashes: bool,
    pub(crate) provide_automatic_options: bool,
}

impl RouteDescriptor {
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn rule(&self) -> &str {
        self.pattern.raw()
    }

    /// Declared methods; empty means every method.
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    pub fn is_file(&self) -> bool {
        self.file
    }

    pub fn mimetype(&self) -> Option<&str> {
        self.mimetype.as_deref()
    }

    pub fn cors(&self) -> Option<&Cors> {
        self.cors.as_ref()
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn strict_slashes(&self) -> bool {
        self.strict_slashes
    }

    pub fn provide_automatic_options(&self) -> bool {
        self.provide_automatic_options
    }

    pub fn allows(&self, method: &Method) -> bool {
        self.methods.is_empty() || self.allowed_methods().contains(method)
    }

    /// Methods this route answers, including implied `HEAD` and `OPTIONS`.
    pub fn allowed_methods(&self) -> Vec<Method> {
        if self.methods.is_empty() {
            return ALL_METHODS.to_vec();
        }
        let mut allowed = self.methods.clone();
        if allowed.contains(&Method::GET) && !allowed.contains(&Method::HEAD) {
            allowed.push(Method::HEAD);
        }
        if self.provide_automatic_options && !allowed.contains(&Method::OPTIONS) {
            allowed.push(Method::OPTIONS);
        }
        allowed
    }
}

impl fmt::Debug for RouteDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDescriptor")
            .field("rule", &self.pattern.raw())
            .field("methods", &self.methods)
            .field("endpoint", &self.endpoint)
            .field("template", &self.template)
            .field("file", &self.file)
            .field("mimetype", &self.mimetype)
            .field("cors", &self.cors.is_some())
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}
