//! Route declaration.
//!
//! `Web` collects positional arguments (a route string, a template string and
//! method tokens) plus explicit overrides, and registers the resulting
//! descriptor:
//!
//! ```ignore
//! web!("/user/<int:id>", "user.html", GET)
//!     .register(registry, |_req, params| Ok(json!({"id": params.get_int("id")}).into()))?;
//! ```

use std::sync::Arc;

use axum::http::Method;

use crate::dispatch::{DispatchError, HandlerResult};
use crate::http::cors::Cors;
use crate::http::request::Request;
use crate::routing::descriptor::{Endpoint, Handler, RouteDescriptor};
use crate::routing::pattern::{PathParams, Pattern};
use crate::routing::registry::RouteRegistry;
use crate::routing::RouteError;

/// Method tokens for positional route arguments.
pub mod methods {
    use axum::http::Method;

    pub const GET: Method = Method::GET;
    pub const HEAD: Method = Method::HEAD;
    pub const POST: Method = Method::POST;
    pub const PUT: Method = Method::PUT;
    pub const PATCH: Method = Method::PATCH;
    pub const DELETE: Method = Method::DELETE;
    pub const OPTIONS: Method = Method::OPTIONS;
}

/// A positional argument to a route declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteArg {
    Str(String),
    Method(Method),
}

impl From<&str> for RouteArg {
    fn from(s: &str) -> Self {
        RouteArg::Str(s.to_string())
    }
}

impl From<String> for RouteArg {
    fn from(s: String) -> Self {
        RouteArg::Str(s)
    }
}

impl From<Method> for RouteArg {
    fn from(m: Method) -> Self {
        RouteArg::Method(m)
    }
}

/// Declare a route from positional arguments.
#[macro_export]
macro_rules! web {
    ($($arg:expr),* $(,)?) => {
        $crate::routing::Web::new([$($crate::routing::RouteArg::from($arg)),*])
    };
}

/// Builder for one route declaration.
#[derive(Debug, Clone, Default)]
pub struct Web {
    strings: Vec<String>,
    positional_methods: Vec<Method>,
    route: Option<String>,
    template: Option<String>,
    methods: Option<Vec<Method>>,
    endpoint: Option<String>,
    file: bool,
    cors: Option<Cors>,
    mimetype: Option<String>,
    host: Option<String>,
    strict_slashes: bool,
    provide_automatic_options: Option<bool>,
}

impl Web {
    pub fn new<I>(args: I) -> Self
    where
        I: IntoIterator<Item = RouteArg>,
    {
        let mut web = Web {
            strict_slashes: true,
            ..Default::default()
        };
        for arg in args {
            match arg {
                RouteArg::Str(s) => web.strings.push(s),
                RouteArg::Method(m) => web.positional_methods.push(m),
            }
        }
        web
    }

    pub fn route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = Some(methods.into_iter().collect());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Treat the handler's return value as a file to stream.
    pub fn file(mut self, file: bool) -> Self {
        self.file = file;
        self
    }

    pub fn cors(mut self, cors: Cors) -> Self {
        self.cors = Some(cors);
        self
    }

    pub fn mimetype(mut self, mimetype: impl Into<String>) -> Self {
        self.mimetype = Some(mimetype.into());
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into().to_ascii_lowercase());
        self
    }

    pub fn strict_slashes(mut self, strict: bool) -> Self {
        self.strict_slashes = strict;
        self
    }

    pub fn provide_automatic_options(mut self, provide: bool) -> Self {
        self.provide_automatic_options = Some(provide);
        self
    }

    /// Resolve positional strings against the explicit overrides.
    fn resolve_strings(&self) -> Result<(Option<String>, Option<String>), RouteError> {
        let mut route = self.route.clone();
        let mut template = self.template.clone();

        match self.strings.as_slice() {
            [] => {}
            [only] => {
                if route.is_none() {
                    route = Some(only.clone());
                } else if template.is_none() {
                    template = Some(only.clone());
                } else {
                    return Err(RouteError::TooManyArguments(1));
                }
            }
            [first, second] => {
                if route.is_some() || template.is_some() {
                    return Err(RouteError::TooManyArguments(2));
                }
                route = Some(first.clone());
                template = Some(second.clone());
            }
            more => return Err(RouteError::TooManyArguments(more.len())),
        }
        Ok((route, template))
    }

    /// Build the descriptor for `handler` without registering it.
    pub fn build(&self, handler: Handler) -> Result<RouteDescriptor, RouteError> {
        let (route, template) = self.resolve_strings()?;
        let route = route.ok_or(RouteError::MissingRoute)?;
        let pattern = Pattern::parse(&route)?;

        let mut methods = self.methods.clone().unwrap_or_default();
        for method in &self.positional_methods {
            if !methods.contains(method) {
                methods.push(method.clone());
            }
        }

        let provide_automatic_options = self
            .provide_automatic_options
            .unwrap_or(!methods.is_empty() && !methods.contains(&Method::OPTIONS));

        let endpoint = match &self.endpoint {
            Some(name) => Endpoint::Named(name.clone()),
            None => Endpoint::of(&handler),
        };

        Ok(RouteDescriptor {
            pattern,
            methods,
            handler,
            endpoint,
            template,
            file: self.file,
            mimetype: self.mimetype.clone(),
            cors: self.cors.clone(),
            host: self.host.clone(),
            strict_slashes: self.strict_slashes,
            provide_automatic_options,
        })
    }

    /// Register `handler` and hand it back unchanged.
    pub fn register<F>(self, registry: &mut RouteRegistry, handler: F) -> Result<Handler, RouteError>
    where
        F: Fn(&Request, &PathParams) -> Result<HandlerResult, DispatchError> + Send + Sync + 'static,
    {
        self.register_handler(registry, Arc::new(handler))
    }

    pub fn register_handler(
        self,
        registry: &mut RouteRegistry,
        handler: Handler,
    ) -> Result<Handler, RouteError> {
        let descriptor = self.build(Arc::clone(&handler))?;
        registry.register(descriptor);
        Ok(handler)
    }
}
