//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route declaration (per module):
//!     web!(...) builder
//!     → web.rs (resolve positional args, build RouteDescriptor)
//!     → registry.rs (ordered, module-local)
//!     → matcher.rs (sort by specificity, freeze)
//!     → site.rs (cache compiled matcher with the module version)
//!
//! Request resolution:
//!     (method, path, host)
//!     → host.rs (TRUSTED_HOSTS / SERVER_NAME)
//!     → site.rs (longest mount prefix → module → cached matcher)
//!     → matcher.rs (pattern.rs converters)
//!     → Ok(RouteMatch) | Err(RoutingError), stored on the request
//! ```
//!
//! # Design Decisions
//! - Routing failures are values carried on the request, raised later by the
//!   dispatcher so lifecycle hooks still run
//! - Modules never share a registry; reload bumps a version instead of
//!   clearing shared state
//! - Deterministic: most specific pattern first, ties by declaration order

pub mod descriptor;
pub mod host;
pub mod matcher;
pub mod pattern;
pub mod registry;
pub mod site;
pub mod web;

use axum::http::{Method, StatusCode};
use thiserror::Error;

use crate::http::error::HttpError;

pub use descriptor::{handler, Endpoint, Handler, RouteDescriptor};
pub use host::HostPolicy;
pub use matcher::{CompiledMatcher, MatchTarget, RouteMatch};
pub use pattern::{ParamValue, PathParams, Pattern};
pub use registry::RouteRegistry;
pub use site::{ModuleId, RouteModule, Site};
pub use web::{methods, RouteArg, Web};

/// Errors raised while declaring routes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("got too many string arguments ({0}); expected a route and an optional template")]
    TooManyArguments(usize),

    #[error("route declaration has no path")]
    MissingRoute,

    #[error("invalid route pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("unknown converter {converter:?} in route pattern {pattern:?}")]
    UnknownConverter { pattern: String, converter: String },
}

/// Why a request could not be resolved to a route.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoutingError {
    #[error("no route matches the requested URL")]
    NotFound,

    #[error("method not allowed (allowed: {allowed:?})")]
    MethodNotAllowed { allowed: Vec<Method> },

    #[error("redirect required to {location}")]
    Redirect { location: String },

    #[error("untrusted host {host:?}")]
    UntrustedHost { host: String },

    /// The owning module's routes failed to declare.
    #[error("route declaration failed: {0}")]
    Declaration(RouteError),
}

impl RoutingError {
    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RoutingError::NotFound => "not_found",
            RoutingError::MethodNotAllowed { .. } => "method_not_allowed",
            RoutingError::Redirect { .. } => "redirect",
            RoutingError::UntrustedHost { .. } => "untrusted_host",
            RoutingError::Declaration(_) => "declaration",
        }
    }
}

impl From<RoutingError> for HttpError {
    fn from(err: RoutingError) -> Self {
        match err {
            RoutingError::NotFound => HttpError::NotFound,
            RoutingError::MethodNotAllowed { allowed } => HttpError::MethodNotAllowed { allowed },
            RoutingError::Redirect { location } => HttpError::Redirect {
                location,
                status: StatusCode::PERMANENT_REDIRECT,
            },
            RoutingError::UntrustedHost { host } => {
                HttpError::bad_request(format!("Host {host:?} is not trusted"))
            }
            RoutingError::Declaration(_) => HttpError::InternalServerError { detail: None },
        }
    }
}
