//! Dispatch subsystem: the request lifecycle engine.
//!
//! # Data Flow
//! ```text
//! Envelope
//!     → app.rs (Request, push RequestContext: session + route resolution)
//!     → hooks.rs (before_request, in registration order; first result wins)
//!     → app.rs (raise deferred routing error | automatic OPTIONS | handler)
//!     → result.rs / coerce.rs (HandlerResult → Response, CORS)
//!     → hooks.rs (after_request, most recent first)
//!     → session codec (save)
//!     → pop RequestContext (teardown hooks, most recent first)
//!     → Response to the transport
//! ```
//!
//! # Design Decisions
//! - Handler errors are values: `HttpError`s become their responses, other
//!   errors are logged and become `500` (I/O errors become `404`)
//! - In propagate mode (`PROPAGATE_EXCEPTIONS`, or `TESTING`/`DEBUG`)
//!   unhandled errors are returned to the caller after teardown
//! - A failure while finalizing an error response is logged and the error
//!   response is still delivered

pub mod app;
pub mod coerce;
pub mod hooks;
pub mod result;
pub mod state;

use std::error::Error as StdError;
use std::io;

use thiserror::Error;

use crate::context::ContextError;
use crate::http::error::HttpError;
use crate::render::TemplateError;
use crate::routing::{RouteError, RoutingError};
use crate::session::SessionError;

pub use app::{App, AppBuilder};
pub use hooks::{AfterRequestFn, BeforeRequestFn, TeardownFn};
pub use result::{HandlerResult, Responder};
pub use state::DispatchState;

/// Anything that can escape a handler, a hook or response coercion.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The handler returned something the route cannot turn into a response.
    #[error("{0}")]
    Contract(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("could not build a URL for endpoint {0:?}")]
    UrlBuild(String),

    #[error(transparent)]
    Other(Box<dyn StdError + Send + Sync>),
}

impl DispatchError {
    pub fn other<E>(err: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        DispatchError::Other(err.into())
    }

    /// The protocol error, if this is one.
    pub fn as_http(&self) -> Option<&HttpError> {
        match self {
            DispatchError::Http(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RoutingError> for DispatchError {
    fn from(err: RoutingError) -> Self {
        match err {
            RoutingError::Declaration(err) => DispatchError::Route(err),
            other => DispatchError::Http(other.into()),
        }
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::Other(Box::new(err))
    }
}

impl From<axum::http::header::InvalidHeaderValue> for DispatchError {
    fn from(err: axum::http::header::InvalidHeaderValue) -> Self {
        DispatchError::Other(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_errors_map_to_http() {
        let err = DispatchError::from(RoutingError::NotFound);
        assert!(matches!(err.as_http(), Some(HttpError::NotFound)));

        let err = DispatchError::from(RoutingError::Declaration(RouteError::MissingRoute));
        assert!(matches!(err, DispatchError::Route(RouteError::MissingRoute)));
    }

    #[test]
    fn test_other_wraps_strings() {
        let err = DispatchError::other("boom");
        assert_eq!(err.to_string(), "boom");
        assert!(err.as_http().is_none());
    }
}
