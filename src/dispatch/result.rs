//! What a handler returns.

use std::fmt;
use std::path::PathBuf;

use axum::body::Bytes;
use serde::Serialize;
use serde_json::Value;

use crate::dispatch::DispatchError;
use crate::http::request::Request;
use crate::http::response::{Body, BodyStream, Response};

/// A value that knows how to become a response for a given request.
pub trait Responder: Send {
    fn respond(self: Box<Self>, request: &Request) -> Result<Response, DispatchError>;
}

impl<F> Responder for F
where
    F: FnOnce(&Request) -> Result<Response, DispatchError> + Send,
{
    fn respond(self: Box<Self>, request: &Request) -> Result<Response, DispatchError> {
        (*self)(request)
    }
}

/// The result of a handler or a `before_request` hook.
///
/// Coercion into a [`Response`] depends on the matched route: a route with a
/// template renders any context-like result, a file-mode route serves the
/// named file, otherwise JSON values are encoded and raw bodies sent as
/// `text/html`.
pub enum HandlerResult {
    /// Nothing; valid only on template and file-mode routes.
    None,
    Response(Response),
    Responder(Box<dyn Responder>),
    Json(Value),
    Raw(Body),
    /// A file under the request's working directory.
    File(PathBuf),
    /// A template context; requires a route with a template.
    Template(Value),
}

impl HandlerResult {
    pub fn json<T: ?Sized + Serialize>(value: &T) -> Result<Self, DispatchError> {
        Ok(HandlerResult::Json(serde_json::to_value(value)?))
    }

    pub fn html(body: impl Into<String>) -> Self {
        HandlerResult::Raw(Body::from(body.into()))
    }

    pub fn bytes(body: impl Into<Bytes>) -> Self {
        HandlerResult::Raw(Body::Bytes(body.into()))
    }

    pub fn stream(stream: BodyStream) -> Self {
        HandlerResult::Raw(Body::Stream(stream))
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        HandlerResult::File(path.into())
    }

    pub fn template(context: Value) -> Self {
        HandlerResult::Template(context)
    }

    pub fn responder<F>(f: F) -> Self
    where
        F: FnOnce(&Request) -> Result<Response, DispatchError> + Send + 'static,
    {
        HandlerResult::Responder(Box::new(f))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            HandlerResult::None => "none",
            HandlerResult::Response(_) => "response",
            HandlerResult::Responder(_) => "responder",
            HandlerResult::Json(_) => "json",
            HandlerResult::Raw(_) => "raw",
            HandlerResult::File(_) => "file",
            HandlerResult::Template(_) => "template",
        }
    }
}

impl fmt::Debug for HandlerResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerResult::None => f.write_str("None"),
            HandlerResult::Response(r) => f.debug_tuple("Response").field(&r.status()).finish(),
            HandlerResult::Responder(_) => f.write_str("Responder(..)"),
            HandlerResult::Json(v) => f.debug_tuple("Json").field(v).finish(),
            HandlerResult::Raw(b) => f.debug_tuple("Raw").field(b).finish(),
            HandlerResult::File(p) => f.debug_tuple("File").field(p).finish(),
            HandlerResult::Template(v) => f.debug_tuple("Template").field(v).finish(),
        }
    }
}

impl From<Response> for HandlerResult {
    fn from(response: Response) -> Self {
        HandlerResult::Response(response)
    }
}

impl From<Value> for HandlerResult {
    fn from(value: Value) -> Self {
        HandlerResult::Json(value)
    }
}

impl From<String> for HandlerResult {
    fn from(body: String) -> Self {
        HandlerResult::html(body)
    }
}

impl From<&'static str> for HandlerResult {
    fn from(body: &'static str) -> Self {
        HandlerResult::Raw(Body::from(body))
    }
}

impl From<Vec<u8>> for HandlerResult {
    fn from(body: Vec<u8>) -> Self {
        HandlerResult::Raw(Body::from(body))
    }
}

impl From<()> for HandlerResult {
    fn from(_: ()) -> Self {
        HandlerResult::None
    }
}
