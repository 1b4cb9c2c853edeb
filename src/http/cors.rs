//! Basic CORS header stamping for routes that opt in.

use axum::http::header::{self, HeaderValue, InvalidHeaderValue};
use axum::http::Method;
use thiserror::Error;

use crate::http::response::Response;

pub const DEFAULT_ORIGIN: &str = "*";
pub const DEFAULT_HEADERS: [&str; 2] = ["Content-Type", "Authorization"];

fn default_methods() -> Vec<Method> {
    vec![
        Method::POST,
        Method::GET,
        Method::DELETE,
        Method::PUT,
        Method::PATCH,
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorsError {
    #[error("CORS {0} cannot be empty")]
    Empty(&'static str),
}

/// CORS policy attached to a route.
#[derive(Debug, Clone, PartialEq)]
pub struct Cors {
    origin: String,
    methods: Vec<Method>,
    headers: Vec<String>,
}

impl Default for Cors {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            methods: default_methods(),
            headers: DEFAULT_HEADERS.iter().map(|h| h.to_string()).collect(),
        }
    }
}

impl Cors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Result<Self, CorsError> {
        let origin = origin.into();
        if origin.is_empty() {
            return Err(CorsError::Empty("origin"));
        }
        self.origin = origin;
        Ok(self)
    }

    pub fn with_methods(mut self, methods: Vec<Method>) -> Result<Self, CorsError> {
        if methods.is_empty() {
            return Err(CorsError::Empty("methods"));
        }
        self.methods = methods;
        Ok(self)
    }

    /// Replace the allowed request headers.
    pub fn with_headers<I, S>(mut self, headers: I) -> Result<Self, CorsError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let headers: Vec<String> = headers.into_iter().map(Into::into).collect();
        if headers.is_empty() {
            return Err(CorsError::Empty("headers"));
        }
        self.headers = headers;
        Ok(self)
    }

    /// Extend the default allowed request headers.
    pub fn allow_header(mut self, header: impl Into<String>) -> Self {
        self.headers.push(header.into());
        self
    }

    /// Stamp the CORS headers onto `response`.
    pub fn apply(&self, response: &mut Response) -> Result<(), InvalidHeaderValue> {
        let origin = HeaderValue::from_str(&self.origin)?;
        let methods = self
            .methods
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let methods = HeaderValue::from_str(&methods)?;
        let headers = HeaderValue::from_str(&self.headers.join(","))?;

        response.set_header(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        response.append_header(header::ACCESS_CONTROL_ALLOW_METHODS, methods);
        response.append_header(header::ACCESS_CONTROL_ALLOW_HEADERS, headers);
        Ok(())
    }
}
