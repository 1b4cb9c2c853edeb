//! Protocol-level errors that map directly onto HTTP responses.

use axum::http::header::{self, HeaderValue};
use axum::http::{Method, StatusCode};
use thiserror::Error;

use crate::http::response::{escape_html, Response};

/// An error that is answered with a specific HTTP status.
#[derive(Debug, Clone, Error)]
pub enum HttpError {
    #[error("400 Bad Request: {detail}")]
    BadRequest { detail: String, show_detail: bool },

    #[error("401 Unauthorized")]
    Unauthorized,

    #[error("403 Forbidden")]
    Forbidden,

    #[error("404 Not Found")]
    NotFound,

    #[error("405 Method Not Allowed")]
    MethodNotAllowed { allowed: Vec<Method> },

    #[error("{status} redirect to {location}")]
    Redirect { location: String, status: StatusCode },

    #[error("413 Payload Too Large")]
    PayloadTooLarge,

    #[error("500 Internal Server Error")]
    InternalServerError { detail: Option<String> },

    #[error("{0}")]
    Status(StatusCode),
}

impl HttpError {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        HttpError::BadRequest {
            detail: detail.into(),
            show_detail: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            HttpError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            HttpError::Unauthorized => StatusCode::UNAUTHORIZED,
            HttpError::Forbidden => StatusCode::FORBIDDEN,
            HttpError::NotFound => StatusCode::NOT_FOUND,
            HttpError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            HttpError::Redirect { status, .. } => *status,
            HttpError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            HttpError::InternalServerError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            HttpError::Status(status) => *status,
        }
    }

    /// Mark client-input detail as safe to show (debug mode).
    pub fn with_visible_detail(self) -> Self {
        match self {
            HttpError::BadRequest { detail, .. } => HttpError::BadRequest {
                detail,
                show_detail: true,
            },
            other => other,
        }
    }

    fn description(&self) -> &'static str {
        match self {
            HttpError::BadRequest { .. } => {
                "The browser (or proxy) sent a request that this server could not understand."
            }
            HttpError::Unauthorized => {
                "The server could not verify that you are authorized to access the URL requested."
            }
            HttpError::Forbidden => {
                "You don't have the permission to access the requested resource."
            }
            HttpError::NotFound => {
                "The requested URL was not found on the server. If you entered the URL manually \
                 please check your spelling and try again."
            }
            HttpError::MethodNotAllowed { .. } => {
                "The method is not allowed for the requested URL."
            }
            HttpError::PayloadTooLarge => {
                "The data value transmitted exceeds the capacity limit."
            }
            HttpError::InternalServerError { .. } => {
                "The server encountered an internal error and was unable to complete your \
                 request. Either the server is overloaded or there is an error in the application."
            }
            HttpError::Redirect { .. } | HttpError::Status(_) => "",
        }
    }

    fn visible_detail(&self) -> Option<&str> {
        match self {
            HttpError::BadRequest {
                detail,
                show_detail: true,
            } => Some(detail),
            HttpError::InternalServerError { detail } => detail.as_deref(),
            _ => None,
        }
    }

    /// Render the error as a complete response.
    pub fn to_response(&self) -> Response {
        if let HttpError::Redirect { location, status } = self {
            if let Ok(response) = Response::redirect(location, *status) {
                return response;
            }
            return Response::new(StatusCode::INTERNAL_SERVER_ERROR);
        }

        let status = self.status();
        let reason = status.canonical_reason().unwrap_or("Unknown Error");
        let mut body = format!(
            "<!doctype html>\n<html lang=en>\n<title>{} {}</title>\n<h1>{}</h1>\n",
            status.as_u16(),
            reason,
            reason
        );
        let description = self.description();
        if !description.is_empty() {
            body.push_str(&format!("<p>{description}</p>\n"));
        }
        if let Some(detail) = self.visible_detail() {
            body.push_str(&format!("<p>{}</p>\n", escape_html(detail)));
        }

        let mut response = Response::html(body).with_status(status);
        if let HttpError::MethodNotAllowed { allowed } = self {
            let allow = allowed
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            if let Ok(value) = HeaderValue::from_str(&allow) {
                response.set_header(header::ALLOW, value);
            }
        }
        response
    }
}

/// Build the error for an HTTP status code.
pub fn abort(code: u16) -> HttpError {
    match code {
        400 => HttpError::bad_request("aborted"),
        401 => HttpError::Unauthorized,
        403 => HttpError::Forbidden,
        404 => HttpError::NotFound,
        405 => HttpError::MethodNotAllowed { allowed: Vec::new() },
        413 => HttpError::PayloadTooLarge,
        500 => HttpError::InternalServerError { detail: None },
        other => HttpError::Status(
            StatusCode::from_u16(other).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        ),
    }
}
