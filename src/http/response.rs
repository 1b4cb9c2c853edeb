//! Response model.
//!
//! # Responsibilities
//! - Hold status, ordered multi-valued headers and a body
//! - Provide constructors used by response coercion (html, json, redirect)
//! - Cookie and `Vary` helpers used by the session codec
//! - Stream the body into a transport sink
//!
//! # Design Decisions
//! - Bodies are either fully buffered `Bytes` or a lazy chunk iterator
//! - Default mimetype for raw bodies is `text/html; charset=utf-8`

use std::fmt;
use std::io::{self, Read};

use axum::body::Bytes;
use axum::http::header::{self, InvalidHeaderValue};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::Serialize;

use crate::http::cookies::{SameSite, SetCookie};
use crate::http::json;
use crate::http::transport::ResponseSink;

pub const HTML_UTF8: &str = "text/html; charset=utf-8";
pub const JSON_MIME: &str = "application/json";

const STREAM_CHUNK_SIZE: usize = 8 * 1024;

/// A lazily produced sequence of body chunks.
pub struct BodyStream {
    inner: Box<dyn Iterator<Item = io::Result<Bytes>> + Send>,
}

impl BodyStream {
    pub fn new<I>(iter: I) -> Self
    where
        I: Iterator<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            inner: Box::new(iter),
        }
    }

    /// Stream a reader in fixed-size chunks until EOF.
    pub fn from_reader<R>(mut reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        let mut done = false;
        Self::new(std::iter::from_fn(move || {
            if done {
                return None;
            }
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            match reader.read(&mut buf) {
                Ok(0) => {
                    done = true;
                    None
                }
                Ok(n) => {
                    buf.truncate(n);
                    Some(Ok(Bytes::from(buf)))
                }
                Err(e) => {
                    done = true;
                    Some(Err(e))
                }
            }
        }))
    }
}

impl Iterator for BodyStream {
    type Item = io::Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BodyStream { .. }")
    }
}

/// Response body.
#[derive(Debug, Default)]
pub enum Body {
    #[default]
    Empty,
    Bytes(Bytes),
    Stream(BodyStream),
}

impl Body {
    /// Buffered contents, if the body is not a stream.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Body::Empty => Some(&[]),
            Body::Bytes(b) => Some(b),
            Body::Stream(_) => None,
        }
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Bytes(Bytes::from(s))
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Body::Bytes(Bytes::from_static(s.as_bytes()))
    }
}

impl From<Vec<u8>> for Body {
    fn from(v: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(v))
    }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Self {
        Body::Bytes(b)
    }
}

impl From<BodyStream> for Body {
    fn from(s: BodyStream) -> Self {
        Body::Stream(s)
    }
}

/// An outbound HTTP response.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}

impl Response {
    /// An empty response with the given status.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }

    /// An empty 200 response.
    pub fn empty() -> Self {
        Self::new(StatusCode::OK)
    }

    /// A 200 response with the default `text/html` mimetype.
    pub fn with_body(body: impl Into<Body>) -> Self {
        let mut response = Self::new(StatusCode::OK);
        response.body = body.into();
        response.set_header(header::CONTENT_TYPE, HeaderValue::from_static(HTML_UTF8));
        response
    }

    pub fn html(body: impl Into<String>) -> Self {
        Self::with_body(body.into())
    }

    pub fn text(body: impl Into<String>) -> Self {
        let mut response = Self::with_body(body.into());
        response.set_header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }

    /// Serialize `value` as a JSON body.
    pub fn json<T>(value: &T) -> Result<Self, serde_json::Error>
    where
        T: ?Sized + Serialize,
    {
        let mut response = Self::with_body(json::to_vec(value)?);
        response.set_header(header::CONTENT_TYPE, HeaderValue::from_static(JSON_MIME));
        Ok(response)
    }

    /// A redirect to `location` with a short HTML body.
    pub fn redirect(location: &str, status: StatusCode) -> Result<Self, InvalidHeaderValue> {
        let location_value = HeaderValue::from_str(location)?;
        let escaped = escape_html(location);
        let mut response = Self::html(format!(
            "<!doctype html>\n<html lang=en>\n<title>Redirecting...</title>\n<h1>Redirecting...</h1>\n\
             <p>You should be redirected automatically to the target URL: \
             <a href=\"{escaped}\">{escaped}</a>. If not, click the link.\n"
        ));
        response.status = status;
        response.set_header(header::LOCATION, location_value);
        Ok(response)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// First value of a header, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Replace every value of `name`.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Add a value for `name`, keeping the existing ones.
    pub fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.append(name, value);
    }

    pub fn set_content_type(&mut self, mimetype: &str) -> Result<(), InvalidHeaderValue> {
        let value = HeaderValue::from_str(mimetype)?;
        self.set_header(header::CONTENT_TYPE, value);
        Ok(())
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<Body>) {
        self.body = body.into();
    }

    pub fn into_parts(self) -> (StatusCode, HeaderMap, Body) {
        (self.status, self.headers, self.body)
    }

    /// Append a `Set-Cookie` header.
    pub fn set_cookie(&mut self, cookie: &SetCookie) -> Result<(), InvalidHeaderValue> {
        let value = HeaderValue::from_str(&cookie.to_string())?;
        self.append_header(header::SET_COOKIE, value);
        Ok(())
    }

    /// Append a `Set-Cookie` header that removes `name` on the client.
    pub fn delete_cookie(
        &mut self,
        name: &str,
        path: Option<&str>,
        domain: Option<&str>,
        secure: bool,
        http_only: bool,
        same_site: Option<SameSite>,
    ) -> Result<(), InvalidHeaderValue> {
        let mut cookie = SetCookie::removal(name);
        cookie.path = path.map(str::to_string);
        cookie.domain = domain.map(str::to_string);
        cookie.secure = secure;
        cookie.http_only = http_only;
        cookie.same_site = same_site;
        self.set_cookie(&cookie)
    }

    /// Add `field` to the `Vary` header unless already listed.
    pub fn add_vary(&mut self, field: &str) {
        let mut fields: Vec<String> = self
            .headers
            .get_all(header::VARY)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect();

        if fields.iter().any(|f| f.eq_ignore_ascii_case(field)) {
            return;
        }
        fields.push(field.to_string());

        if let Ok(value) = HeaderValue::from_str(&fields.join(", ")) {
            self.set_header(header::VARY, value);
        }
    }

    /// Stream this response into a transport sink.
    pub fn write_to(self, sink: &mut dyn ResponseSink) -> io::Result<()> {
        let (status, mut headers, body) = self.into_parts();
        if let Some(bytes) = body.as_bytes() {
            if !headers.contains_key(header::CONTENT_LENGTH) {
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
            }
        }

        sink.start(status, &headers)?;
        match body {
            Body::Empty => Ok(()),
            Body::Bytes(bytes) => sink.write(&bytes),
            Body::Stream(stream) => {
                for chunk in stream {
                    sink.write(&chunk?)?;
                }
                Ok(())
            }
        }
    }
}

/// Escape text for inclusion in an HTML body.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}
