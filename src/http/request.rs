//! Request model.
//!
//! # Responsibilities
//! - Hold the inbound method, path, headers and body
//! - Parse query string, form body, cookies and JSON lazily, once
//! - Carry the routing outcome, the session and the working directory set
//!   by the dispatcher
//!
//! # Design Decisions
//! - Parsed views are cached in `OnceLock`s, so a decode failure is also
//!   remembered and never retried
//! - The routing outcome is a `Result` stored once; the dispatcher decides
//!   when to raise it
//! - A malformed JSON body is logged and reads as absent, except in debug
//!   mode where it becomes a visible `400`

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use axum::body::Bytes;
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::{HeaderMap, Method};
use parking_lot::Mutex;
use serde_json::Value;
use url::form_urlencoded;

use crate::dispatch::DispatchState;
use crate::http::cookies::parse_cookie_header;
use crate::http::error::HttpError;
use crate::http::multidict::MultiDict;
use crate::http::transport::{split_target, Envelope};
use crate::routing::{Endpoint, PathParams, RouteDescriptor, RouteMatch, RoutingError};
use crate::session::Session;

const FORM_MIME: &str = "application/x-www-form-urlencoded";

#[derive(Debug)]
enum JsonBody {
    Missing,
    Valid(Value),
    Invalid(String),
}

/// One inbound request, shared by the dispatcher, hooks and the handler.
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
    debug: bool,

    args: OnceLock<MultiDict>,
    form: OnceLock<MultiDict>,
    cookies: OnceLock<MultiDict>,
    json: OnceLock<JsonBody>,

    resolution: OnceLock<Result<RouteMatch, RoutingError>>,
    cwd: OnceLock<PathBuf>,
    session: Mutex<Option<Session>>,
    state: Mutex<DispatchState>,
}

impl Request {
    /// Build a request from a method and a target (`/path?query`).
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = split_target(target);
        Self::from_parts(method, path, query, HeaderMap::new(), Bytes::new(), None, false)
    }

    pub fn from_envelope(envelope: Envelope, debug: bool) -> Self {
        Self::from_parts(
            envelope.method,
            envelope.path,
            envelope.query,
            envelope.headers,
            envelope.body,
            envelope.remote_addr,
            debug,
        )
    }

    fn from_parts(
        method: Method,
        path: String,
        query: Option<String>,
        headers: HeaderMap,
        body: Bytes,
        remote_addr: Option<SocketAddr>,
        debug: bool,
    ) -> Self {
        Self {
            method,
            path,
            query,
            headers,
            body,
            remote_addr,
            debug,
            args: OnceLock::new(),
            form: OnceLock::new(),
            cookies: OnceLock::new(),
            json: OnceLock::new(),
            resolution: OnceLock::new(),
            cwd: OnceLock::new(),
            session: Mutex::new(None),
            state: Mutex::new(DispatchState::Received),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request path, still percent-encoded.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// The `Host` header, as sent.
    pub fn host(&self) -> Option<&str> {
        self.header(header::HOST.as_str())
    }

    /// Mimetype of the body without parameters, lower-cased.
    pub fn mimetype(&self) -> Option<String> {
        let content_type = self.header(header::CONTENT_TYPE.as_str())?;
        let mimetype = content_type.split(';').next().unwrap_or_default();
        Some(mimetype.trim().to_ascii_lowercase())
    }

    /// Full URL of the request.
    pub fn url(&self) -> String {
        let host = self.host().unwrap_or("localhost");
        match self.query_string().filter(|q| !q.is_empty()) {
            Some(query) => format!("http://{host}{}?{query}", self.path),
            None => format!("http://{host}{}", self.path),
        }
    }

    /// Query string parameters.
    pub fn args(&self) -> &MultiDict {
        self.args
            .get_or_init(|| match self.query.as_deref() {
                Some(query) => form_urlencoded::parse(query.as_bytes()).into_owned().collect(),
                None => MultiDict::new(),
            })
    }

    /// Fields of a URL-encoded body. Empty for other content types.
    pub fn form(&self) -> &MultiDict {
        self.form.get_or_init(|| {
            if self.mimetype().as_deref() != Some(FORM_MIME) {
                return MultiDict::new();
            }
            form_urlencoded::parse(&self.body).into_owned().collect()
        })
    }

    pub fn cookies(&self) -> &MultiDict {
        self.cookies.get_or_init(|| {
            let mut cookies = MultiDict::new();
            let headers = self.headers.get_all(header::COOKIE);
            for value in headers.iter().filter_map(|v| v.to_str().ok()) {
                for (name, value) in parse_cookie_header(value).iter() {
                    cookies.append(name, value);
                }
            }
            cookies
        })
    }

    /// The body decoded as JSON, decoded on first access only.
    ///
    /// An empty body is `None`. A malformed body is `None` with a warning,
    /// or a `400` carrying the decode error in debug mode.
    pub fn json(&self) -> Result<Option<&Value>, HttpError> {
        match self.json.get_or_init(|| decode_json(&self.body)) {
            JsonBody::Missing => Ok(None),
            JsonBody::Valid(value) => Ok(Some(value)),
            JsonBody::Invalid(reason) if self.debug => Err(HttpError::bad_request(format!(
                "Failed to decode JSON object: {reason}"
            ))
            .with_visible_detail()),
            JsonBody::Invalid(_) => Ok(None),
        }
    }

    /// A query parameter that must be present.
    pub fn require_arg(&self, key: &str) -> Result<&str, HttpError> {
        self.args().get(key).ok_or_else(|| self.missing_key(key))
    }

    /// A form field that must be present.
    pub fn require_form(&self, key: &str) -> Result<&str, HttpError> {
        self.form().get(key).ok_or_else(|| self.missing_key(key))
    }

    fn missing_key(&self, key: &str) -> HttpError {
        let err = HttpError::bad_request(format!("The browser sent a request without {key:?}"));
        if self.debug {
            err.with_visible_detail()
        } else {
            err
        }
    }

    /// Outcome of route resolution, once the dispatcher has run it.
    pub fn resolution(&self) -> Option<&Result<RouteMatch, RoutingError>> {
        self.resolution.get()
    }

    pub fn route_match(&self) -> Option<&RouteMatch> {
        self.resolution().and_then(|r| r.as_ref().ok())
    }

    pub fn routing_error(&self) -> Option<&RoutingError> {
        self.resolution().and_then(|r| r.as_ref().err())
    }

    pub fn route(&self) -> Option<&Arc<RouteDescriptor>> {
        self.route_match().map(|m| &m.route)
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.route().map(|r| r.endpoint())
    }

    /// Typed path parameters of the matched route.
    pub fn view_args(&self) -> Option<&PathParams> {
        self.route_match().map(|m| &m.params)
    }

    /// Directory templates and files are resolved against.
    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.get().map(PathBuf::as_path)
    }

    /// The request's session; the null session until one is opened.
    pub fn session(&self) -> Session {
        self.session.lock().clone().unwrap_or_else(Session::null)
    }

    pub fn has_session(&self) -> bool {
        self.session.lock().is_some()
    }

    pub(crate) fn set_resolution(&self, resolution: Result<RouteMatch, RoutingError>) {
        if self.resolution.set(resolution).is_err() {
            tracing::warn!(path = %self.path, "Route resolution already recorded");
        }
    }

    pub(crate) fn set_cwd(&self, cwd: PathBuf) {
        let _ = self.cwd.set(cwd);
    }

    /// Where the dispatcher currently is with this request.
    pub fn dispatch_state(&self) -> DispatchState {
        *self.state.lock()
    }

    /// Move to `to`, returning the state left behind.
    pub(crate) fn replace_dispatch_state(&self, to: DispatchState) -> DispatchState {
        std::mem::replace(&mut *self.state.lock(), to)
    }

    pub(crate) fn set_session(&self, session: Session) {
        *self.session.lock() = Some(session);
    }

    pub(crate) fn release_session(&self) -> Option<Session> {
        self.session.lock().take()
    }
}

fn decode_json(body: &[u8]) -> JsonBody {
    if body.is_empty() {
        return JsonBody::Missing;
    }
    match serde_json::from_slice(body) {
        Ok(value) => JsonBody::Valid(value),
        Err(e) => {
            tracing::warn!(
                error = %e,
                body = %String::from_utf8_lossy(body),
                "Error decoding JSON"
            );
            JsonBody::Invalid(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn post(body: &'static str, content_type: &'static str) -> Request {
        Request::new(Method::POST, "/submit")
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static(content_type))
            .with_body(body)
    }

    #[test]
    fn test_query_args() {
        let request = Request::new(Method::GET, "/search?q=rust+lang&tag=a&tag=b");
        assert_eq!(request.path(), "/search");
        assert_eq!(request.args().get("q"), Some("rust lang"));
        assert_eq!(request.args().get_all("tag").collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(std::ptr::eq(request.args(), request.args()));
    }

    #[test]
    fn test_query_escapes_and_bare_keys() {
        let request = Request::new(Method::GET, "/?city=M%C3%BCnchen&empty=&flag&pct=100%");
        let args = request.args();
        assert_eq!(args.get("city"), Some("München"));
        assert_eq!(args.get("empty"), Some(""));
        assert_eq!(args.get("flag"), Some(""));
        assert_eq!(args.get("pct"), Some("100%"));
        assert_eq!(args.len(), 4);
    }

    #[test]
    fn test_form_only_for_urlencoded() {
        let request = post("name=ada&lang=rust", FORM_MIME);
        assert_eq!(request.require_form("name").unwrap(), "ada");

        let request = post("name=ada", "text/plain");
        assert!(request.form().is_empty());
        assert!(matches!(
            request.require_form("name"),
            Err(HttpError::BadRequest { show_detail: false, .. })
        ));
    }

    #[test]
    fn test_missing_key_visible_in_debug() {
        let request = Request::new(Method::GET, "/").with_debug(true);
        assert!(matches!(
            request.require_arg("page"),
            Err(HttpError::BadRequest { show_detail: true, .. })
        ));
    }

    #[test]
    fn test_json_is_decoded_once() {
        let request = post(r#"{"msg": "hi"}"#, "application/json");
        let first = request.json().unwrap().unwrap();
        assert_eq!(first, &json!({"msg": "hi"}));
        let second = request.json().unwrap().unwrap();
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn test_malformed_json_is_absent_outside_debug() {
        let request = post("{nope", "application/json");
        assert!(request.json().unwrap().is_none());
        assert!(request.json().unwrap().is_none());

        let request = post("{nope", "application/json").with_debug(true);
        let err = request.json().unwrap_err();
        assert!(matches!(err, HttpError::BadRequest { show_detail: true, .. }));
    }

    #[test]
    fn test_empty_body_has_no_json() {
        assert!(Request::new(Method::GET, "/").json().unwrap().is_none());
    }

    #[test]
    fn test_cookies_keep_order_and_duplicates() {
        let request = Request::new(Method::GET, "/")
            .with_header(header::COOKIE, HeaderValue::from_static("a=1; b=2"))
            .with_header(header::COOKIE, HeaderValue::from_static("a=3"));
        let cookies = request.cookies();
        assert_eq!(cookies.get_all("a").collect::<Vec<_>>(), vec!["1", "3"]);
        assert_eq!(cookies.get("b"), Some("2"));
    }

    #[test]
    fn test_session_defaults_to_null_until_set() {
        let request = Request::new(Method::GET, "/");
        assert!(request.session().is_null());
        request.set_session(Session::new());
        assert!(!request.session().is_null());
        assert!(request.release_session().is_some());
        assert!(!request.has_session());
    }

    #[test]
    fn test_resolution_is_recorded_once() {
        let request = Request::new(Method::GET, "/");
        assert!(request.resolution().is_none());
        request.set_resolution(Err(RoutingError::NotFound));
        request.set_resolution(Err(RoutingError::Redirect {
            location: "/x".into(),
        }));
        assert_eq!(request.routing_error(), Some(&RoutingError::NotFound));
        assert!(request.endpoint().is_none());
    }

    #[test]
    fn test_url() {
        let request = Request::new(Method::GET, "/a?b=1")
            .with_header(header::HOST, HeaderValue::from_static("example.com"));
        assert_eq!(request.url(), "http://example.com/a?b=1");
    }
}
