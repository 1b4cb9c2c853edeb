//! In-process test client.
//!
//! Dispatches envelopes straight through [`App::handle`] on the calling
//! thread and keeps a cookie jar, so session round trips work without a
//! socket:
//!
//! ```ignore
//! let client = TestClient::new(app);
//! client.get("/login")?;
//! let response = client.get("/profile")?;
//! assert_eq!(response.status(), StatusCode::OK);
//! ```

use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::{Method, StatusCode};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;

use crate::dispatch::{App, DispatchError};
use crate::http::transport::{BufferedSink, Envelope};

/// A fully buffered response.
#[derive(Debug)]
pub struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl TestResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Client bound to one application, with a cookie jar.
#[derive(Debug)]
pub struct TestClient {
    app: App,
    jar: Mutex<BTreeMap<String, String>>,
}

impl TestClient {
    pub fn new(app: App) -> Self {
        Self {
            app,
            jar: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    pub fn get(&self, target: &str) -> Result<TestResponse, DispatchError> {
        self.send(Envelope::new(Method::GET, target))
    }

    pub fn post(&self, target: &str, body: impl Into<Bytes>) -> Result<TestResponse, DispatchError> {
        self.send(Envelope::new(Method::POST, target).body(body))
    }

    /// POST `value` as a JSON body.
    pub fn post_json<T: serde::Serialize>(
        &self,
        target: &str,
        value: &T,
    ) -> Result<TestResponse, DispatchError> {
        let body = serde_json::to_vec(value)?;
        self.send(
            Envelope::new(Method::POST, target)
                .header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(body),
        )
    }

    pub fn request(&self, method: Method, target: &str) -> Result<TestResponse, DispatchError> {
        self.send(Envelope::new(method, target))
    }

    /// Dispatch `envelope` with the jar's cookies attached.
    pub fn send(&self, mut envelope: Envelope) -> Result<TestResponse, DispatchError> {
        if let Some(cookie) = self.cookie_header() {
            envelope.headers.append(header::COOKIE, HeaderValue::from_str(&cookie)?);
        }

        let response = self.app.handle(envelope)?;
        let mut sink = BufferedSink::default();
        response.write_to(&mut sink)?;

        for value in sink.headers.get_all(header::SET_COOKIE) {
            if let Ok(value) = value.to_str() {
                self.store_cookie(value);
            }
        }

        Ok(TestResponse {
            status: sink.status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            headers: sink.headers,
            body: sink.body,
        })
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.jar.lock().get(name).cloned()
    }

    pub fn set_cookie(&self, name: impl Into<String>, value: impl Into<String>) {
        self.jar.lock().insert(name.into(), value.into());
    }

    pub fn clear_cookies(&self) {
        self.jar.lock().clear();
    }

    fn cookie_header(&self) -> Option<String> {
        let jar = self.jar.lock();
        if jar.is_empty() {
            return None;
        }
        let pairs: Vec<String> = jar.iter().map(|(k, v)| format!("{k}={v}")).collect();
        Some(pairs.join("; "))
    }

    fn store_cookie(&self, set_cookie: &str) {
        let mut parts = set_cookie.split(';').map(str::trim);
        let Some((name, value)) = parts.next().and_then(|pair| pair.split_once('=')) else {
            return;
        };
        let removed = value.is_empty()
            || parts.any(|attr| attr.eq_ignore_ascii_case("Max-Age=0") || attr.contains("1970"));

        let mut jar = self.jar.lock();
        if removed {
            jar.remove(name);
        } else {
            jar.insert(name.to_string(), value.to_string());
        }
    }
}
