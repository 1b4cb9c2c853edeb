//! Transport boundary.
//!
//! A transport hands the dispatcher an [`Envelope`] and receives a
//! [`Response`](crate::http::Response) that it streams into a
//! [`ResponseSink`] via `Response::write_to`. The axum server in
//! `server.rs` is one transport; [`BufferedSink`] is the in-memory one used
//! by the test client.

use std::io;
use std::net::SocketAddr;

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};

/// A raw inbound request as delivered by a transport.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub remote_addr: Option<SocketAddr>,
}

impl Envelope {
    /// Build an envelope from a method and a request target (`/path?query`).
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = split_target(target);
        Self {
            method,
            path,
            query,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            remote_addr: None,
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }
}

/// Split a request target into its path and optional query string.
pub fn split_target(target: &str) -> (String, Option<String>) {
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query.to_string())),
        None => (target, None),
    };
    let path = if path.is_empty() {
        "/".to_string()
    } else if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    (path, query)
}

/// Receiver of a response: status and headers first, then body chunks.
pub trait ResponseSink {
    fn start(&mut self, status: StatusCode, headers: &HeaderMap) -> io::Result<()>;

    fn write(&mut self, chunk: &[u8]) -> io::Result<()>;
}

/// A sink that keeps the whole response in memory.
#[derive(Debug, Default)]
pub struct BufferedSink {
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ResponseSink for BufferedSink {
    fn start(&mut self, status: StatusCode, headers: &HeaderMap) -> io::Result<()> {
        if self.status.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "response already started",
            ));
        }
        self.status = Some(status);
        self.headers = headers.clone();
        Ok(())
    }

    fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        if self.status.is_none() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "body written before response start",
            ));
        }
        self.body.extend_from_slice(chunk);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_target() {
        assert_eq!(split_target("/a/b?x=1"), ("/a/b".into(), Some("x=1".into())));
        assert_eq!(split_target(""), ("/".into(), None));
        assert_eq!(split_target("?q"), ("/".into(), Some("q".into())));
        assert_eq!(split_target("rel"), ("/rel".into(), None));
    }

    #[test]
    fn test_buffered_sink_ordering() {
        let mut sink = BufferedSink::default();
        assert!(sink.write(b"early").is_err());
        sink.start(StatusCode::OK, &HeaderMap::new()).unwrap();
        sink.write(b"ok").unwrap();
        assert!(sink.start(StatusCode::OK, &HeaderMap::new()).is_err());
        assert_eq!(sink.body, b"ok");
    }
}
