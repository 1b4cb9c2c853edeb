//! HTTP server transport.
//!
//! # Responsibilities
//! - Create the Axum router with one catch-all handler
//! - Wire up middleware (timeout, request ID, tracing)
//! - Buffer request bodies up to the configured limit
//! - Hand each request to the dispatcher on the blocking pool
//! - Stream dispatcher responses back to the client
//! - Apply configuration updates while serving
//!
//! # Design Decisions
//! - The dispatcher is synchronous and keeps per-thread context stacks, so
//!   every request runs start to finish inside one `spawn_blocking` task
//! - Streamed bodies are pumped from the blocking pool through a bounded
//!   channel; a client that stops reading stops the pump

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Request, State},
    response::{IntoResponse, Response as AxumResponse},
    routing::any,
    Router,
};
use futures_util::stream;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{validate_config, AppConfig, ServerConfig};
use crate::dispatch::{App, DispatchError};
use crate::http::error::HttpError;
use crate::http::response::{self, Response};
use crate::http::transport::Envelope;
use crate::lifecycle::Shutdown;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Chunks buffered between the blocking pump and the client.
const STREAM_BUFFER: usize = 4;

/// HTTP server serving one application.
pub struct HttpServer {
    router: Router,
    app: App,
}

impl HttpServer {
    /// Build a server using the app's current `[server]` settings.
    pub fn new(app: App) -> Self {
        let config = app.config().server.clone();
        let router = Self::build_router(&config, app.clone());
        Self { router, app }
    }

    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, app: App) -> Router {
        Router::new()
            .route("/", any(dispatch_handler))
            .route("/{*path}", any(dispatch_handler))
            .with_state(app)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The router, for serving through another listener or driving in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    /// Serve on `listener` until `shutdown` fires or Ctrl+C.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, app = %self.app.name(), "HTTP server starting");

        let service = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, service)
            .with_graceful_shutdown(async move { shutdown.signalled().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Apply configuration updates to `app` as they arrive. Invalid ones are
/// logged and dropped.
pub fn spawn_config_updates(app: App, mut updates: mpsc::UnboundedReceiver<AppConfig>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(config) = updates.recv().await {
            if let Err(errors) = validate_config(&config) {
                for error in &errors {
                    tracing::error!(error = %error, "Ignoring invalid configuration update");
                }
                continue;
            }
            tracing::info!(debug = config.debug, "Applying configuration update");
            app.replace_config(config);
        }
    })
}

async fn dispatch_handler(State(app): State<App>, request: Request) -> AxumResponse {
    let config = app.config();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);

    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, config.server.max_body_size).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Request body rejected");
            return into_axum(HttpError::PayloadTooLarge.to_response());
        }
    };

    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let mut envelope = Envelope::new(parts.method, target).body(body);
    envelope.headers = parts.headers;
    envelope.remote_addr = remote_addr;

    tracing::debug!(
        request_id = %request_id,
        method = %envelope.method,
        path = %envelope.path,
        "Dispatching request"
    );

    let debug = config.debug;
    let outcome = tokio::task::spawn_blocking(move || app.handle(envelope)).await;
    let response = match outcome {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => {
            tracing::error!(request_id = %request_id, error = %err, "Unhandled dispatch error");
            server_error(&err, debug)
        }
        Err(join) => {
            tracing::error!(request_id = %request_id, error = %join, "Dispatcher task failed");
            HttpError::InternalServerError { detail: None }.to_response()
        }
    };
    into_axum(response)
}

fn server_error(err: &DispatchError, debug: bool) -> Response {
    match err.as_http() {
        Some(http) => http.to_response(),
        None => HttpError::InternalServerError {
            detail: debug.then(|| err.to_string()),
        }
        .to_response(),
    }
}

/// Convert a dispatcher response into an Axum response.
pub fn into_axum(response: Response) -> AxumResponse {
    let (status, headers, body) = response.into_parts();
    let body = match body {
        response::Body::Empty => Body::empty(),
        response::Body::Bytes(bytes) => Body::from(bytes),
        response::Body::Stream(chunks) => Body::from_stream(pump(chunks)),
    };
    (status, headers, body).into_response()
}

fn pump(
    chunks: response::BodyStream,
) -> impl futures_util::Stream<Item = Result<Bytes, std::io::Error>> {
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    tokio::task::spawn_blocking(move || {
        for chunk in chunks {
            if tx.blocking_send(chunk).is_err() {
                tracing::debug!("Client went away, stopping body stream");
                break;
            }
        }
    });
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|chunk| (chunk, rx)) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::RouteRegistry;
    use crate::web;
    use axum::http::{Method, StatusCode};
    use tower::ServiceExt;

    fn app() -> App {
        let app = App::builder("server-test")
            .config(AppConfig {
                propagate_exceptions: Some(false),
                ..AppConfig::default()
            })
            .build();
        app.mount("root", "/", |r: &mut RouteRegistry| {
            web!("/hello").register(r, |req, _| {
                Ok(format!("hello {}", req.args().get("name").unwrap_or("world")).into())
            })?;
            web!("/chunks").register(r, |_, _| {
                let chunks = vec![Bytes::from_static(b"ab"), Bytes::from_static(b"cd")];
                Ok(crate::dispatch::HandlerResult::stream(
                    response::BodyStream::new(chunks.into_iter().map(Ok)),
                ))
            })?;
            Ok(())
        });
        app
    }

    async fn send(router: Router, method: Method, uri: &str, body: Body) -> (StatusCode, String, axum::http::HeaderMap) {
        let request = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .body(body)
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap(), headers)
    }

    #[tokio::test]
    async fn test_dispatches_through_router() {
        let server = HttpServer::new(app());
        let (status, body, headers) = send(server.router(), Method::GET, "/hello?name=axum", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "hello axum");
        assert!(headers.contains_key(X_REQUEST_ID));
    }

    #[tokio::test]
    async fn test_streamed_body() {
        let server = HttpServer::new(app());
        let (status, body, _) = send(server.router(), Method::GET, "/chunks", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "abcd");
    }

    #[tokio::test]
    async fn test_oversized_body_is_413() {
        let app = app();
        let mut config = (*app.config()).clone();
        config.server.max_body_size = 4;
        app.replace_config(config);

        let server = HttpServer::new(app);
        let (status, _, _) = send(server.router(), Method::POST, "/hello", Body::from("too large")).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_config_updates_are_applied() {
        let app = app();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_config_updates(app.clone(), rx);
        tx.send(AppConfig {
            application_root: "/mounted".to_string(),
            ..AppConfig::default()
        })
        .unwrap();
        drop(tx);
        handle.await.unwrap();
        assert_eq!(app.config().application_root, "/mounted");
    }

    #[tokio::test]
    async fn test_invalid_config_update_is_dropped() {
        let app = app();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_config_updates(app.clone(), rx);
        tx.send(AppConfig {
            session_cookie_name: String::new(),
            application_root: "/broken".to_string(),
            ..AppConfig::default()
        })
        .unwrap();
        drop(tx);
        handle.await.unwrap();
        assert_eq!(app.config().application_root, "/");
    }
}
