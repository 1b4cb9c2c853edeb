//! dispatchr: a decorator-style web request dispatcher.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server (axum, request ID, timeout, body limit)
//!                        │ Envelope
//!                        ▼
//!                     dispatch::App::handle  (blocking worker thread)
//!                        │
//!                        ├─ context     push request (+ app) context
//!                        ├─ session     open signed cookie session
//!                        ├─ routing     site → module → compiled matcher
//!                        ├─ hooks       before_request
//!                        ├─ handler     → HandlerResult
//!                        ├─ coerce      template / file / JSON / raw, CORS
//!                        ├─ hooks       after_request, save session
//!                        └─ context     teardown hooks, pop
//!                        │ Response
//!     ◀──────────────────┘
//!
//!     Cross-cutting: config (TOML, hot reload), observability (tracing,
//!     metrics), lifecycle (shutdown)
//! ```

// Core subsystems
pub mod config;
pub mod context;
pub mod dispatch;
pub mod http;
pub mod routing;
pub mod session;

// Collaborators
pub mod render;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

// Embedding helpers
pub mod demo;
pub mod testing;

pub use config::AppConfig;
pub use context::{current_app, current_request, current_session, with_g};
pub use dispatch::{App, AppBuilder, DispatchError, HandlerResult};
pub use http::{abort, HttpError, HttpServer, Request, Response};
pub use lifecycle::Shutdown;
pub use routing::{PathParams, RouteRegistry, Web};
pub use session::Session;
