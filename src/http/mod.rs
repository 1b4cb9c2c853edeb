//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, timeout, body buffering)
//!     → transport.rs (Envelope)
//!     → request.rs (lazy args / form / cookies / JSON views)
//!     → [dispatcher: routing, hooks, handler, session]
//!     → response.rs (status, headers, bytes or chunk stream)
//!     → server.rs (stream back to the client)
//! ```
//!
//! # Design Decisions
//! - Requests are immutable once built; parsed views are cached on first use
//! - Protocol errors (`error.rs`) are values that know their own response
//! - Any transport that can produce an `Envelope` and consume a
//!   `ResponseSink` can host the dispatcher

pub mod cookies;
pub mod cors;
pub mod error;
pub mod json;
pub mod multidict;
pub mod request;
pub mod response;
pub mod server;
pub mod transport;

pub use cookies::{SameSite, SetCookie};
pub use cors::Cors;
pub use error::{abort, HttpError};
pub use multidict::MultiDict;
pub use request::Request;
pub use response::{Body, BodyStream, Response};
pub use server::HttpServer;
pub use transport::{BufferedSink, Envelope, ResponseSink};
