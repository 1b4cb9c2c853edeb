//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher, sessions, routing, server:
//!     → logging.rs (structured tracing events, request ID spans from the
//!       server's trace layer)
//!     → metrics.rs (request counters and latency histograms)
//!
//! Consumers:
//!     → stdout (compact, or pretty in debug mode)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Log filtering follows `RUST_LOG` when set, the configured level otherwise
//! - Metrics are recorded unconditionally; without an installed exporter the
//!   `metrics` macros are no-ops

pub mod logging;
pub mod metrics;
