//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global tracing subscriber
//! - Derive the filter from `RUST_LOG` or the configured level
//!
//! # Design Decisions
//! - Compact format by default, pretty format in debug mode
//! - Initializing twice is harmless; the first subscriber stays

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(level: &str) -> String {
    format!("dispatchr={level},tower_http={level}")
}

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init_logging(level: &str, debug: bool) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(level)));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if debug {
        registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init()
    };
    installed.is_ok()
}
