//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Ctrl+C or Shutdown::trigger → server stops accepting
//!     → in-flight requests drain → exit
//! ```
//!
//! # Design Decisions
//! - One broadcast channel; every long-running task subscribes
//! - The server owns no signal handling beyond Ctrl+C; embedders trigger
//!   shutdown programmatically

pub mod shutdown;

pub use shutdown::Shutdown;
