//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → stored in the App behind an ArcSwap
//!
//! On reload:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → atomic swap of Arc<AppConfig>
//!     → the next dispatched request observes the new config
//! ```
//!
//! # Design Decisions
//! - Keys recognized by the dispatch core use their upper-case names
//!   (`SECRET_KEY`, `SESSION_COOKIE_NAME`, ...); transport settings live in
//!   a lower-case `[server]` table
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{AppConfig, ServerConfig};
pub use validation::{validate_config, ValidationError};
