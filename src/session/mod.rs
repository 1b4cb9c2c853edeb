//! Session subsystem.
//!
//! # Data Flow
//! ```text
//! Cookie header
//!     → interface.rs (open_session: pick the configured cookie)
//!     → signer.rs (verify HMAC with SECRET_KEY, then fallbacks; check age)
//!     → data.rs (Session, shared by the request and ambient accessors)
//!     → handler reads/writes, flags track access and modification
//!     → interface.rs (save_session: Vary, delete, or re-sign and set)
//! ```
//!
//! # Design Decisions
//! - Decode failures never surface; they produce an empty session
//! - Without `SECRET_KEY` the request gets a null session that refuses writes
//! - Save failures are real errors and go through the dispatcher's error path

pub mod data;
pub mod interface;
pub mod signer;

use axum::http::header::InvalidHeaderValue;
use thiserror::Error;

pub use data::{Session, PERMANENT_KEY};
pub use interface::{SecureCookieSessionInterface, SessionInterface};
pub use signer::{SignatureError, TimedSerializer, SESSION_SALT};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(
        "The session is unavailable because no secret key was set. Set the \
         SECRET_KEY on the application to something unique and secret."
    )]
    Unavailable,

    #[error("session could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("session cookie could not be encoded: {0}")]
    Cookie(#[from] InvalidHeaderValue),
}
