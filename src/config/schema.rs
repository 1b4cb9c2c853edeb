//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure consumed by the
//! dispatcher. All types derive Serde traits for deserialization from config
//! files.

use serde::{Deserialize, Serialize};

/// Environment variable that switches debug mode on when no config sets it.
pub const DEBUG_ENV_VAR: &str = "DISPATCHR_DEBUG";

/// Root configuration for an application.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    /// Debug mode: detailed client errors, strict JSON decoding.
    pub debug: bool,

    /// Testing mode: exceptions propagate unless overridden.
    pub testing: bool,

    /// Re-raise handler errors past the dispatcher.
    /// `None` falls back to `TESTING || DEBUG`.
    pub propagate_exceptions: Option<bool>,

    /// Primary session signing key. Sessions are disabled without it.
    pub secret_key: Option<String>,

    /// Retired signing keys still accepted when verifying cookies.
    pub secret_key_fallbacks: Vec<String>,

    /// Lifetime of a permanent session cookie, in seconds.
    pub permanent_session_lifetime: u64,

    /// Maximum age of a session signature, in seconds.
    pub session_signature_max_age: u64,

    /// Host (and optional port) the application is served from.
    pub server_name: Option<String>,

    /// Path prefix the application is mounted under.
    pub application_root: String,

    /// Hosts accepted in the `Host` header. `None` accepts any host.
    pub trusted_hosts: Option<Vec<String>>,

    /// Name of the session cookie.
    pub session_cookie_name: String,

    /// Domain attribute of the session cookie.
    pub session_cookie_domain: Option<String>,

    /// Path attribute of the session cookie. Defaults to `APPLICATION_ROOT`.
    pub session_cookie_path: Option<String>,

    /// HttpOnly attribute of the session cookie.
    pub session_cookie_httponly: bool,

    /// Secure attribute of the session cookie.
    pub session_cookie_secure: bool,

    /// SameSite attribute of the session cookie (`Strict`, `Lax` or `None`).
    pub session_cookie_samesite: Option<String>,

    /// Re-issue the session cookie on every request, not only on change.
    pub session_refresh_each_request: bool,

    /// Transport settings.
    #[serde(rename = "server")]
    pub server: ServerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            debug: debug_flag_from_env(),
            testing: false,
            propagate_exceptions: None,
            secret_key: None,
            secret_key_fallbacks: Vec::new(),
            permanent_session_lifetime: 31 * 24 * 60 * 60,
            session_signature_max_age: 3600,
            server_name: None,
            application_root: "/".to_string(),
            trusted_hosts: None,
            session_cookie_name: "session".to_string(),
            session_cookie_domain: None,
            session_cookie_path: None,
            session_cookie_httponly: true,
            session_cookie_secure: false,
            session_cookie_samesite: None,
            session_refresh_each_request: true,
            server: ServerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Whether handler errors should escape the dispatcher.
    pub fn propagate_exceptions(&self) -> bool {
        self.propagate_exceptions
            .unwrap_or(self.testing || self.debug)
    }

    /// Effective path attribute for the session cookie.
    pub fn session_cookie_path(&self) -> &str {
        self.session_cookie_path
            .as_deref()
            .unwrap_or(&self.application_root)
    }

    /// Convenience constructor used by tests and embedders.
    pub fn with_secret_key(mut self, key: impl Into<String>) -> Self {
        self.secret_key = Some(key.into());
        self
    }
}

/// Transport configuration for the built-in HTTP server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:3200").
    pub bind_address: String,

    /// Request timeout (total time for request/response) in seconds.
    pub request_timeout_secs: u64,

    /// Maximum buffered request body size in bytes.
    pub max_body_size: usize,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3200".to_string(),
            request_timeout_secs: 30,
            max_body_size: 2 * 1024 * 1024, // 2MB
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Read the debug flag from the environment (`0`, `false` and `no` mean off).
pub fn debug_flag_from_env() -> bool {
    std::env::var(DEBUG_ENV_VAR)
        .map(|val| parse_debug_flag(&val))
        .unwrap_or(false)
}

fn parse_debug_flag(val: &str) -> bool {
    !val.is_empty() && !matches!(val.to_lowercase().as_str(), "0" | "false" | "no")
}
