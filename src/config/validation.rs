//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (lifetimes > 0, bind address parses)
//! - Detect inconsistent session cookie settings
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::AppConfig;
use crate::http::cookies::SameSite;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("SESSION_COOKIE_NAME must not be empty")]
    EmptyCookieName,

    #[error("SESSION_COOKIE_SAMESITE must be one of Strict, Lax or None (got {0:?})")]
    InvalidSameSite(String),

    #[error("SESSION_COOKIE_SAMESITE=None requires SESSION_COOKIE_SECURE")]
    InsecureSameSiteNone,

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("APPLICATION_ROOT must start with '/' (got {0:?})")]
    InvalidApplicationRoot(String),

    #[error("invalid bind address {0:?}")]
    InvalidBindAddress(String),

    #[error("SECRET_KEY_FALLBACKS is set but SECRET_KEY is not")]
    FallbacksWithoutSecret,
}

/// Check a configuration for semantic errors.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.session_cookie_name.trim().is_empty() {
        errors.push(ValidationError::EmptyCookieName);
    }

    if let Some(samesite) = &config.session_cookie_samesite {
        match SameSite::from_str(samesite) {
            Ok(SameSite::None) if !config.session_cookie_secure => {
                errors.push(ValidationError::InsecureSameSiteNone);
            }
            Ok(_) => {}
            Err(_) => errors.push(ValidationError::InvalidSameSite(samesite.clone())),
        }
    }

    if config.permanent_session_lifetime == 0 {
        errors.push(ValidationError::ZeroDuration("PERMANENT_SESSION_LIFETIME"));
    }
    if config.session_signature_max_age == 0 {
        errors.push(ValidationError::ZeroDuration("SESSION_SIGNATURE_MAX_AGE"));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroDuration("server.request_timeout_secs"));
    }

    if !config.application_root.starts_with('/') {
        errors.push(ValidationError::InvalidApplicationRoot(
            config.application_root.clone(),
        ));
    }

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.server.bind_address.clone(),
        ));
    }

    let has_secret = config
        .secret_key
        .as_deref()
        .is_some_and(|key| !key.is_empty());
    if !config.secret_key_fallbacks.is_empty() && !has_secret {
        errors.push(ValidationError::FallbacksWithoutSecret);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_samesite_rules() {
        let mut config = AppConfig::default();
        config.session_cookie_samesite = Some("Sometimes".into());
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::InvalidSameSite("Sometimes".into())]
        );

        config.session_cookie_samesite = Some("None".into());
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::InsecureSameSiteNone]
        );

        config.session_cookie_secure = true;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = AppConfig::default();
        config.permanent_session_lifetime = 0;
        config.server.bind_address = "nowhere".into();
        config.secret_key_fallbacks = vec!["old".into()];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::FallbacksWithoutSecret));
    }
}
