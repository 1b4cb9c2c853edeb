//! Loading and persisting sessions through cookies.
//!
//! # Responsibilities
//! - Decode the session cookie of an incoming request
//! - Decide whether the response re-issues, deletes or leaves the cookie
//! - Source every cookie attribute from configuration

use chrono::{Duration, Utc};
use serde_json::{Map, Value};

use crate::config::AppConfig;
use crate::http::cookies::{SameSite, SetCookie};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::observability::metrics;
use crate::session::data::Session;
use crate::session::signer::{TimedSerializer, SESSION_SALT};
use crate::session::SessionError;

/// How sessions are loaded from and saved to HTTP messages.
pub trait SessionInterface: Send + Sync {
    /// Load the session for `request`. `None` means sessions are unavailable
    /// and the caller substitutes [`SessionInterface::make_null_session`].
    fn open_session(&self, config: &AppConfig, request: &Request) -> Option<Session>;

    /// Write `session` into `response`.
    fn save_session(
        &self,
        config: &AppConfig,
        session: &Session,
        response: &mut Response,
    ) -> Result<(), SessionError>;

    fn make_null_session(&self) -> Session {
        Session::null()
    }

    fn is_null_session(&self, session: &Session) -> bool {
        session.is_null()
    }
}

/// Sessions stored client-side in a signed cookie.
#[derive(Debug, Default, Clone, Copy)]
pub struct SecureCookieSessionInterface;

impl SecureCookieSessionInterface {
    pub fn new() -> Self {
        Self
    }

    /// Serializer keyed with `SECRET_KEY` then `SECRET_KEY_FALLBACKS`.
    pub fn serializer(config: &AppConfig) -> Option<TimedSerializer> {
        let secret = config.secret_key.as_deref().filter(|s| !s.is_empty())?;
        let fallbacks: Vec<&str> = config
            .secret_key_fallbacks
            .iter()
            .map(String::as_str)
            .collect();
        Some(TimedSerializer::new(secret, &fallbacks, SESSION_SALT))
    }
}

fn same_site(config: &AppConfig) -> Option<SameSite> {
    config
        .session_cookie_samesite
        .as_deref()
        .and_then(|value| value.parse().ok())
}

impl SessionInterface for SecureCookieSessionInterface {
    fn open_session(&self, config: &AppConfig, request: &Request) -> Option<Session> {
        let serializer = Self::serializer(config)?;
        let Some(token) = request
            .cookies()
            .get(&config.session_cookie_name)
            .filter(|t| !t.is_empty())
        else {
            return Some(Session::new());
        };

        match serializer.loads::<Map<String, Value>>(token, config.session_signature_max_age) {
            Ok(data) => Some(Session::from_data(data)),
            Err(e) => {
                tracing::debug!(error = %e, "Discarding invalid session cookie");
                metrics::record_rejected_session(e.kind());
                Some(Session::new())
            }
        }
    }

    fn save_session(
        &self,
        config: &AppConfig,
        session: &Session,
        response: &mut Response,
    ) -> Result<(), SessionError> {
        let name = config.session_cookie_name.as_str();
        let domain = config.session_cookie_domain.as_deref();
        let path = config.session_cookie_path();
        let same_site = same_site(config);

        if session.was_accessed() {
            response.add_vary("Cookie");
        }

        if session.is_empty() {
            if session.is_modified() {
                response.delete_cookie(
                    name,
                    Some(path),
                    domain,
                    config.session_cookie_secure,
                    config.session_cookie_httponly,
                    same_site,
                )?;
                response.add_vary("Cookie");
            }
            return Ok(());
        }

        if !session.is_modified() && !config.session_refresh_each_request {
            return Ok(());
        }

        let Some(serializer) = Self::serializer(config) else {
            return Ok(());
        };
        let token = serializer.dumps(&session.to_map())?;

        let mut cookie = SetCookie::new(name, token);
        cookie.path = Some(path.to_string());
        cookie.domain = domain.map(str::to_string);
        cookie.secure = config.session_cookie_secure;
        cookie.http_only = config.session_cookie_httponly;
        cookie.same_site = same_site;
        if session.permanent() {
            let lifetime = i64::try_from(config.permanent_session_lifetime).unwrap_or(i64::MAX);
            cookie.expires = Utc::now().checked_add_signed(Duration::seconds(lifetime));
        }

        response.set_cookie(&cookie)?;
        response.add_vary("Cookie");
        Ok(())
    }
}
