//! The per-request session object.
//!
//! # Design Decisions
//! - Cheap to clone: clones share the same state, so the request, the ambient
//!   accessors and the codec all observe the same flags
//! - Reads set `accessed`, writes set `modified` and `accessed`
//! - The null variant answers reads like an empty session and refuses writes

use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::session::SessionError;

/// Reserved key holding the permanent flag.
pub const PERMANENT_KEY: &str = "_permanent";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionKind {
    Secure,
    Null,
}

#[derive(Debug, Default)]
struct SessionState {
    data: Map<String, Value>,
    new: bool,
    modified: bool,
    accessed: bool,
}

/// A mutable key-value session shared by everything handling one request.
#[derive(Debug, Clone)]
pub struct Session {
    kind: SessionKind,
    state: Arc<Mutex<SessionState>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// A fresh, empty session (no cookie, or an invalid one).
    pub fn new() -> Self {
        Self::with_state(
            SessionKind::Secure,
            SessionState {
                new: true,
                ..SessionState::default()
            },
        )
    }

    /// A session decoded from a valid cookie.
    pub fn from_data(data: Map<String, Value>) -> Self {
        Self::with_state(
            SessionKind::Secure,
            SessionState {
                data,
                ..SessionState::default()
            },
        )
    }

    /// The inert session used when no secret key is configured.
    pub fn null() -> Self {
        Self::with_state(SessionKind::Null, SessionState::default())
    }

    fn with_state(kind: SessionKind, state: SessionState) -> Self {
        Self {
            kind,
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn is_null(&self) -> bool {
        self.kind == SessionKind::Null
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let mut state = self.state.lock();
        state.accessed = true;
        state.data.get(key).cloned()
    }

    /// Read `key` and deserialize it into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        state.accessed = true;
        state.data.contains_key(key)
    }

    pub fn insert<T: Serialize>(&self, key: impl Into<String>, value: T) -> Result<(), SessionError> {
        let value = serde_json::to_value(value)?;
        self.write(|data| {
            data.insert(key.into(), value);
        })
    }

    pub fn remove(&self, key: &str) -> Result<Option<Value>, SessionError> {
        let mut removed = None;
        self.write(|data| removed = data.remove(key))?;
        Ok(removed)
    }

    pub fn clear(&self) -> Result<(), SessionError> {
        self.write(Map::clear)
    }

    /// Whether the cookie outlives the browser session.
    pub fn permanent(&self) -> bool {
        self.state
            .lock()
            .data
            .get(PERMANENT_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn set_permanent(&self, permanent: bool) -> Result<(), SessionError> {
        self.write(|data| {
            data.insert(PERMANENT_KEY.to_string(), Value::Bool(permanent));
        })
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.state.lock().data.len()
    }

    /// True when no valid cookie was presented.
    pub fn is_new(&self) -> bool {
        self.state.lock().new
    }

    pub fn is_modified(&self) -> bool {
        self.state.lock().modified
    }

    pub fn was_accessed(&self) -> bool {
        self.state.lock().accessed
    }

    /// Flag a change made through a value obtained from `get`.
    pub fn mark_modified(&self) {
        if !self.is_null() {
            self.state.lock().modified = true;
        }
    }

    /// Snapshot of the stored data.
    pub fn to_map(&self) -> Map<String, Value> {
        self.state.lock().data.clone()
    }

    fn write(&self, f: impl FnOnce(&mut Map<String, Value>)) -> Result<(), SessionError> {
        if self.is_null() {
            return Err(SessionError::Unavailable);
        }
        let mut state = self.state.lock();
        f(&mut state.data);
        state.modified = true;
        state.accessed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flags() {
        let session = Session::new();
        assert!(session.is_new());
        assert!(!session.was_accessed());

        assert_eq!(session.get("user"), None);
        assert!(session.was_accessed());
        assert!(!session.is_modified());

        session.insert("user", "ada").unwrap();
        assert!(session.is_modified());
        assert_eq!(session.get_as::<String>("user").as_deref(), Some("ada"));
    }

    #[test]
    fn test_clones_share_state() {
        let session = Session::from_data(Map::new());
        let other = session.clone();
        other.insert("n", 1).unwrap();
        assert_eq!(session.get("n"), Some(json!(1)));
        assert!(session.is_modified());
    }

    #[test]
    fn test_permanent_flag_is_stored() {
        let session = Session::new();
        assert!(!session.permanent());
        session.set_permanent(true).unwrap();
        assert!(session.permanent());
        assert_eq!(session.to_map().get(PERMANENT_KEY), Some(&json!(true)));
    }

    #[test]
    fn test_null_session_refuses_writes() {
        let session = Session::null();
        assert!(session.is_null());
        assert_eq!(session.get("x"), None);
        assert!(matches!(
            session.insert("x", 1),
            Err(SessionError::Unavailable)
        ));
        assert!(session.clear().is_err());
        session.mark_modified();
        assert!(!session.is_modified());
    }
}
