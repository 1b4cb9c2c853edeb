//! Time-stamped, HMAC-signed tokens.
//!
//! Token layout (all parts URL-safe base64 without padding):
//!
//! ```text
//! payload.timestamp.signature
//! ```
//!
//! `payload` is compact JSON, `timestamp` the big-endian unix seconds with
//! leading zero bytes dropped, and `signature` an HMAC-SHA1 over
//! `payload.timestamp` keyed with `HMAC(secret, salt)`. This is the format
//! produced by `itsdangerous.URLSafeTimedSerializer` with the `hmac` key
//! derivation, so cookies survive a port between the two.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as B64, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha1::Sha1;
use thiserror::Error;

type HmacSha1 = Hmac<Sha1>;

pub const SESSION_SALT: &str = "cookie-session";

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("malformed token")]
    Malformed,

    #[error("signature does not match")]
    BadSignature,

    #[error("signature age {age}s exceeds {max_age}s")]
    Expired { age: i64, max_age: u64 },

    #[error("payload could not be decoded: {0}")]
    Payload(#[from] serde_json::Error),
}

impl SignatureError {
    pub fn kind(&self) -> &'static str {
        match self {
            SignatureError::Malformed => "malformed",
            SignatureError::BadSignature => "bad_signature",
            SignatureError::Expired { .. } => "expired",
            SignatureError::Payload(_) => "payload",
        }
    }
}

fn hmac_sha1(key: &[u8], data: &[u8]) -> HmacSha1 {
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac
}

/// Signs and verifies time-stamped JSON payloads.
#[derive(Clone)]
pub struct TimedSerializer {
    /// Derived keys; the primary key first, then fallbacks in order.
    keys: Vec<Vec<u8>>,
}

impl std::fmt::Debug for TimedSerializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimedSerializer")
            .field("keys", &self.keys.len())
            .finish()
    }
}

impl TimedSerializer {
    pub fn new<S: AsRef<[u8]>>(secret: S, fallbacks: &[S], salt: &str) -> Self {
        let keys = std::iter::once(secret.as_ref())
            .chain(fallbacks.iter().map(AsRef::as_ref))
            .map(|secret| derive_key(secret, salt))
            .collect();
        Self { keys }
    }

    pub fn dumps<T: ?Sized + Serialize>(&self, value: &T) -> Result<String, serde_json::Error> {
        self.dumps_at(value, Utc::now().timestamp())
    }

    /// Sign `value` as if the current time were `timestamp`.
    pub fn dumps_at<T: ?Sized + Serialize>(
        &self,
        value: &T,
        timestamp: i64,
    ) -> Result<String, serde_json::Error> {
        let payload = B64.encode(serde_json::to_vec(value)?);
        let signed = format!("{payload}.{}", B64.encode(timestamp_bytes(timestamp)));
        let signature = hmac_sha1(&self.keys[0], signed.as_bytes())
            .finalize()
            .into_bytes();
        Ok(format!("{signed}.{}", B64.encode(signature)))
    }

    pub fn loads<T: DeserializeOwned>(&self, token: &str, max_age: u64) -> Result<T, SignatureError> {
        self.loads_at(token, max_age, Utc::now().timestamp())
    }

    /// Verify `token` as if the current time were `now`.
    pub fn loads_at<T: DeserializeOwned>(
        &self,
        token: &str,
        max_age: u64,
        now: i64,
    ) -> Result<T, SignatureError> {
        let (signed, signature) = token.rsplit_once('.').ok_or(SignatureError::Malformed)?;
        let signature = B64
            .decode(signature)
            .map_err(|_| SignatureError::BadSignature)?;

        let verified = self
            .keys
            .iter()
            .any(|key| hmac_sha1(key, signed.as_bytes()).verify_slice(&signature).is_ok());
        if !verified {
            return Err(SignatureError::BadSignature);
        }

        let (payload, timestamp) = signed.rsplit_once('.').ok_or(SignatureError::Malformed)?;
        let timestamp = B64
            .decode(timestamp)
            .map_err(|_| SignatureError::Malformed)
            .and_then(|bytes| bytes_to_timestamp(&bytes).ok_or(SignatureError::Malformed))?;

        let age = now - timestamp;
        if age < 0 || age > i64::try_from(max_age).unwrap_or(i64::MAX) {
            return Err(SignatureError::Expired { age, max_age });
        }

        let payload = B64.decode(payload).map_err(|_| SignatureError::Malformed)?;
        Ok(serde_json::from_slice(&payload)?)
    }
}

fn derive_key(secret: &[u8], salt: &str) -> Vec<u8> {
    hmac_sha1(secret, salt.as_bytes())
        .finalize()
        .into_bytes()
        .to_vec()
}

fn timestamp_bytes(timestamp: i64) -> Vec<u8> {
    let bytes = timestamp.max(0).to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[first..].to_vec()
}

fn bytes_to_timestamp(bytes: &[u8]) -> Option<i64> {
    if bytes.len() > 8 {
        return None;
    }
    let mut buf = [0u8; 8];
    buf[8 - bytes.len()..].copy_from_slice(bytes);
    Some(i64::from_be_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    const NOW: i64 = 1_700_000_000;

    fn serializer(secret: &str, fallbacks: &[&str]) -> TimedSerializer {
        TimedSerializer::new(secret, fallbacks, SESSION_SALT)
    }

    #[test]
    fn test_round_trip() {
        let s = serializer("secret", &[]);
        let token = s.dumps_at(&json!({"user": "ada"}), NOW).unwrap();
        let value: Value = s.loads_at(&token, 3600, NOW + 10).unwrap();
        assert_eq!(value, json!({"user": "ada"}));
    }

    #[test]
    fn test_token_shape() {
        let token = serializer("secret", &[]).dumps_at(&json!({}), NOW).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "e30");
        assert_eq!(B64.decode(parts[1]).unwrap(), NOW.to_be_bytes()[4..].to_vec());
        assert!(!token.contains('=') && !token.contains('+') && !token.contains('/'));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let s = serializer("secret", &[]);
        let token = s.dumps_at(&json!({"admin": false}), NOW).unwrap();
        let forged_payload = B64.encode(br#"{"admin":true}"#);
        let rest = token.split_once('.').unwrap().1;
        let forged = format!("{forged_payload}.{rest}");
        assert!(matches!(
            s.loads_at::<Value>(&forged, 3600, NOW),
            Err(SignatureError::BadSignature)
        ));
        assert!(matches!(
            s.loads_at::<Value>("garbage", 3600, NOW),
            Err(SignatureError::Malformed)
        ));
    }

    #[test]
    fn test_expired_token() {
        let s = serializer("secret", &[]);
        let token = s.dumps_at(&json!({}), NOW).unwrap();
        assert!(matches!(
            s.loads_at::<Value>(&token, 3600, NOW + 3601),
            Err(SignatureError::Expired { .. })
        ));
        assert!(s.loads_at::<Value>(&token, 3600, NOW + 3600).is_ok());
    }

    #[test]
    fn test_fallback_keys() {
        let old = serializer("old-secret", &[]);
        let token = old.dumps_at(&json!({"n": 1}), NOW).unwrap();

        let rotated = serializer("new-secret", &["older-secret", "old-secret"]);
        assert!(rotated.loads_at::<Value>(&token, 3600, NOW).is_ok());

        let dropped = serializer("new-secret", &["older-secret"]);
        assert!(matches!(
            dropped.loads_at::<Value>(&token, 3600, NOW),
            Err(SignatureError::BadSignature)
        ));

        let reissued = rotated.dumps_at(&json!({"n": 1}), NOW).unwrap();
        assert!(serializer("new-secret", &[]).loads_at::<Value>(&reissued, 3600, NOW).is_ok());
    }
}
