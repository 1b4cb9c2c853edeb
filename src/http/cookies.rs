//! Cookie parsing and `Set-Cookie` rendering.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};

use crate::http::multidict::MultiDict;

/// The `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl FromStr for SameSite {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(SameSite::Strict),
            "lax" => Ok(SameSite::Lax),
            "none" => Ok(SameSite::None),
            _ => Err(format!("invalid SameSite value: {s}")),
        }
    }
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        };
        f.write_str(value)
    }
}

/// A cookie to be sent in a `Set-Cookie` response header.
#[derive(Debug, Clone, PartialEq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
}

impl SetCookie {
    /// A session cookie (no expiry) with the given name and value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: Some("/".to_string()),
            domain: None,
            expires: None,
            max_age: None,
            secure: false,
            http_only: false,
            same_site: None,
        }
    }

    /// A cookie that instructs the client to drop `name`.
    pub fn removal(name: impl Into<String>) -> Self {
        let mut cookie = Self::new(name, "");
        cookie.expires = Utc.timestamp_opt(0, 0).single();
        cookie.max_age = Some(0);
        cookie
    }
}

impl fmt::Display for SetCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={domain}")?;
        }
        if let Some(expires) = &self.expires {
            write!(f, "; Expires={}", expires.format("%a, %d %b %Y %H:%M:%S GMT"))?;
        }
        if let Some(max_age) = self.max_age {
            write!(f, "; Max-Age={max_age}")?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if let Some(path) = &self.path {
            write!(f, "; Path={path}")?;
        }
        if let Some(same_site) = self.same_site {
            write!(f, "; SameSite={same_site}")?;
        }
        Ok(())
    }
}

/// Parse a `Cookie` request header into ordered name/value pairs.
pub fn parse_cookie_header(header: &str) -> MultiDict {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cookie_header() {
        let cookies = parse_cookie_header("session=abc.def; theme=\"dark\"; session=second; junk");
        assert_eq!(cookies.get("session"), Some("abc.def"));
        assert_eq!(cookies.get_all("session").count(), 2);
        assert_eq!(cookies.get("theme"), Some("dark"));
        assert!(!cookies.contains_key("junk"));
    }

    #[test]
    fn test_render_set_cookie() {
        let mut cookie = SetCookie::new("session", "token");
        cookie.http_only = true;
        cookie.secure = true;
        cookie.same_site = Some(SameSite::Lax);
        cookie.expires = Utc.timestamp_opt(1_700_000_000, 0).single();

        assert_eq!(
            cookie.to_string(),
            "session=token; Expires=Tue, 14 Nov 2023 22:13:20 GMT; Secure; HttpOnly; Path=/; SameSite=Lax"
        );
    }

    #[test]
    fn test_removal_cookie_expires_in_the_past() {
        let rendered = SetCookie::removal("session").to_string();
        assert!(rendered.starts_with("session=; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=0"));
    }

    #[test]
    fn test_same_site_parse() {
        assert_eq!("lax".parse::<SameSite>(), Ok(SameSite::Lax));
        assert!("sometimes".parse::<SameSite>().is_err());
    }
}
