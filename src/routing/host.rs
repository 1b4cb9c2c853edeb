//! Host validation applied before route lookup.
//!
//! # Design Decisions
//! - Host comparison is case-insensitive
//! - Ports are ignored for `TRUSTED_HOSTS` and per-route hosts
//! - `SERVER_NAME` compares with the port when it names one

use crate::config::AppConfig;
use crate::routing::RoutingError;

/// Remove a trailing `:port`, keeping bracketed IPv6 literals intact.
pub fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return match rest.find(']') {
            Some(end) => &host[..end + 2],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Whether `host` is listed in `trusted`. Entries starting with `.` also
/// match every subdomain.
pub fn host_is_trusted(host: &str, trusted: &[String]) -> bool {
    let host = strip_port(host).to_ascii_lowercase();
    trusted.iter().any(|entry| {
        let entry = strip_port(entry).to_ascii_lowercase();
        match entry.strip_prefix('.') {
            Some(suffix) => host == suffix || host.ends_with(&entry),
            None => host == entry,
        }
    })
}

/// Host rules derived from configuration.
#[derive(Debug, Clone, Default)]
pub struct HostPolicy {
    trusted_hosts: Option<Vec<String>>,
    server_name: Option<String>,
}

impl HostPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            trusted_hosts: config.trusted_hosts.clone(),
            server_name: config.server_name.as_ref().map(|s| s.to_ascii_lowercase()),
        }
    }

    /// Validate the request host and return it normalized (lowercase, no port).
    pub fn check(&self, host: Option<&str>) -> Result<Option<String>, RoutingError> {
        let raw = host.map(str::trim).filter(|h| !h.is_empty());

        if let Some(trusted) = &self.trusted_hosts {
            match raw {
                Some(h) if host_is_trusted(h, trusted) => {}
                other => {
                    return Err(RoutingError::UntrustedHost {
                        host: other.unwrap_or_default().to_string(),
                    })
                }
            }
        }

        if let Some(server_name) = &self.server_name {
            let Some(h) = raw else {
                return Err(RoutingError::NotFound);
            };
            let h = h.to_ascii_lowercase();
            let matches = if server_name.contains(':') {
                h == *server_name
            } else {
                strip_port(&h) == server_name
            };
            if !matches {
                return Err(RoutingError::NotFound);
            }
        }

        Ok(raw.map(|h| strip_port(h).to_ascii_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("example.com:8080"), "example.com");
        assert_eq!(strip_port("example.com"), "example.com");
        assert_eq!(strip_port("[::1]:3200"), "[::1]");
    }

    #[test]
    fn test_trusted_hosts() {
        let trusted = vec!["example.com".to_string(), ".internal.net".to_string()];
        assert!(host_is_trusted("EXAMPLE.COM:443", &trusted));
        assert!(host_is_trusted("api.internal.net", &trusted));
        assert!(host_is_trusted("internal.net", &trusted));
        assert!(!host_is_trusted("evil.com", &trusted));
        assert!(!host_is_trusted("notinternal.net", &trusted));
    }

    #[test]
    fn test_policy_untrusted_host() {
        let policy = HostPolicy {
            trusted_hosts: Some(vec!["example.com".into()]),
            server_name: None,
        };
        assert_eq!(
            policy.check(Some("evil.com")),
            Err(RoutingError::UntrustedHost {
                host: "evil.com".into()
            })
        );
        assert_eq!(
            policy.check(Some("Example.com:80")),
            Ok(Some("example.com".into()))
        );
    }

    #[test]
    fn test_policy_server_name() {
        let policy = HostPolicy {
            trusted_hosts: None,
            server_name: Some("example.com".into()),
        };
        assert!(policy.check(Some("example.com:3200")).is_ok());
        assert_eq!(policy.check(Some("other.com")), Err(RoutingError::NotFound));
        assert_eq!(policy.check(None), Err(RoutingError::NotFound));
    }

    #[test]
    fn test_policy_open_by_default() {
        assert_eq!(HostPolicy::default().check(None), Ok(None));
    }
}
