//! Probe module for health checks.
//!
//! HTTP(S) targets get a real GET request. `ping://` targets are answered by a
//! stub that always reports `up` with a fixed latency: there is no ICMP
//! implementation, so those monitors only show that the address is configured.

mod http;

pub use http::*;

use crate::db::MonitorStatus;

use reqwest::Url;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Latency reported for `ping://` targets.
pub const PING_STUB_LATENCY_MS: i64 = 10;

/// Default hard timeout for a single probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Probe error types. These never leave the probe executor: every error is a
/// `down` outcome.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),
    #[error("unhealthy status code {0}")]
    Status(u16),
}

/// What a monitor address resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeTarget {
    Http(Url),
    PingStub,
}

/// Normalize a monitor address.
///
/// No scheme means `https://`. Only `http`, `https` and `ping` are accepted.
pub fn parse_target(address: &str) -> Result<ProbeTarget, ProbeError> {
    let address = address.trim();

    let scheme = address
        .split_once("://")
        .map(|(scheme, _)| scheme)
        .filter(|scheme| is_scheme(scheme));

    let candidate = match scheme {
        Some(scheme) => match scheme.to_ascii_lowercase().as_str() {
            "http" | "https" => address.to_string(),
            "ping" => return Ok(ProbeTarget::PingStub),
            other => return Err(ProbeError::UnsupportedScheme(other.to_string())),
        },
        None => format!("https://{}", address),
    };

    let url = Url::parse(&candidate)
        .map_err(|e| ProbeError::InvalidAddress(format!("{}: {}", address, e)))?;
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(ProbeTarget::Http(url)),
        _ => Err(ProbeError::InvalidAddress(address.to_string())),
    }
}

/// RFC 3986 scheme syntax: a letter followed by letters, digits, `+`, `-` or `.`.
fn is_scheme(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Result of one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub status: MonitorStatus,
    /// Milliseconds, 0 when down.
    pub response_time: i64,
}

impl ProbeOutcome {
    pub fn up(response_time: i64) -> Self {
        Self {
            status: MonitorStatus::Up,
            response_time,
        }
    }

    pub fn down() -> Self {
        Self {
            status: MonitorStatus::Down,
            response_time: 0,
        }
    }
}

/// Executes probes with a shared HTTP client and a hard timeout.
#[derive(Clone)]
pub struct Prober {
    client: reqwest::Client,
    timeout: Duration,
}

impl Prober {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        Ok(Self {
            client: build_http_client(timeout)?,
            timeout,
        })
    }

    /// Probe an address. Always produces exactly one outcome.
    pub async fn probe(&self, address: &str) -> ProbeOutcome {
        let start = Instant::now();

        let result = match parse_target(address) {
            Ok(ProbeTarget::PingStub) => return ProbeOutcome::up(PING_STUB_LATENCY_MS),
            Ok(ProbeTarget::Http(url)) => {
                let attempt = run_http_probe(&self.client, url, self.timeout);
                match tokio::time::timeout(self.timeout, attempt).await {
                    Ok(result) => result,
                    Err(_) => Err(ProbeError::Timeout(self.timeout)),
                }
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => ProbeOutcome::up(start.elapsed().as_millis() as i64),
            Err(e) => {
                tracing::debug!("Probe: {} is down: {}", address, e);
                ProbeOutcome::down()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_defaults_to_https() {
        match parse_target("example.com/health").unwrap() {
            ProbeTarget::Http(url) => {
                assert_eq!(url.scheme(), "https");
                assert_eq!(url.host_str(), Some("example.com"));
                assert_eq!(url.path(), "/health");
            }
            other => panic!("unexpected target {:?}", other),
        }
    }

    #[test]
    fn test_parse_target_url_in_query_is_not_a_scheme() {
        match parse_target("example.com/login?next=https://example.com/home").unwrap() {
            ProbeTarget::Http(url) => {
                assert_eq!(url.scheme(), "https");
                assert_eq!(url.host_str(), Some("example.com"));
                assert_eq!(url.query(), Some("next=https://example.com/home"));
            }
            other => panic!("unexpected target {:?}", other),
        }

        assert!(is_scheme("svn+ssh"));
        assert!(!is_scheme("example.com/login?next=https"));
        assert!(!is_scheme("1http"));
        assert!(!is_scheme(""));
    }

    #[test]
    fn test_parse_target_keeps_http_scheme() {
        match parse_target("http://localhost:8080").unwrap() {
            ProbeTarget::Http(url) => assert_eq!(url.scheme(), "http"),
            other => panic!("unexpected target {:?}", other),
        }
    }

    #[test]
    fn test_parse_target_ping_is_stub() {
        assert_eq!(parse_target("ping://8.8.8.8").unwrap(), ProbeTarget::PingStub);
    }

    #[test]
    fn test_parse_target_rejects_unknown_scheme() {
        assert!(matches!(
            parse_target("mysql://localhost:3306"),
            Err(ProbeError::UnsupportedScheme(s)) if s == "mysql"
        ));
    }

    #[test]
    fn test_parse_target_rejects_missing_host() {
        assert!(parse_target("https://").is_err());
        assert!(parse_target("").is_err());
    }

    #[tokio::test]
    async fn test_ping_stub_is_up() {
        let prober = Prober::new(Duration::from_secs(1)).unwrap();
        let outcome = prober.probe("ping://10.0.0.1").await;
        assert_eq!(outcome, ProbeOutcome::up(PING_STUB_LATENCY_MS));
    }

    #[tokio::test]
    async fn test_unparseable_address_is_down() {
        let prober = Prober::new(Duration::from_secs(1)).unwrap();
        assert_eq!(prober.probe("ftp://files.example.com").await, ProbeOutcome::down());
        assert_eq!(prober.probe("http://").await, ProbeOutcome::down());
    }
}
