//! HTTP probe implementation.

use super::ProbeError;
use reqwest::{redirect, Client, Url};
use std::time::Duration;

const USER_AGENT: &str = concat!("NanoStatus/", env!("CARGO_PKG_VERSION"));

/// Build the client shared by all HTTP probes.
///
/// Redirects are not followed: a 3xx answer already proves the target is
/// serving.
pub fn build_http_client(timeout: Duration) -> Result<Client, ProbeError> {
    Client::builder()
        .timeout(timeout)
        .redirect(redirect::Policy::none())
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ProbeError::Network(e.to_string()))
}

/// Returns true for the success and redirect ranges.
pub fn is_healthy_status(code: u16) -> bool {
    (200..400).contains(&code)
}

/// Run an HTTP probe against the given URL.
pub async fn run_http_probe(
    client: &Client,
    url: Url,
    timeout: Duration,
) -> Result<(), ProbeError> {
    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ProbeError::Timeout(timeout)
        } else {
            ProbeError::Network(e.to_string())
        }
    })?;

    let code = response.status().as_u16();
    if !is_healthy_status(code) {
        return Err(ProbeError::Status(code));
    }

    // Read the full body to measure complete transfer time
    response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            ProbeError::Timeout(timeout)
        } else {
            ProbeError::Network(e.to_string())
        }
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::{ProbeOutcome, Prober};
    use super::*;
    use crate::db::MonitorStatus;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn server_returning(template: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(template)
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn test_is_healthy_status() {
        assert!(is_healthy_status(200));
        assert!(is_healthy_status(204));
        assert!(is_healthy_status(301));
        assert!(is_healthy_status(399));
        assert!(!is_healthy_status(199));
        assert!(!is_healthy_status(404));
        assert!(!is_healthy_status(500));
    }

    #[tokio::test]
    async fn test_ok_response_is_up() {
        let server = server_returning(ResponseTemplate::new(200).set_body_string("ok")).await;
        let prober = Prober::new(Duration::from_secs(2)).unwrap();

        let outcome = prober.probe(&server.uri()).await;
        assert_eq!(outcome.status, MonitorStatus::Up);
        assert!(outcome.response_time >= 0);
    }

    #[tokio::test]
    async fn test_not_found_is_down() {
        let server = server_returning(ResponseTemplate::new(404)).await;
        let prober = Prober::new(Duration::from_secs(2)).unwrap();

        assert_eq!(prober.probe(&server.uri()).await, ProbeOutcome::down());
    }

    #[tokio::test]
    async fn test_moved_permanently_is_up() {
        let server = server_returning(
            ResponseTemplate::new(301).insert_header("Location", "https://elsewhere.invalid/"),
        )
        .await;
        let prober = Prober::new(Duration::from_secs(2)).unwrap();

        assert_eq!(prober.probe(&server.uri()).await.status, MonitorStatus::Up);
    }

    #[tokio::test]
    async fn test_server_error_is_down() {
        let server = server_returning(ResponseTemplate::new(503)).await;
        let prober = Prober::new(Duration::from_secs(2)).unwrap();

        assert_eq!(prober.probe(&server.uri()).await, ProbeOutcome::down());
    }

    #[tokio::test]
    async fn test_latency_covers_slow_response() {
        let server =
            server_returning(ResponseTemplate::new(200).set_delay(Duration::from_millis(120)))
                .await;
        let prober = Prober::new(Duration::from_secs(5)).unwrap();

        let outcome = prober.probe(&server.uri()).await;
        assert_eq!(outcome.status, MonitorStatus::Up);
        assert!(outcome.response_time >= 120);
    }

    #[tokio::test]
    async fn test_timeout_is_down() {
        let server =
            server_returning(ResponseTemplate::new(200).set_delay(Duration::from_secs(2))).await;
        let prober = Prober::new(Duration::from_millis(100)).unwrap();

        assert_eq!(prober.probe(&server.uri()).await, ProbeOutcome::down());
    }

    #[tokio::test]
    async fn test_connection_refused_is_down() {
        let prober = Prober::new(Duration::from_millis(500)).unwrap();
        assert_eq!(prober.probe("http://127.0.0.1:1").await, ProbeOutcome::down());
    }
}
