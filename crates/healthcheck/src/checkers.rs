//! Health checker implementations.

use crate::types::ProbeResult;
use async_trait::async_trait;
use std::error::Error as _;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Health checker trait
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HealthChecker: Send + Sync {
    /// Perform a single probe. Never fails: failures are part of the result.
    async fn check(&self) -> ProbeResult;
}

/// HTTP health checker
///
/// Issues `GET <url>` and classifies any 2xx as healthy, any other status as
/// unhealthy, and no response at all as unreachable.
pub struct HttpChecker {
    url: String,
    timeout_duration: Duration,
    client: reqwest::Client,
}

impl HttpChecker {
    /// Create a new HTTP health checker with its own client
    pub fn new(url: impl Into<String>, timeout_duration: Duration) -> common::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout_duration)
            .build()
            .map_err(common::Error::healthcheck)?;

        Ok(Self::with_client(client, url, timeout_duration))
    }

    /// Create a checker that shares an existing client
    pub fn with_client(
        client: reqwest::Client,
        url: impl Into<String>,
        timeout_duration: Duration,
    ) -> Self {
        Self {
            url: url.into(),
            timeout_duration,
            client,
        }
    }

    /// The URL being probed
    pub fn target(&self) -> &str {
        &self.url
    }

    /// Probe timeout
    pub fn timeout(&self) -> Duration {
        self.timeout_duration
    }
}

#[async_trait]
impl HealthChecker for HttpChecker {
    async fn check(&self) -> ProbeResult {
        let start = Instant::now();

        let request = self.client.get(&self.url).timeout(self.timeout_duration);

        match timeout(self.timeout_duration, request.send()).await {
            Ok(Ok(response)) => {
                let duration = start.elapsed();
                let status_code = response.status().as_u16();

                if response.status().is_success() {
                    debug!(url = %self.url, status = status_code, duration_ms = duration.as_millis(),
                           "Health probe successful");
                    ProbeResult::healthy(duration, status_code)
                } else {
                    warn!(url = %self.url, status = status_code, "Health probe returned non-success status");
                    ProbeResult::unhealthy(duration, status_code)
                }
            }
            Ok(Err(e)) => {
                let duration = start.elapsed();
                warn!(url = %self.url, error = %e, "Health probe failed");
                if e.is_timeout() {
                    ProbeResult::timed_out(duration)
                } else {
                    ProbeResult::unreachable(duration, describe(&e))
                }
            }
            Err(_) => {
                let duration = start.elapsed();
                warn!(url = %self.url, "Health probe timed out");
                ProbeResult::timed_out(duration)
            }
        }
    }
}

/// Flatten a reqwest error and its sources into one line, without the URL.
fn describe(error: &reqwest::Error) -> String {
    let mut message = if error.is_connect() {
        "connection failed".to_string()
    } else if error.is_request() {
        "request failed".to_string()
    } else {
        "probe failed".to_string()
    };

    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProbeStatus;

    #[tokio::test]
    async fn test_http_checker_unreachable() {
        // Nothing listens on port 1
        let checker = HttpChecker::new("http://127.0.0.1:1/health", Duration::from_millis(200))
            .unwrap();

        let result = checker.check().await;
        assert_eq!(result.status, ProbeStatus::Unreachable);
        assert!(result.error.is_some());
        assert!(result.response_code.is_none());
        assert!(result.duration <= Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_http_checker_target() {
        let checker =
            HttpChecker::new("http://serena:8080/health", Duration::from_secs(1)).unwrap();
        assert_eq!(checker.target(), "http://serena:8080/health");
        assert_eq!(checker.timeout(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_mock_checker_reports_configured_result() {
        let mut mock = MockHealthChecker::new();
        mock.expect_check()
            .times(1)
            .returning(|| ProbeResult::unhealthy(Duration::from_millis(3), 500));

        let result = mock.check().await;
        assert_eq!(result.status, ProbeStatus::Unhealthy);
        assert_eq!(result.response_code, Some(500));
    }
}
