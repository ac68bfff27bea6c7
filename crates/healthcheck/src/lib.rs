//! Backend health probing for the MCP gateway.
//!
//! This crate provides on-demand health probes against backend services:
//! - HTTP probes classified as healthy, unhealthy or unreachable
//! - Concurrent fan-out over many backends with a per-probe deadline
//!
//! # Example
//!
//! ```no_run
//! use healthcheck::{HealthChecker, HttpChecker, Probe, probe_all};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let timeout = Duration::from_secs(5);
//! let serena: Arc<dyn HealthChecker> =
//!     Arc::new(HttpChecker::new("http://serena:8080/health", timeout)?);
//! let context7: Arc<dyn HealthChecker> =
//!     Arc::new(HttpChecker::new("http://context7:8081/health", timeout)?);
//! let probes = vec![Probe::new("serena", serena), Probe::new("context7", context7)];
//!
//! for (name, result) in probe_all(&probes, timeout).await {
//!     println!("{name}: {}", result.status);
//! }
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod checkers;
pub mod types;

pub use aggregate::{Probe, probe_all};
pub use checkers::{HealthChecker, HttpChecker};
pub use types::{ProbeResult, ProbeStatus};

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_probe_status_display() {
        assert_eq!(ProbeStatus::Healthy.to_string(), "healthy");
        assert_eq!(ProbeStatus::Unhealthy.to_string(), "unhealthy");
        assert_eq!(ProbeStatus::Unreachable.to_string(), "unreachable");
    }

    #[test]
    fn test_probe_status_serializes_lowercase() {
        let json = serde_json::to_string(&ProbeStatus::Unreachable).unwrap();
        assert_eq!(json, "\"unreachable\"");
    }

    #[test]
    fn test_probe_result_constructors() {
        let result = ProbeResult::healthy(Duration::from_millis(100), 200);
        assert!(result.is_healthy());
        assert!(result.error.is_none());
        assert_eq!(result.response_code, Some(200));

        let result = ProbeResult::unhealthy(Duration::from_millis(100), 503);
        assert!(!result.is_healthy());
        assert!(result.error.is_none());

        let result = ProbeResult::timed_out(Duration::from_millis(1500));
        assert_eq!(result.status, ProbeStatus::Unreachable);
        assert!(result.error.unwrap().contains("1500ms"));
    }
}
