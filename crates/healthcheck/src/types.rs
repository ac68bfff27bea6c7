//! Probe result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Classification of a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    /// Backend answered with a success status
    Healthy,
    /// Backend answered, but not with a success status
    Unhealthy,
    /// No response: connection failure, DNS failure or timeout
    Unreachable,
}

impl ProbeStatus {
    /// Lowercase label, as used in reports and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeStatus::Healthy => "healthy",
            ProbeStatus::Unhealthy => "unhealthy",
            ProbeStatus::Unreachable => "unreachable",
        }
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one probe attempt
#[derive(Debug, Clone)]
pub struct ProbeResult {
    /// Classification of the probe
    pub status: ProbeStatus,

    /// Time spent waiting for the probe to settle
    pub duration: Duration,

    /// Response code, when the backend answered
    pub response_code: Option<u16>,

    /// Failure message, only set for unreachable backends
    pub error: Option<String>,

    /// When the probe settled
    pub checked_at: DateTime<Utc>,
}

impl ProbeResult {
    /// Create a healthy result
    pub fn healthy(duration: Duration, response_code: u16) -> Self {
        Self {
            status: ProbeStatus::Healthy,
            duration,
            response_code: Some(response_code),
            error: None,
            checked_at: Utc::now(),
        }
    }

    /// Create an unhealthy result
    pub fn unhealthy(duration: Duration, response_code: u16) -> Self {
        Self {
            status: ProbeStatus::Unhealthy,
            duration,
            response_code: Some(response_code),
            error: None,
            checked_at: Utc::now(),
        }
    }

    /// Create an unreachable result
    pub fn unreachable(duration: Duration, error: impl Into<String>) -> Self {
        Self {
            status: ProbeStatus::Unreachable,
            duration,
            response_code: None,
            error: Some(error.into()),
            checked_at: Utc::now(),
        }
    }

    /// Create an unreachable result for a probe that did not settle in time
    pub fn timed_out(duration: Duration) -> Self {
        Self::unreachable(
            duration,
            format!("health probe timed out after {}ms", duration.as_millis()),
        )
    }

    /// Check if the result is healthy
    pub fn is_healthy(&self) -> bool {
        self.status == ProbeStatus::Healthy
    }
}
