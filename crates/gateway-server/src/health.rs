//! Backend health aggregation for `/status`.
//!
//! Every call probes all registered services at once and builds a fresh
//! report once each probe has settled or hit its deadline. Probe failures are
//! data in the report, never request errors.

use crate::config::HealthSettings;
use crate::metrics::MetricsRegistry;
use crate::registry::{ServiceEntry, ServiceRegistry};
use chrono::{DateTime, SecondsFormat, Utc};
use healthcheck::{HealthChecker, HttpChecker, Probe, ProbeResult, ProbeStatus, probe_all};
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Overall gateway status; the gateway reports itself healthy while it can answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayStatus {
    Healthy,
}

/// One service's entry in a [`HealthReport`]
#[derive(Debug, Clone)]
pub struct ServiceHealth {
    pub name: String,
    pub status: ProbeStatus,
    pub url: String,
    pub last_check: DateTime<Utc>,
    /// Failure message, only for unreachable services
    pub error: Option<String>,
}

impl ServiceHealth {
    fn from_probe(entry: &ServiceEntry, result: ProbeResult) -> Self {
        let error = match result.status {
            ProbeStatus::Unreachable => result.error,
            _ => None,
        };

        Self {
            name: entry.name().to_string(),
            status: result.status,
            url: entry.base_url().to_string(),
            last_check: result.checked_at,
            error,
        }
    }
}

impl Serialize for ServiceHealth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = if self.error.is_some() { 4 } else { 3 };
        let mut state = serializer.serialize_struct("ServiceHealth", fields)?;
        state.serialize_field("status", &self.status)?;
        state.serialize_field("url", &self.url)?;
        state.serialize_field(
            "lastCheck",
            &self.last_check.to_rfc3339_opts(SecondsFormat::Millis, true),
        )?;
        if let Some(ref error) = self.error {
            state.serialize_field("error", error)?;
        }
        state.end()
    }
}

/// Fresh snapshot of every service's health, in registry order.
///
/// Serializes as `{"gateway": "healthy", "services": {name: {...}, ...}}`.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub gateway: GatewayStatus,
    pub services: Vec<ServiceHealth>,
}

impl HealthReport {
    pub fn service(&self, name: &str) -> Option<&ServiceHealth> {
        self.services.iter().find(|service| service.name == name)
    }
}

impl Serialize for HealthReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct Services<'a>(&'a [ServiceHealth]);

        impl Serialize for Services<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(Some(self.0.len()))?;
                for service in self.0 {
                    map.serialize_entry(&service.name, service)?;
                }
                map.end()
            }
        }

        let mut state = serializer.serialize_struct("HealthReport", 2)?;
        state.serialize_field("gateway", &self.gateway)?;
        state.serialize_field("services", &Services(&self.services))?;
        state.end()
    }
}

/// Probes every registered service concurrently
pub struct HealthAggregator {
    probes: Vec<Probe<ServiceEntry>>,
    deadline: Duration,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl HealthAggregator {
    /// Build HTTP probes for `GET {base_url}{settings.path}` on every service
    pub fn new(
        registry: &ServiceRegistry,
        settings: &HealthSettings,
        metrics: Option<Arc<MetricsRegistry>>,
    ) -> common::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.probe_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(common::Error::healthcheck)?;

        let probes = registry
            .entries()
            .iter()
            .map(|entry| {
                let url = format!("{}{}", entry.base_url(), settings.path);
                let checker: Arc<dyn HealthChecker> = Arc::new(HttpChecker::with_client(
                    client.clone(),
                    url,
                    settings.probe_timeout,
                ));
                Probe::new(entry.clone(), checker)
            })
            .collect();

        Ok(Self {
            probes,
            deadline: settings.probe_timeout,
            metrics,
        })
    }

    /// Pair each registry entry, in order, with a caller-supplied checker
    pub fn from_checkers(
        registry: &ServiceRegistry,
        checkers: Vec<Arc<dyn HealthChecker>>,
        deadline: Duration,
    ) -> common::Result<Self> {
        if checkers.len() != registry.len() {
            return Err(common::Error::healthcheck(format!(
                "{} checkers supplied for {} services",
                checkers.len(),
                registry.len()
            )));
        }

        let probes = registry
            .entries()
            .iter()
            .cloned()
            .zip(checkers)
            .map(|(entry, checker)| Probe::new(entry, checker))
            .collect();

        Ok(Self {
            probes,
            deadline,
            metrics: None,
        })
    }

    /// Probe every service once and report the results in registry order
    pub async fn check_all(&self) -> HealthReport {
        let start = Instant::now();
        let results = probe_all(&self.probes, self.deadline).await;

        let services: Vec<ServiceHealth> = results
            .into_iter()
            .map(|(entry, result)| {
                if let Some(ref m) = self.metrics {
                    m.record_probe(entry.name(), result.status.as_str());
                }
                if result.status == ProbeStatus::Unreachable {
                    warn!(
                        service = entry.name(),
                        error = result.error.as_deref().unwrap_or_default(),
                        "Service unreachable"
                    );
                }
                ServiceHealth::from_probe(&entry, result)
            })
            .collect();

        let healthy = services
            .iter()
            .filter(|service| service.status == ProbeStatus::Healthy)
            .count();
        debug!(
            healthy = healthy,
            total = services.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Health report assembled"
        );

        HealthReport {
            gateway: GatewayStatus::Healthy,
            services,
        }
    }
}
