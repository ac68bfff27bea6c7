//! Prometheus metrics for the gateway.

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Labels for proxied request metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ProxyLabels {
    /// Service name
    pub service: String,
    /// Outcome (forwarded, unavailable)
    pub outcome: String,
}

/// Labels for per-service metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ServiceLabels {
    pub service: String,
}

/// Labels for probe metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ProbeLabels {
    pub service: String,
    /// Probe classification (healthy, unhealthy, unreachable)
    pub status: String,
}

/// Metrics registry with all gateway metrics
pub struct MetricsRegistry {
    /// Prometheus registry
    pub registry: Registry,

    /// Proxied requests by service and outcome
    proxied_requests_total: Family<ProxyLabels, Counter>,
    /// Time until the backend started answering
    proxy_duration_seconds: Family<ServiceLabels, Histogram>,
    /// Requests for services that are not registered
    unknown_service_total: Counter,
    /// Health probes by service and classification
    probes_total: Family<ProbeLabels, Counter>,
    /// Requests rejected by the rate limiter
    rate_limited_total: Counter,
    /// Lifecycle state (0=starting, 1=listening, 2=draining, 3=stopped)
    lifecycle_state: Gauge,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let proxied_requests_total = Family::<ProxyLabels, Counter>::default();
        registry.register(
            "gateway_proxied_requests",
            "Requests forwarded to backend services",
            proxied_requests_total.clone(),
        );

        let proxy_duration_seconds = Family::<ServiceLabels, Histogram>::new_with_constructor(|| {
            // 5ms to ~40s
            Histogram::new(exponential_buckets(0.005, 2.0, 14))
        });
        registry.register(
            "gateway_proxy_duration_seconds",
            "Time until the backend returned response headers",
            proxy_duration_seconds.clone(),
        );

        let unknown_service_total = Counter::default();
        registry.register(
            "gateway_unknown_service",
            "Requests for unregistered services",
            unknown_service_total.clone(),
        );

        let probes_total = Family::<ProbeLabels, Counter>::default();
        registry.register(
            "gateway_health_probes",
            "Backend health probes by result",
            probes_total.clone(),
        );

        let rate_limited_total = Counter::default();
        registry.register(
            "gateway_rate_limited",
            "Requests rejected by the rate limiter",
            rate_limited_total.clone(),
        );

        let lifecycle_state = Gauge::default();
        registry.register(
            "gateway_lifecycle_state",
            "Lifecycle state (0=starting, 1=listening, 2=draining, 3=stopped)",
            lifecycle_state.clone(),
        );

        Self {
            registry,
            proxied_requests_total,
            proxy_duration_seconds,
            unknown_service_total,
            probes_total,
            rate_limited_total,
            lifecycle_state,
        }
    }

    /// Record a proxied request
    pub fn record_proxy(&self, service: &str, outcome: &str, elapsed: Duration) {
        self.proxied_requests_total
            .get_or_create(&ProxyLabels {
                service: service.to_string(),
                outcome: outcome.to_string(),
            })
            .inc();

        self.proxy_duration_seconds
            .get_or_create(&ServiceLabels {
                service: service.to_string(),
            })
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_unknown_service(&self) {
        self.unknown_service_total.inc();
    }

    /// Record one health probe
    pub fn record_probe(&self, service: &str, status: &str) {
        self.probes_total
            .get_or_create(&ProbeLabels {
                service: service.to_string(),
                status: status.to_string(),
            })
            .inc();
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited_total.inc();
    }

    pub fn set_lifecycle_state(&self, value: i64) {
        self.lifecycle_state.set(value);
    }

    /// Encode the registry in the Prometheus text format
    pub fn render(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// HTTP server for the metrics endpoint, separate from the gateway's own surface
pub struct MetricsServer {
    /// Metrics registry
    registry: Arc<MetricsRegistry>,
    /// Listen address
    listen_addr: String,
}

impl MetricsServer {
    /// Create a new metrics server
    pub fn new(registry: Arc<MetricsRegistry>, listen_addr: String) -> Self {
        Self {
            registry,
            listen_addr,
        }
    }

    /// Run the HTTP server until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) -> common::Result<()> {
        info!(listen_addr = %self.listen_addr, "Starting metrics HTTP server");

        let listener = TcpListener::bind(&self.listen_addr).await?;
        info!(listen_addr = %self.listen_addr, "Metrics server listening");

        axum::serve(listener, metrics_router(self.registry))
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await?;

        Ok(())
    }
}

/// Router serving `GET /metrics`
pub fn metrics_router(registry: Arc<MetricsRegistry>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(registry)
}

/// Handler for /metrics endpoint
async fn metrics_handler(State(registry): State<Arc<MetricsRegistry>>) -> Response {
    match registry.render() {
        Ok(buffer) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            buffer,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
