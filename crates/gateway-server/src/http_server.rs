//! The gateway's public HTTP surface.
//!
//! `/`, `/health` and `/status` are answered locally; everything under
//! `/api/` goes to the proxy. Anything else is a structured 404, and a panic
//! in any handler becomes a structured 500.

use crate::error::GatewayError;
use crate::health::{HealthAggregator, HealthReport};
use crate::proxy::ProxyCore;
use crate::registry::ServiceRegistry;
use axum::{
    Json, Router,
    extract::{Request, State},
    response::{IntoResponse, Response},
    routing::{any, get},
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::any::Any;
use std::sync::Arc;
use std::time::Instant;
use tower_http::catch_panic::CatchPanicLayer;

const GATEWAY_NAME: &str = "MCP Gateway";
const GATEWAY_DESCRIPTION: &str = "Central proxy and load balancer for MCP services";
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared state for the front door handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ServiceRegistry>,
    pub proxy: Arc<ProxyCore>,
    pub health: Arc<HealthAggregator>,
    pub started_at: Instant,
}

#[derive(Debug, Serialize)]
struct Descriptor<'a> {
    name: &'static str,
    version: &'static str,
    description: &'static str,
    services: Vec<&'a str>,
    endpoints: Endpoints,
}

#[derive(Debug, Serialize)]
struct Endpoints {
    health: &'static str,
    status: &'static str,
    services: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Liveness<'a> {
    status: &'static str,
    timestamp: String,
    services: Vec<&'a str>,
    gateway: GatewayInfo,
}

#[derive(Debug, Serialize)]
struct GatewayInfo {
    version: &'static str,
    /// Seconds since the gateway started
    uptime: f64,
}

/// Routes of the front door, without the policy chain
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(descriptor).fallback(not_found))
        .route("/health", get(liveness).fallback(not_found))
        .route("/status", get(status).fallback(not_found))
        .route("/api/*rest", any(proxy))
        .fallback(not_found)
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

/// `GET /`: static descriptor of the gateway and its services
async fn descriptor(State(state): State<AppState>) -> Response {
    let body = Descriptor {
        name: GATEWAY_NAME,
        version: VERSION,
        description: GATEWAY_DESCRIPTION,
        services: state.registry.names(),
        endpoints: Endpoints {
            health: "/health",
            status: "/status",
            services: state
                .registry
                .entries()
                .iter()
                .map(|entry| entry.route_prefix())
                .collect(),
        },
    };
    Json(body).into_response()
}

/// `GET /health`: process liveness, independent of backend state
async fn liveness(State(state): State<AppState>) -> Response {
    let body = Liveness {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        services: state.registry.names(),
        gateway: GatewayInfo {
            version: VERSION,
            uptime: state.started_at.elapsed().as_secs_f64(),
        },
    };
    Json(body).into_response()
}

/// `GET /status`: probe every backend and report; always 200
async fn status(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.health.check_all().await)
}

/// `ANY /api/{service}/...`
async fn proxy(State(state): State<AppState>, request: Request) -> Result<Response, GatewayError> {
    state.proxy.forward(request).await
}

async fn not_found(request: Request) -> GatewayError {
    GatewayError::NotFound(request.uri().path().to_string())
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else {
        "unknown panic payload"
    };

    GatewayError::Internal(format!("handler panicked: {detail}")).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HealthSettings, ProxySettings};
    use crate::error::ErrorBody;
    use crate::registry::ServiceEntry;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    fn state() -> AppState {
        let registry = Arc::new(
            ServiceRegistry::from_entries(vec![
                ServiceEntry::new("serena", "http://127.0.0.1:1").unwrap(),
                ServiceEntry::new("work-history", "http://127.0.0.1:1").unwrap(),
            ])
            .unwrap(),
        );
        let proxy = ProxyCore::new(registry.clone(), &ProxySettings::default(), None).unwrap();
        let health = HealthAggregator::new(&registry, &HealthSettings::default(), None).unwrap();

        AppState {
            registry,
            proxy: Arc::new(proxy),
            health: Arc::new(health),
            started_at: Instant::now(),
        }
    }

    async fn call(method: &str, uri: &str) -> (StatusCode, Value) {
        let response = build_router(state())
            .oneshot(HttpRequest::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_descriptor_lists_services_in_order() {
        let (status, body) = call("GET", "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "MCP Gateway");
        assert_eq!(body["version"], VERSION);
        assert_eq!(body["services"], serde_json::json!(["serena", "work-history"]));
        assert_eq!(
            body["endpoints"]["services"],
            serde_json::json!(["/api/serena", "/api/work-history"])
        );
        assert_eq!(body["endpoints"]["status"], "/status");
    }

    #[tokio::test]
    async fn test_liveness_ignores_backends() {
        let (status, body) = call("GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["gateway"]["version"], VERSION);
        assert!(body["gateway"]["uptime"].as_f64().unwrap() >= 0.0);
        assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn test_unmatched_routes_are_structured_404() {
        for (method, uri) in [("GET", "/nope"), ("POST", "/"), ("DELETE", "/status"), ("GET", "/api")] {
            let (status, body) = call(method, uri).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{method} {uri}");
            let body: ErrorBody = serde_json::from_value(body).unwrap();
            assert_eq!(body, ErrorBody::not_found());
        }
    }

    #[tokio::test]
    async fn test_unknown_service_is_404() {
        for uri in ["/api/unknown/x", "/api/%3Cscript%3E/x"] {
            let (status, body) = call("GET", uri).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            let body: ErrorBody = serde_json::from_value(body).unwrap();
            assert_eq!(body, ErrorBody::not_found(), "{uri}");
        }
    }

    #[tokio::test]
    async fn test_dead_backend_is_503() {
        let (status, body) = call("POST", "/api/serena/tools").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let body: ErrorBody = serde_json::from_value(body).unwrap();
        assert_eq!(body, ErrorBody::service_unavailable());
    }

    #[tokio::test]
    async fn test_panic_becomes_structured_500() {
        let response = handle_panic(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, ErrorBody::internal());
    }
}
