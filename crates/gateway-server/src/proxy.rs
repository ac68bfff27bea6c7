//! Request forwarding to backend services.
//!
//! Resolves `/api/{service}/...` against the registry, strips the prefix and
//! forwards method, headers and body to the backend, streaming both bodies.
//! The `Host` header is not forwarded, so the backend sees its own authority.

use crate::config::ProxySettings;
use crate::error::GatewayError;
use crate::metrics::MetricsRegistry;
use crate::registry::ServiceRegistry;
use crate::routing::{split_api_path, upstream_url};
use axum::body::{Body, Bytes, HttpBody};
use axum::extract::Request;
use axum::http::{HeaderMap, header};
use axum::response::Response;
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info};

/// Headers that apply to a single connection and are never forwarded.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Chunks buffered between the client connection and the backend request
const BODY_CHANNEL_DEPTH: usize = 16;

/// Forwards requests to the service selected by the path prefix
pub struct ProxyCore {
    client: reqwest::Client,
    registry: Arc<ServiceRegistry>,
    timeout: Duration,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl ProxyCore {
    /// Create a proxy with its own connection pool
    pub fn new(
        registry: Arc<ServiceRegistry>,
        settings: &ProxySettings,
        metrics: Option<Arc<MetricsRegistry>>,
    ) -> common::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .pool_max_idle_per_host(16)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(common::Error::proxy)?;

        Ok(Self {
            client,
            registry,
            timeout: settings.timeout,
            metrics,
        })
    }

    /// Forward one request and relay the backend's answer unchanged.
    ///
    /// Unknown services yield `RouteNotFound`; connection failures and
    /// timeouts yield `BackendUnavailable` after the cause is logged.
    pub async fn forward(&self, request: Request) -> Result<Response, GatewayError> {
        let (parts, body) = request.into_parts();

        let route = split_api_path(parts.uri.path())
            .ok_or_else(|| GatewayError::NotFound(parts.uri.path().to_string()))?;

        let Some(entry) = self.registry.lookup(route.service) else {
            debug!(service = route.service, "Request for unregistered service");
            if let Some(ref m) = self.metrics {
                m.record_unknown_service();
            }
            return Err(GatewayError::RouteNotFound(route.service.to_string()));
        };

        let target = upstream_url(entry.base_url(), route.forward_path, parts.uri.query());

        info!(
            method = %parts.method,
            path = %parts.uri,
            upstream_path = route.forward_path,
            service = entry.name(),
            "Proxying {} {} to {}",
            parts.method,
            parts.uri,
            route.forward_path,
        );

        let mut upstream = self
            .client
            .request(parts.method.clone(), &target)
            .headers(forwardable_headers(&parts.headers));

        if body.size_hint().exact() != Some(0) {
            upstream = upstream.body(pump_body(body));
        }

        let start = Instant::now();
        let response = match timeout(self.timeout, upstream.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(self.unavailable(entry.name(), e.to_string(), start)),
            Err(_) => {
                let reason = format!("no response within {}ms", self.timeout.as_millis());
                return Err(self.unavailable(entry.name(), reason, start));
            }
        };

        debug!(
            service = entry.name(),
            status = response.status().as_u16(),
            duration_ms = start.elapsed().as_millis(),
            "Backend responded"
        );
        if let Some(ref m) = self.metrics {
            m.record_proxy(entry.name(), "forwarded", start.elapsed());
        }

        Ok(relay_response(response))
    }

    fn unavailable(&self, service: &str, reason: String, start: Instant) -> GatewayError {
        error!(service = service, error = %reason, "Proxy error");
        if let Some(ref m) = self.metrics {
            m.record_proxy(service, "unavailable", start.elapsed());
        }
        GatewayError::BackendUnavailable {
            service: service.to_string(),
            reason,
        }
    }
}

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name)
}

/// Copy headers minus hop-by-hop headers, headers named in `Connection`,
/// and `Host`.
fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let connection_listed = connection_tokens(headers);

    let mut forwarded = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name_str = name.as_str();
        if name == header::HOST
            || is_hop_by_hop(name_str)
            || connection_listed.iter().any(|token| token == name_str)
        {
            continue;
        }
        forwarded.append(name.clone(), value.clone());
    }
    forwarded
}

/// Copy backend response headers minus hop-by-hop headers
fn relayable_headers(headers: &HeaderMap) -> HeaderMap {
    let connection_listed = connection_tokens(headers);

    let mut relayed = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name_str = name.as_str();
        if is_hop_by_hop(name_str) || connection_listed.iter().any(|token| token == name_str) {
            continue;
        }
        relayed.append(name.clone(), value.clone());
    }
    relayed
}

/// Lowercased header names listed in `Connection`
fn connection_tokens(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

/// Stream the inbound body to the backend without buffering it whole.
fn pump_body(body: Body) -> reqwest::Body {
    let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(BODY_CHANNEL_DEPTH);

    tokio::spawn(async move {
        let mut chunks = body.into_data_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(std::io::Error::other);
            let failed = chunk.is_err();
            if tx.send(chunk).await.is_err() || failed {
                break;
            }
        }
    });

    reqwest::Body::wrap_stream(ReceiverStream::new(rx))
}

fn relay_response(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let headers = relayable_headers(upstream.headers());

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
