//! Ordered request policy applied in front of every route.
//!
//! Stages run outermost first: security headers, CORS, request logging, rate
//! limiting, then the router itself. The order lives in [`CHAIN`] and is
//! turned into layers by [`PolicyChain::apply`].

use crate::error::{ErrorBody, error_response};
use crate::metrics::MetricsRegistry;
use crate::rate_limit::{RateDecision, RateLimiter};
use axum::Router;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::Response;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, warn};

/// One interceptor in the policy chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    SecurityHeaders,
    Cors,
    RequestLog,
    RateLimit,
}

/// Stages in the order a request passes through them
pub const CHAIN: [Stage; 4] = [
    Stage::SecurityHeaders,
    Stage::Cors,
    Stage::RequestLog,
    Stage::RateLimit,
];

/// Response headers set unless the handler already chose a value
const SECURITY_HEADERS: &[(&str, &str)] = &[
    (
        "content-security-policy",
        "default-src 'self';base-uri 'self';font-src 'self' https: data:;\
         form-action 'self';frame-ancestors 'self';img-src 'self' data:;\
         object-src 'none';script-src 'self';script-src-attr 'none';\
         style-src 'self' https: 'unsafe-inline';upgrade-insecure-requests",
    ),
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
    ("origin-agent-cluster", "?1"),
    ("referrer-policy", "no-referrer"),
    ("strict-transport-security", "max-age=31536000; includeSubDomains"),
    ("x-content-type-options", "nosniff"),
    ("x-dns-prefetch-control", "off"),
    ("x-download-options", "noopen"),
    ("x-frame-options", "SAMEORIGIN"),
    ("x-permitted-cross-domain-policies", "none"),
    ("x-xss-protection", "0"),
];

const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// State shared by the rate limiting stage
#[derive(Clone)]
pub struct RateLimitState {
    limiter: Arc<dyn RateLimiter>,
    trust_forwarded_for: bool,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl RateLimitState {
    pub fn new(
        limiter: Arc<dyn RateLimiter>,
        trust_forwarded_for: bool,
        metrics: Option<Arc<MetricsRegistry>>,
    ) -> Self {
        Self {
            limiter,
            trust_forwarded_for,
            metrics,
        }
    }
}

/// Builds the policy layers around a router
pub struct PolicyChain {
    /// `None` disables the rate limiting stage
    rate_limit: Option<RateLimitState>,
}

impl PolicyChain {
    pub fn new(rate_limit: Option<RateLimitState>) -> Self {
        Self { rate_limit }
    }

    /// Wrap `router` so requests pass through [`CHAIN`] in order.
    ///
    /// The last layer added is the outermost, so stages are added in reverse.
    pub fn apply(&self, router: Router) -> Router {
        CHAIN.iter().rev().fold(router, |router, stage| match stage {
            Stage::SecurityHeaders => router.layer(middleware::from_fn(security_headers)),
            Stage::Cors => router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
            Stage::RequestLog => router.layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_response(DefaultOnResponse::new().level(Level::INFO)),
            ),
            Stage::RateLimit => match &self.rate_limit {
                Some(state) => {
                    router.layer(middleware::from_fn_with_state(state.clone(), rate_limit))
                }
                None => router,
            },
        })
    }
}

/// Add the default hardening headers and drop `x-powered-by`
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.remove("x-powered-by");
    for &(name, value) in SECURITY_HEADERS {
        let name = HeaderName::from_static(name);
        if !headers.contains_key(&name) {
            headers.insert(name, HeaderValue::from_static(value));
        }
    }

    response
}

/// Count the request against its client's window; answer 429 once the cap is hit
pub async fn rate_limit(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_key(request.headers(), peer, state.trust_forwarded_for);

    let decision = state.limiter.check(&client);
    if !decision.allowed {
        warn!(
            client = %client,
            limit = decision.limit,
            path = %request.uri().path(),
            "Rate limit exceeded"
        );
        if let Some(ref m) = state.metrics {
            m.record_rate_limited();
        }

        let mut response =
            error_response(StatusCode::TOO_MANY_REQUESTS, ErrorBody::too_many_requests());
        let retry_after = decision.reset_after.as_secs_f64().ceil() as u64;
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(retry_after.max(1)));
        set_limit_headers(response.headers_mut(), &decision);
        return response;
    }

    let mut response = next.run(request).await;
    set_limit_headers(response.headers_mut(), &decision);
    response
}

fn set_limit_headers(headers: &mut HeaderMap, decision: &RateDecision) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
}

/// Identify the client by peer address, or by the first forwarded hop when trusted
pub fn client_key(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> String {
    let forwarded = headers
        .get(X_FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty());

    if let Some(first_hop) = forwarded.filter(|_| trust_forwarded_for) {
        return first_hop.to_string();
    }

    match peer {
        Some(addr) => addr.ip().to_string(),
        None => "unknown".to_string(),
    }
}
