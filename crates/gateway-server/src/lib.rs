//! MCP Gateway
//!
//! Reverse proxy in front of a fixed set of named MCP services. Requests to
//! `/api/{service}/...` are forwarded to that service with the prefix
//! removed; `/status` probes every backend concurrently and reports the
//! result.
//!
//! # Components
//!
//! - **Registry**: immutable name → base URL table, built once at startup
//! - **Proxy**: per-request forwarding with streamed bodies and bounded waits
//! - **Health**: concurrent fan-out of backend probes into one report
//! - **Policy**: ordered security headers, CORS, request log and rate limit stages
//! - **Front door**: `/`, `/health`, `/status`, structured 404/500 handling
//! - **Lifecycle**: bind, serve, then drain in-flight requests on SIGTERM/SIGINT

pub mod config;
pub mod error;
pub mod health;
pub mod http_server;
pub mod lifecycle;
pub mod metrics;
pub mod policy;
pub mod proxy;
pub mod rate_limit;
pub mod registry;
pub mod routing;
pub mod server;
pub mod telemetry;

pub use config::{Config, ConfigError};
pub use error::{ErrorBody, GatewayError};
pub use health::{HealthAggregator, HealthReport};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use metrics::{MetricsRegistry, MetricsServer};
pub use registry::{ServiceEntry, ServiceRegistry};
pub use server::GatewayServer;
pub use telemetry::TelemetryGuard;
