//! Gateway server: wires the components together and runs the listener.

use crate::config::Config;
use crate::health::HealthAggregator;
use crate::http_server::{AppState, build_router};
use crate::lifecycle::{Lifecycle, LifecycleState, shutdown_signal};
use crate::metrics::{MetricsRegistry, MetricsServer};
use crate::policy::{PolicyChain, RateLimitState};
use crate::proxy::ProxyCore;
use crate::rate_limit::{FixedWindowLimiter, RateLimiter};
use crate::registry::ServiceRegistry;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shortest interval between sweeps of expired rate limit windows
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// MCP gateway server
pub struct GatewayServer {
    config: Config,
    registry: Arc<ServiceRegistry>,
    metrics: Option<Arc<MetricsRegistry>>,
    limiter: Option<Arc<FixedWindowLimiter>>,
    lifecycle: Arc<Lifecycle>,
    router: Router,
}

impl GatewayServer {
    /// Build every component from `config` and the loaded registry
    pub fn new(config: Config, registry: ServiceRegistry) -> common::Result<Self> {
        let registry = Arc::new(registry);

        let metrics = if config.metrics.enabled {
            info!("Metrics enabled on {}", config.metrics.listen_addr);
            Some(Arc::new(MetricsRegistry::new()))
        } else {
            debug!("Metrics disabled");
            None
        };

        let proxy = ProxyCore::new(registry.clone(), &config.proxy, metrics.clone())?;
        let health = HealthAggregator::new(&registry, &config.health, metrics.clone())?;

        let limiter = config.rate_limit.enabled.then(|| {
            Arc::new(FixedWindowLimiter::new(
                config.rate_limit.max_requests,
                config.rate_limit.window,
            ))
        });
        let chain = PolicyChain::new(limiter.clone().map(|limiter| {
            RateLimitState::new(
                limiter as Arc<dyn RateLimiter>,
                config.rate_limit.trust_forwarded_for,
                metrics.clone(),
            )
        }));

        let state = AppState {
            registry: registry.clone(),
            proxy: Arc::new(proxy),
            health: Arc::new(health),
            started_at: Instant::now(),
        };
        let router = chain.apply(build_router(state));

        Ok(Self {
            lifecycle: Arc::new(Lifecycle::new(metrics.clone())),
            config,
            registry,
            metrics,
            limiter,
            router,
        })
    }

    /// Fully wired router, policy chain included
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn lifecycle(&self) -> Arc<Lifecycle> {
        self.lifecycle.clone()
    }

    /// Bind the configured address and serve until SIGTERM or SIGINT
    pub async fn run(self) -> common::Result<()> {
        let addr = self.config.listen_addr();
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(e) => {
                self.lifecycle.transition(LifecycleState::Stopped);
                return Err(common::Error::config(format!("failed to bind {addr}: {e}")));
            }
        };

        self.run_until(listener, async {
            let signal = shutdown_signal().await;
            info!("{} received, shutting down gracefully", signal);
        })
        .await
    }

    /// Serve on `listener` until `shutdown` resolves, then drain.
    ///
    /// In-flight requests get up to `shutdown.drain_timeout` to finish. After
    /// that the accept loop is aborted and this returns without waiting for
    /// the remaining connections; the process exit ends them.
    pub async fn run_until<F>(self, listener: TcpListener, shutdown: F) -> common::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let port = listener.local_addr()?.port();
        info!(port = port, "MCP Gateway running on port {}", port);
        info!(services = ?self.registry.names(), "Available services");
        for entry in self.registry.entries() {
            info!(service = entry.name(), url = entry.base_url(), "Service URL");
        }

        let background = CancellationToken::new();
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        if let Some(limiter) = self.limiter.clone() {
            tasks.push(tokio::spawn(sweep_expired_windows(limiter, background.clone())));
        }

        if let Some(ref registry) = self.metrics {
            let server =
                MetricsServer::new(registry.clone(), self.config.metrics.listen_addr.clone());
            let cancel = background.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = server.run(cancel).await {
                    warn!(error = %e, "Metrics server error");
                }
            }));
        }

        self.lifecycle.transition(LifecycleState::Listening);

        let draining = CancellationToken::new();
        let graceful = {
            let lifecycle = self.lifecycle.clone();
            let draining = draining.clone();
            async move {
                shutdown.await;
                lifecycle.transition(LifecycleState::Draining);
                draining.cancel();
            }
        };

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app).with_graceful_shutdown(graceful).await
        });

        let drain_timeout = self.config.shutdown.drain_timeout;
        let finished = tokio::select! {
            result = &mut server => Some(result),
            _ = draining.cancelled() => None,
        };
        let outcome = match finished {
            Some(result) => result,
            None => match timeout(drain_timeout, &mut server).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        drain_timeout_ms = drain_timeout.as_millis(),
                        "In-flight requests still running after drain timeout, abandoning them"
                    );
                    server.abort();
                    Ok(Ok(()))
                }
            },
        };

        background.cancel();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task failed");
            }
        }

        self.lifecycle.transition(LifecycleState::Stopped);
        info!("MCP Gateway stopped");

        match outcome {
            Ok(served) => served.map_err(common::Error::from),
            Err(e) => Err(common::Error::Io(std::io::Error::other(e))),
        }
    }
}

/// Periodically drop rate limit windows that have closed
async fn sweep_expired_windows(limiter: Arc<FixedWindowLimiter>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(limiter.window().max(MIN_SWEEP_INTERVAL));
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let dropped = limiter.sweep();
                if dropped > 0 {
                    debug!(dropped = dropped, "Swept expired rate limit windows");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_services;

    fn server(config: Config) -> GatewayServer {
        let registry = ServiceRegistry::load(&config.services, |_| None).unwrap();
        GatewayServer::new(config, registry).unwrap()
    }

    #[test]
    fn test_server_creation() {
        let server = server(Config::default());
        assert_eq!(server.registry.names().len(), default_services().len());
        assert!(server.limiter.is_some());
        assert!(server.metrics.is_none());
        assert_eq!(server.lifecycle().state(), LifecycleState::Starting);
    }

    #[test]
    fn test_rate_limit_can_be_disabled() {
        let mut config = Config::default();
        config.rate_limit.enabled = false;
        config.metrics.enabled = true;

        let server = server(config);
        assert!(server.limiter.is_none());
        assert!(server.metrics.is_some());
    }

    #[tokio::test]
    async fn test_run_until_walks_lifecycle() {
        let server = server(Config::default());
        let lifecycle = server.lifecycle();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        server.run_until(listener, async {}).await.unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    }
}
