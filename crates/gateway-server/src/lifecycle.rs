//! Process lifecycle: `Starting → Listening → Draining → Stopped`.

use crate::metrics::MetricsRegistry;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Lifecycle state of the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Starting,
    Listening,
    Draining,
    Stopped,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Listening => "listening",
            LifecycleState::Draining => "draining",
            LifecycleState::Stopped => "stopped",
        }
    }

    /// Gauge value exported as `gateway_lifecycle_state`
    fn gauge_value(&self) -> i64 {
        match self {
            LifecycleState::Starting => 0,
            LifecycleState::Listening => 1,
            LifecycleState::Draining => 2,
            LifecycleState::Stopped => 3,
        }
    }

    /// States only move forward; skipping ahead is allowed (a bind failure
    /// goes straight from `Starting` to `Stopped`).
    fn can_become(&self, next: LifecycleState) -> bool {
        next > *self
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Publishes lifecycle transitions to any number of observers
pub struct Lifecycle {
    tx: watch::Sender<LifecycleState>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl Lifecycle {
    pub fn new(metrics: Option<Arc<MetricsRegistry>>) -> Self {
        let (tx, _rx) = watch::channel(LifecycleState::Starting);
        if let Some(ref m) = metrics {
            m.set_lifecycle_state(LifecycleState::Starting.gauge_value());
        }
        Self { tx, metrics }
    }

    pub fn state(&self) -> LifecycleState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.tx.subscribe()
    }

    /// Move to `next`. Backward or repeated transitions are ignored and
    /// reported as `false`.
    pub fn transition(&self, next: LifecycleState) -> bool {
        let previous = self.state();
        if !previous.can_become(next) {
            warn!(from = %previous, to = %next, "Ignoring invalid lifecycle transition");
            return false;
        }

        self.tx.send_replace(next);
        if let Some(ref m) = self.metrics {
            m.set_lifecycle_state(next.gauge_value());
        }
        info!(from = %previous, to = %next, "Lifecycle transition");
        true
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Wait for SIGTERM or SIGINT and return the name of the signal received.
///
/// If a handler cannot be installed the other signal is still awaited; if
/// neither can be, this never resolves.
pub async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "SIGINT",
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGINT");
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                "SIGTERM"
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    tokio::select! {
        name = ctrl_c => name,
        name = terminate => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        let lifecycle = Lifecycle::default();
        assert_eq!(lifecycle.state(), LifecycleState::Starting);

        assert!(lifecycle.transition(LifecycleState::Listening));
        assert!(lifecycle.transition(LifecycleState::Draining));
        assert!(lifecycle.transition(LifecycleState::Stopped));
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    }

    #[test]
    fn test_backward_and_repeated_transitions_ignored() {
        let lifecycle = Lifecycle::default();
        lifecycle.transition(LifecycleState::Draining);

        assert!(!lifecycle.transition(LifecycleState::Listening));
        assert!(!lifecycle.transition(LifecycleState::Draining));
        assert_eq!(lifecycle.state(), LifecycleState::Draining);
    }

    #[test]
    fn test_bind_failure_skips_to_stopped() {
        let lifecycle = Lifecycle::default();
        assert!(lifecycle.transition(LifecycleState::Stopped));
    }

    #[tokio::test]
    async fn test_subscribers_observe_transitions() {
        let lifecycle = Lifecycle::default();
        let mut rx = lifecycle.subscribe();

        lifecycle.transition(LifecycleState::Listening);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), LifecycleState::Listening);
    }

    #[test]
    fn test_metrics_gauge_tracks_state() {
        let metrics = Arc::new(MetricsRegistry::new());
        let lifecycle = Lifecycle::new(Some(metrics.clone()));
        lifecycle.transition(LifecycleState::Draining);

        let text = metrics.render().unwrap();
        assert!(text.contains("gateway_lifecycle_state 2"));
    }
}
