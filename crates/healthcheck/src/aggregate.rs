//! Concurrent fan-out/fan-in over a set of health checkers.

use crate::checkers::HealthChecker;
use crate::types::ProbeResult;
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

/// A named probe target
#[derive(Clone)]
pub struct Probe<K> {
    /// Key the result is reported under
    pub key: K,
    /// Checker performing the probe
    pub checker: Arc<dyn HealthChecker>,
}

impl<K> Probe<K> {
    pub fn new(key: K, checker: Arc<dyn HealthChecker>) -> Self {
        Self { key, checker }
    }
}

/// Run every probe at once and wait until all of them have settled.
///
/// Results come back in input order, one per probe. A checker that does not
/// settle within `deadline` is reported as unreachable, so the whole call is
/// bounded by roughly one deadline regardless of how many probes hang.
pub async fn probe_all<K>(probes: &[Probe<K>], deadline: Duration) -> Vec<(K, ProbeResult)>
where
    K: Clone,
{
    let started = Instant::now();

    let pending = probes.iter().map(|probe| {
        let checker = probe.checker.clone();
        async move {
            let start = Instant::now();
            match timeout(deadline, checker.check()).await {
                Ok(result) => result,
                Err(_) => ProbeResult::timed_out(start.elapsed()),
            }
        }
    });

    let results = join_all(pending).await;

    debug!(
        probes = probes.len(),
        elapsed_ms = started.elapsed().as_millis(),
        "All health probes settled"
    );

    probes
        .iter()
        .map(|probe| probe.key.clone())
        .zip(results)
        .collect()
}
