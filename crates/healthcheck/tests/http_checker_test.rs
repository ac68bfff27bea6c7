//! Integration tests for the HTTP checker against real loopback backends

use axum::{Router, http::StatusCode, routing::get};
use healthcheck::{HealthChecker, HttpChecker, Probe, ProbeStatus, probe_all};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio_test::assert_ok;

/// Spawn a backend whose `/health` answers with `status` after `delay`
async fn spawn_backend(status: StatusCode, delay: Duration) -> String {
    let app = Router::new().route(
        "/health",
        get(move || async move {
            tokio::time::sleep(delay).await;
            status
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

/// An address nothing listens on
async fn closed_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_success_status_is_healthy() {
    let base = spawn_backend(StatusCode::OK, Duration::ZERO).await;
    let checker = assert_ok!(HttpChecker::new(format!("{base}/health"), Duration::from_secs(2)));

    let result = checker.check().await;
    assert_eq!(result.status, ProbeStatus::Healthy);
    assert_eq!(result.response_code, Some(200));
    assert!(result.error.is_none());
}

#[tokio::test]
async fn test_non_success_status_is_unhealthy() {
    let base = spawn_backend(StatusCode::SERVICE_UNAVAILABLE, Duration::ZERO).await;
    let checker = HttpChecker::new(format!("{base}/health"), Duration::from_secs(2)).unwrap();

    let result = checker.check().await;
    assert_eq!(result.status, ProbeStatus::Unhealthy);
    assert_eq!(result.response_code, Some(503));
}

#[tokio::test]
async fn test_stopped_backend_is_unreachable() {
    let base = closed_address().await;
    let checker = HttpChecker::new(format!("{base}/health"), Duration::from_secs(2)).unwrap();

    let result = checker.check().await;
    assert_eq!(result.status, ProbeStatus::Unreachable);
    assert!(result.error.is_some());
}

#[tokio::test]
async fn test_slow_backend_times_out_as_unreachable() {
    let base = spawn_backend(StatusCode::OK, Duration::from_secs(10)).await;
    let checker = HttpChecker::new(format!("{base}/health"), Duration::from_millis(200)).unwrap();

    let start = Instant::now();
    let result = checker.check().await;
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(result.status, ProbeStatus::Unreachable);
}

#[tokio::test]
async fn test_one_slow_backend_does_not_serialize_the_batch() {
    let timeout = Duration::from_millis(300);
    let mut probes = Vec::new();
    for i in 0..4 {
        let base = spawn_backend(StatusCode::OK, Duration::ZERO).await;
        let checker = HttpChecker::new(format!("{base}/health"), timeout).unwrap();
        probes.push(Probe::new(format!("fast-{i}"), Arc::new(checker) as Arc<dyn HealthChecker>));
    }
    let slow = spawn_backend(StatusCode::OK, Duration::from_secs(10)).await;
    let checker = HttpChecker::new(format!("{slow}/health"), timeout).unwrap();
    probes.push(Probe::new("slow".to_string(), Arc::new(checker) as Arc<dyn HealthChecker>));

    let start = Instant::now();
    let results = probe_all(&probes, timeout).await;

    assert!(start.elapsed() < Duration::from_millis(1500));
    assert_eq!(results.len(), 5);
    assert!(results[..4].iter().all(|(_, r)| r.status == ProbeStatus::Healthy));
    assert_eq!(results[4].0, "slow");
    assert_eq!(results[4].1.status, ProbeStatus::Unreachable);
}
