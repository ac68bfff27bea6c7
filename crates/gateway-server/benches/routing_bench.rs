// Benchmark route resolution on the request path
// Split, registry lookup and upstream URL construction

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use gateway_server::config::default_services;
use gateway_server::rate_limit::{FixedWindowLimiter, RateLimiter};
use gateway_server::registry::ServiceRegistry;
use gateway_server::routing::{split_api_path, upstream_url};
use std::time::Duration;

fn bench_route_resolution(c: &mut Criterion) {
    let registry = ServiceRegistry::load(&default_services(), |_| None).unwrap();
    let mut group = c.benchmark_group("route_resolution");

    for path in [
        "/api/serena",
        "/api/work-history/tools/list",
        "/api/sequential-thinking/a/b/c/d/e/f",
        "/api/unknown/x",
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(path), path, |b, path| {
            b.iter(|| {
                let route = split_api_path(black_box(path))?;
                let entry = registry.lookup(route.service)?;
                Some(upstream_url(entry.base_url(), route.forward_path, Some("page=2")))
            });
        });
    }

    group.finish();
}

fn bench_rate_limit_check(c: &mut Criterion) {
    let mut group = c.benchmark_group("rate_limit_check");

    group.bench_function("single_client", |b| {
        let limiter = FixedWindowLimiter::new(u32::MAX, Duration::from_secs(900));
        b.iter(|| limiter.check(black_box("203.0.113.9")));
    });

    group.bench_function("many_clients", |b| {
        let limiter = FixedWindowLimiter::new(u32::MAX, Duration::from_secs(900));
        let clients: Vec<String> = (0..1024).map(|i| format!("10.0.{}.{}", i / 256, i % 256)).collect();
        let mut next = 0;
        b.iter(|| {
            next = (next + 1) % clients.len();
            limiter.check(black_box(&clients[next]))
        });
    });

    group.finish();
}

criterion_group!(benches, bench_route_resolution, bench_rate_limit_check);
criterion_main!(benches);
