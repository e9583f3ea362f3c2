//! Benchmarks for the circuit breaker hot path
//!
//! This benchmark measures:
//! - Admission + outcome recording while Closed
//! - Rejection cost while Open
//! - Snapshot cost over a full rolling window

use ai_lib_resilience::resilience::{CircuitBreaker, CircuitBreakerConfig};
use ai_lib_resilience::Error;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::time::Duration;
use tokio::runtime::Runtime;

fn config() -> CircuitBreakerConfig {
    CircuitBreakerConfig::new()
        .with_minimum_request_volume(20)
        .with_rolling_window(Duration::from_secs(3600))
        .with_reset_timeout(Duration::from_secs(3600))
}

fn bench_closed_path(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let breaker = CircuitBreaker::new("bench", config());

    let mut group = c.benchmark_group("breaker_closed");
    group.throughput(Throughput::Elements(1));
    group.bench_function("execute_success", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(breaker.execute(|_| async { Ok::<_, Error>(1u32) }).await.unwrap())
        })
    });
    group.finish();
}

fn bench_open_rejection(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let breaker = CircuitBreaker::new("bench", config().with_minimum_request_volume(1));
    rt.block_on(async {
        let _ = breaker
            .execute(|_| async { Err::<(), _>(Error::upstream("bench", 503, "down")) })
            .await;
    });

    let mut group = c.benchmark_group("breaker_open");
    group.throughput(Throughput::Elements(1));
    group.bench_function("execute_rejected", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(breaker.execute(|_| async { Ok::<_, Error>(()) }).await.is_err())
        })
    });
    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let breaker = CircuitBreaker::new("bench", config().with_minimum_request_volume(u32::MAX));
    rt.block_on(async {
        for i in 0..10_000u32 {
            let _ = breaker
                .execute(|_| async move {
                    if i % 7 == 0 {
                        Err(Error::upstream("bench", 500, "x"))
                    } else {
                        Ok(())
                    }
                })
                .await;
        }
    });

    c.bench_function("breaker_snapshot_10k_window", |b| {
        b.iter(|| black_box(breaker.snapshot()))
    });
}

criterion_group!(benches, bench_closed_path, bench_open_rejection, bench_snapshot);
criterion_main!(benches);
