//! Benchmarks for fixture pool operations using criterion.
//!
//! - Uncontended acquire and release
//! - Contended acquire across producer tasks
//! - Dispatch of zero-duration jobs followed by a full drain

#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use jig::{Dispatcher, FixturePool, FixturePoolBuilder, Job, PoolConfig, TimedWorkload};
use jig_testkit::EventRecorder;
use tokio::runtime::Runtime;

/// Creates a tokio runtime for async benchmarks.
fn create_runtime() -> Runtime {
    Runtime::new().expect("Failed to create tokio runtime")
}

fn build_pool(rt: &Runtime, config: PoolConfig) -> Arc<FixturePool> {
    // Fixture workers are spawned at construction and need a runtime.
    let _guard = rt.enter();
    Arc::new(
        FixturePoolBuilder::new(config)
            .with_workload(Arc::new(TimedWorkload))
            .with_events(Arc::new(EventRecorder::new()))
            .build()
            .expect("build pool"),
    )
}

/// Benchmark: acquire a fixture and hand it straight back.
fn bench_acquire_release(c: &mut Criterion) {
    let rt = create_runtime();

    let mut group = c.benchmark_group("acquire_release");
    group.sample_size(100);
    group.measurement_time(Duration::from_secs(10));

    for capacity in [1u32, 96] {
        let pool = build_pool(&rt, PoolConfig::with_capacity(capacity));
        group.bench_with_input(
            BenchmarkId::new("uncontended", capacity),
            &pool,
            |b, pool| {
                b.to_async(&rt).iter(|| async {
                    pool.acquire().await.expect("acquire").release();
                });
            },
        );
    }

    group.finish();
}

/// Benchmark: several producers competing for a small pool.
fn bench_contended_acquire(c: &mut Criterion) {
    let rt = create_runtime();
    let producers = 8usize;
    let rounds = 100usize;

    let mut group = c.benchmark_group("contended_acquire");
    group.sample_size(30);
    group.throughput(Throughput::Elements((producers * rounds) as u64));

    for capacity in [2u32, 4] {
        let pool = build_pool(&rt, PoolConfig::with_capacity(capacity));
        group.bench_with_input(BenchmarkId::new("producers_8", capacity), &pool, |b, pool| {
            b.to_async(&rt).iter(|| async {
                let handles: Vec<_> = (0..producers)
                    .map(|_| {
                        let pool = Arc::clone(pool);
                        tokio::spawn(async move {
                            for _ in 0..rounds {
                                let lease = pool.acquire().await.expect("acquire");
                                tokio::task::yield_now().await;
                                lease.release();
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.await.expect("producer task");
                }
            });
        });
    }

    group.finish();
}

/// Benchmark: dispatch a batch of zero-duration jobs and drain the pool.
fn bench_dispatch_and_drain(c: &mut Criterion) {
    let rt = create_runtime();

    let mut group = c.benchmark_group("dispatch_and_drain");
    group.sample_size(30);
    group.measurement_time(Duration::from_secs(15));

    for batch_size in [96u64, 500] {
        group.throughput(Throughput::Elements(batch_size));
        group.bench_with_input(
            BenchmarkId::new("default_layout", batch_size),
            &batch_size,
            |b, &size| {
                b.to_async(&rt).iter(|| async move {
                    let pool = Arc::new(
                        FixturePoolBuilder::new(PoolConfig::default())
                            .with_events(Arc::new(EventRecorder::new()))
                            .build()
                            .expect("build pool"),
                    );
                    let mut dispatcher = Dispatcher::new(Arc::clone(&pool));
                    for id in 1..=size {
                        dispatcher
                            .submit(Job::new(id, Duration::ZERO))
                            .await
                            .expect("submit");
                    }
                    pool.shutdown().await.expect("drain");
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_acquire_release,
    bench_contended_acquire,
    bench_dispatch_and_drain
);
criterion_main!(benches);
