//! Prometheus metrics instrumentation for jig.
//!
//! All metrics are conditionally compiled behind the `metrics` feature flag.
//!
//! # Metrics
//!
//! ## Counters
//! - `jig_jobs_started_total` - Jobs handed to a fixture
//! - `jig_jobs_finished_total` - Jobs finished, labelled by `status`
//!
//! ## Gauges
//! - `jig_fixtures_busy` - Fixtures currently running or holding a job
//! - `jig_fixtures_idle` - Fixtures in the idle set
//!
//! ## Histograms
//! - `jig_job_duration_seconds` - Job execution time
//! - `jig_acquire_wait_seconds` - Time spent waiting for an idle fixture
#![cfg(feature = "metrics")]

use prometheus::{
    exponential_buckets, Counter, CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry,
};
use std::sync::LazyLock;

/// Global Prometheus registry for jig metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static JOBS_STARTED_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    Counter::new("jig_jobs_started_total", "Total number of jobs started on a fixture")
        .expect("jig_jobs_started_total metric creation failed")
});

/// Labels:
/// - `status`: success or failed
pub static JOBS_FINISHED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new("jig_jobs_finished_total", "Total number of jobs finished");
    CounterVec::new(opts, &["status"]).expect("jig_jobs_finished_total metric creation failed")
});

pub static FIXTURES_BUSY: LazyLock<Gauge> = LazyLock::new(|| {
    Gauge::new("jig_fixtures_busy", "Fixtures currently busy")
        .expect("jig_fixtures_busy metric creation failed")
});

pub static FIXTURES_IDLE: LazyLock<Gauge> = LazyLock::new(|| {
    Gauge::new("jig_fixtures_idle", "Fixtures currently idle")
        .expect("jig_fixtures_idle metric creation failed")
});

pub static JOB_DURATION_SECONDS: LazyLock<Histogram> = LazyLock::new(|| {
    let buckets = exponential_buckets(0.001, 2.0, 15).expect("bucket creation failed");
    let opts = HistogramOpts::new("jig_job_duration_seconds", "Job execution duration in seconds")
        .buckets(buckets);
    Histogram::with_opts(opts).expect("jig_job_duration_seconds metric creation failed")
});

pub static ACQUIRE_WAIT_SECONDS: LazyLock<Histogram> = LazyLock::new(|| {
    let buckets = exponential_buckets(0.0001, 4.0, 12).expect("bucket creation failed");
    let opts = HistogramOpts::new(
        "jig_acquire_wait_seconds",
        "Time spent waiting for an idle fixture",
    )
    .buckets(buckets);
    Histogram::with_opts(opts).expect("jig_acquire_wait_seconds metric creation failed")
});

/// Register all metrics with the global registry.
///
/// Idempotent: duplicate registrations are ignored.
pub fn init_metrics() -> anyhow::Result<()> {
    let registry = &*REGISTRY;

    for metric in [
        Box::new(JOBS_STARTED_TOTAL.clone()) as Box<dyn prometheus::core::Collector>,
        Box::new(JOBS_FINISHED_TOTAL.clone()),
        Box::new(FIXTURES_BUSY.clone()),
        Box::new(FIXTURES_IDLE.clone()),
        Box::new(JOB_DURATION_SECONDS.clone()),
        Box::new(ACQUIRE_WAIT_SECONDS.clone()),
    ] {
        if let Err(e) = registry.register(metric) {
            let msg = e.to_string();
            if !msg.contains("Duplicate metrics collector registration attempted") {
                return Err(e.into());
            }
        }
    }

    Ok(())
}

pub fn record_job_started() {
    JOBS_STARTED_TOTAL.inc();
}

pub fn record_job_finished(status: &str, duration_secs: f64) {
    JOBS_FINISHED_TOTAL.with_label_values(&[status]).inc();
    JOB_DURATION_SECONDS.observe(duration_secs);
}

pub fn observe_acquire_wait(wait_secs: f64) {
    ACQUIRE_WAIT_SECONDS.observe(wait_secs);
}

pub fn set_pool_utilization(idle: f64, busy: f64) {
    FIXTURES_IDLE.set(idle);
    FIXTURES_BUSY.set(busy);
}

/// Gather all registered metrics in Prometheus text format.
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode_to_string(&metric_families)
        .map_err(Into::into)
}
