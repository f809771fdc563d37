//! Tracing and telemetry instrumentation for jig.
//!
//! Span constructors and recording helpers used along the fixture
//! lifecycle. Every helper logs through `tracing`; with the `metrics`
//! feature enabled it also updates the Prometheus collectors in
//! [`crate::metrics`].

use std::time::Instant;

use tracing::{info_span, Span};

use crate::fixture::FixtureId;
use crate::job::JobId;
use crate::workload::WorkOutcome;

/// Span covering a wait in `acquire`.
#[must_use]
pub fn acquire_span(capacity: usize) -> Span {
    info_span!("jig.acquire", capacity = capacity)
}

/// Span covering one job on one fixture.
#[must_use]
pub fn fixture_run_span(fixture_id: FixtureId, job_id: JobId) -> Span {
    info_span!(
        "jig.run",
        fixture_id = %fixture_id,
        job_id = %job_id,
    )
}

/// Span covering pool shutdown and drain.
#[must_use]
pub fn shutdown_span(capacity: usize) -> Span {
    info_span!("jig.shutdown", capacity = capacity)
}

/// Record the start of a job. Pass the handle to [`record_job_finished`].
pub fn record_job_started(fixture_id: FixtureId, job_id: JobId) -> JobTimingHandle {
    tracing::debug!(fixture_id = %fixture_id, job_id = %job_id, "job started");

    #[cfg(feature = "metrics")]
    crate::metrics::record_job_started();

    JobTimingHandle {
        job_id,
        start: Instant::now(),
    }
}

/// Record the end of a job and its duration.
pub fn record_job_finished(
    handle: JobTimingHandle,
    fixture_id: FixtureId,
    outcome: &WorkOutcome,
) {
    let duration_secs = handle.elapsed().as_secs_f64();
    let job_id = handle.job_id();
    match outcome {
        WorkOutcome::Completed => tracing::debug!(
            fixture_id = %fixture_id,
            job_id = %job_id,
            duration_secs,
            "job finished"
        ),
        WorkOutcome::Failed { error } => tracing::warn!(
            fixture_id = %fixture_id,
            job_id = %job_id,
            duration_secs,
            error = %error,
            "job failed"
        ),
    }

    #[cfg(feature = "metrics")]
    crate::metrics::record_job_finished(outcome.status(), duration_secs);
}

/// Observe how long a caller waited in `acquire`.
pub fn observe_acquire_wait(wait_secs: f64) {
    tracing::trace!(wait_secs, "acquire wait observed");

    #[cfg(feature = "metrics")]
    crate::metrics::observe_acquire_wait(wait_secs);
}

/// Update the occupancy gauges.
pub fn set_pool_utilization(idle: usize, busy: usize) {
    tracing::trace!(idle, busy, "pool utilization updated");

    #[cfg(feature = "metrics")]
    crate::metrics::set_pool_utilization(idle as f64, busy as f64);
}

/// Opaque handle returned by [`record_job_started`].
#[derive(Debug)]
pub struct JobTimingHandle {
    job_id: JobId,
    start: Instant,
}

impl JobTimingHandle {
    #[must_use]
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
