use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use jig::*;
use parking_lot::Mutex;
use tokio::time::Instant;

/// One execution observed by [`ScriptedWorkload`].
#[derive(Clone, Debug)]
pub struct RunRecord {
    pub fixture: FixtureId,
    pub job_id: JobId,
    pub started_at: Instant,
    pub finished_at: Instant,
}

#[derive(Default)]
struct Observed {
    runs: Vec<RunRecord>,
    active: HashSet<FixtureId>,
    overlaps: Vec<(FixtureId, JobId)>,
}

/// Workload that sleeps for each job's duration, records what ran where,
/// and fails or panics on chosen jobs.
#[derive(Clone, Default)]
pub struct ScriptedWorkload {
    observed: Arc<Mutex<Observed>>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    failing: Arc<HashSet<JobId>>,
    panicking: Arc<HashSet<JobId>>,
}

impl ScriptedWorkload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a failure for each of `ids` after sleeping.
    pub fn failing_on(mut self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.failing = Arc::new(ids.into_iter().map(JobId).collect());
        self
    }

    /// Panic for each of `ids` after sleeping.
    pub fn panicking_on(mut self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.panicking = Arc::new(ids.into_iter().map(JobId).collect());
        self
    }

    /// Completed executions, in finishing order. Panicked runs are not recorded.
    pub fn runs(&self) -> Vec<RunRecord> {
        self.observed.lock().runs.clone()
    }

    pub fn run_count(&self) -> usize {
        self.observed.lock().runs.len()
    }

    /// Highest number of jobs that were executing at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn assert_peak_at_most(&self, limit: usize) {
        let peak = self.peak_in_flight();
        assert!(peak <= limit, "Expected at most {limit} jobs in flight, saw {peak}");
    }

    /// Fails if any fixture ever started a job while already running one.
    pub fn assert_no_fixture_overlap(&self) {
        let overlaps = self.observed.lock().overlaps.clone();
        assert!(overlaps.is_empty(), "Fixtures ran jobs concurrently: {overlaps:?}");
    }
}

struct RunGuard<'a> {
    workload: &'a ScriptedWorkload,
    fixture: FixtureId,
}

impl<'a> RunGuard<'a> {
    fn enter(workload: &'a ScriptedWorkload, fixture: FixtureId, job_id: JobId) -> Self {
        let now = workload.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        workload.peak.fetch_max(now, Ordering::SeqCst);
        let mut observed = workload.observed.lock();
        if !observed.active.insert(fixture) {
            observed.overlaps.push((fixture, job_id));
        }
        Self { workload, fixture }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.workload.observed.lock().active.remove(&self.fixture);
        self.workload.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Workload for ScriptedWorkload {
    async fn perform(&self, fixture: FixtureId, job: &Job) -> WorkOutcome {
        let started_at = Instant::now();
        let _guard = RunGuard::enter(self, fixture, job.id());

        tokio::time::sleep(job.duration()).await;

        if self.panicking.contains(&job.id()) {
            panic!("fixture {fixture} crashed on product {}", job.id());
        }

        self.observed.lock().runs.push(RunRecord {
            fixture,
            job_id: job.id(),
            started_at,
            finished_at: Instant::now(),
        });

        if self.failing.contains(&job.id()) {
            WorkOutcome::Failed {
                error: format!("product {} rejected", job.id()),
            }
        } else {
            WorkOutcome::Completed
        }
    }
}
