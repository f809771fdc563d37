use std::fmt::Display;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::Instrument;
use uuid::Uuid;

use crate::events::{EventPublisher, FixtureEvent};
use crate::job::Job;
use crate::runtime::pool::PoolShared;
use crate::telemetry;
use crate::workload::{panic_message, WorkOutcome, Workload};

/// Position of a fixture in the pool, stable for the pool's lifetime.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub struct FixtureId(pub u32);

impl FixtureId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Tray holding this fixture, for a layout of `per_tray` fixtures per tray.
    pub fn tray(self, per_tray: u32) -> u32 {
        self.0 / per_tray.max(1)
    }

    /// Slot within the tray.
    pub fn slot(self, per_tray: u32) -> u32 {
        self.0 % per_tray.max(1)
    }
}

impl Display for FixtureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum FixtureState {
    Idle,
    Busy,
    Stopped,
}

impl FixtureState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FixtureState::Idle => "idle",
            FixtureState::Busy => "busy",
            FixtureState::Stopped => "stopped",
        }
    }
}

impl Display for FixtureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pool-side record of one fixture: its state and the handoff channel to
/// its worker task. Only ever touched under the pool lock.
#[derive(Debug)]
pub(crate) struct Fixture {
    id: FixtureId,
    state: FixtureState,
    jobs: Option<mpsc::Sender<Job>>,
    /// A job has been handed to the worker and not yet completed.
    running: bool,
}

impl Fixture {
    pub(crate) fn new(id: FixtureId, jobs: mpsc::Sender<Job>) -> Self {
        Self {
            id,
            state: FixtureState::Idle,
            jobs: Some(jobs),
            running: false,
        }
    }

    pub(crate) fn id(&self) -> FixtureId {
        self.id
    }

    pub(crate) fn state(&self) -> FixtureState {
        self.state
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running
    }

    /// Idle -> Busy.
    ///
    /// # Panics
    ///
    /// If the fixture is not idle; the idle set handed out a fixture it
    /// does not own.
    pub(crate) fn claim(&mut self) {
        assert_eq!(
            self.state,
            FixtureState::Idle,
            "fixture {} handed out while {}",
            self.id,
            self.state
        );
        self.state = FixtureState::Busy;
    }

    /// Hand `job` to the worker. The fixture must already be claimed.
    pub(crate) fn assign(
        &mut self,
        job: Job,
    ) -> Result<(), mpsc::error::TrySendError<Job>> {
        debug_assert_eq!(self.state, FixtureState::Busy);
        match &self.jobs {
            Some(jobs) => jobs.try_send(job)?,
            None => return Err(mpsc::error::TrySendError::Closed(job)),
        }
        self.running = true;
        Ok(())
    }

    /// The worker reported the end of the assigned job.
    pub(crate) fn end_job(&mut self) {
        assert!(
            self.running,
            "fixture {} completed a job it was never given",
            self.id
        );
        self.running = false;
    }

    /// Busy -> Idle, or Busy -> Stopped once a stop has been requested.
    ///
    /// # Panics
    ///
    /// If the fixture is not busy (invalid release).
    pub(crate) fn finish(&mut self, stop_requested: bool) -> FixtureState {
        if self.state != FixtureState::Busy {
            panic!(
                "invalid release: fixture {} is {}, not busy",
                self.id, self.state
            );
        }
        self.state = if stop_requested {
            FixtureState::Stopped
        } else {
            FixtureState::Idle
        };
        self.state
    }

    /// Refuse further jobs. An idle fixture stops at once; a busy one
    /// stops when its current job is released.
    pub(crate) fn stop(&mut self) -> FixtureState {
        self.jobs = None;
        if self.state == FixtureState::Idle {
            self.state = FixtureState::Stopped;
        }
        self.state
    }

    /// Stop a fixture whose worker is gone, whatever its state.
    pub(crate) fn retire(&mut self) {
        self.jobs = None;
        self.running = false;
        self.state = FixtureState::Stopped;
    }
}

/// Task body for one fixture: receive a job, run it, report back.
///
/// The loop ends once the pool drops the sending half, which happens at
/// shutdown; a job already received is always finished first.
pub(crate) struct FixtureWorker {
    id: FixtureId,
    jobs: mpsc::Receiver<Job>,
    workload: Arc<dyn Workload>,
    events: Arc<dyn EventPublisher>,
    pool: Arc<PoolShared>,
}

impl FixtureWorker {
    pub(crate) fn new(
        id: FixtureId,
        jobs: mpsc::Receiver<Job>,
        workload: Arc<dyn Workload>,
        events: Arc<dyn EventPublisher>,
        pool: Arc<PoolShared>,
    ) -> Self {
        Self {
            id,
            jobs,
            workload,
            events,
            pool,
        }
    }

    pub(crate) async fn run(mut self) {
        while let Some(job) = self.jobs.recv().await {
            let span = telemetry::fixture_run_span(self.id, job.id());
            let outcome = self.execute(&job).instrument(span).await;

            if self.pool.complete(self.id, &outcome) == FixtureState::Stopped {
                tracing::debug!(fixture = %self.id, "fixture stopped after final job");
            }
        }
        tracing::trace!(fixture = %self.id, "fixture worker exiting");
    }

    async fn execute(&self, job: &Job) -> WorkOutcome {
        let correlation_id = Uuid::now_v7();
        self.notify(FixtureEvent::job_started(self.id, job, correlation_id))
            .await;

        let timing = telemetry::record_job_started(self.id, job.id());
        let outcome = AssertUnwindSafe(self.workload.perform(self.id, job))
            .catch_unwind()
            .await
            .unwrap_or_else(WorkOutcome::from_panic);
        telemetry::record_job_finished(timing, self.id, &outcome);

        self.notify(FixtureEvent::job_finished(
            self.id,
            job.id(),
            outcome.clone(),
            correlation_id,
        ))
        .await;
        outcome
    }

    async fn notify(&self, event: FixtureEvent) {
        match AssertUnwindSafe(self.events.publish(event)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(fixture = %self.id, "publish fixture event failed: {err}");
            }
            Err(payload) => tracing::warn!(
                fixture = %self.id,
                "event publisher panicked: {}",
                panic_message(payload.as_ref())
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fixture(id: u32) -> (Fixture, mpsc::Receiver<Job>) {
        let (tx, rx) = mpsc::channel(1);
        (Fixture::new(FixtureId(id), tx), rx)
    }

    #[test]
    fn test_tray_and_slot_for_reference_layout() {
        assert_eq!(FixtureId(0).tray(12), 0);
        assert_eq!(FixtureId(11).slot(12), 11);
        assert_eq!(FixtureId(12).tray(12), 1);
        assert_eq!(FixtureId(12).slot(12), 0);
        assert_eq!(FixtureId(95).tray(12), 7);
        assert_eq!(FixtureId(3).to_string(), "03");
    }

    #[test]
    fn test_claim_assign_finish_cycle() {
        let (mut f, mut rx) = fixture(1);
        assert_eq!(f.state(), FixtureState::Idle);

        f.claim();
        assert_eq!(f.state(), FixtureState::Busy);
        f.assign(Job::new(9, Duration::ZERO)).expect("assign");
        assert!(f.is_running());
        assert_eq!(rx.try_recv().expect("job handed over").id().0, 9);

        f.end_job();
        assert!(!f.is_running());
        assert_eq!(f.finish(false), FixtureState::Idle);
    }

    #[test]
    fn test_stop_idle_fixture_is_immediate() {
        let (mut f, mut rx) = fixture(2);
        assert_eq!(f.stop(), FixtureState::Stopped);
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_stop_busy_fixture_is_deferred() {
        let (mut f, _rx) = fixture(3);
        f.claim();
        assert_eq!(f.stop(), FixtureState::Busy);
        assert!(matches!(
            f.assign(Job::new(1, Duration::ZERO)),
            Err(mpsc::error::TrySendError::Closed(_))
        ));
        assert!(!f.is_running());
        assert_eq!(f.finish(true), FixtureState::Stopped);
    }

    #[test]
    #[should_panic(expected = "invalid release")]
    fn test_finish_idle_fixture_panics() {
        let (mut f, _rx) = fixture(4);
        f.finish(false);
    }

    #[test]
    #[should_panic(expected = "invalid release")]
    fn test_double_finish_panics() {
        let (mut f, _rx) = fixture(5);
        f.claim();
        f.finish(false);
        f.finish(false);
    }

    #[test]
    #[should_panic(expected = "never given")]
    fn test_end_job_without_assignment_panics() {
        let (mut f, _rx) = fixture(7);
        f.claim();
        f.end_job();
    }

    #[test]
    fn test_retire_stops_busy_fixture() {
        let (mut f, _rx) = fixture(6);
        f.claim();
        f.retire();
        assert_eq!(f.state(), FixtureState::Stopped);
    }
}
