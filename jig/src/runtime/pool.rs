use std::collections::VecDeque;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, OnceCell, Semaphore};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::events::{EventPublisher, FixtureEvent};
use crate::fixture::{Fixture, FixtureId, FixtureState, FixtureWorker};
use crate::job::Job;
use crate::telemetry;
use crate::workload::{panic_message, WorkOutcome, Workload};

/// Lifecycle of the pool as a whole.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum PoolPhase {
    /// Accepting `acquire` and `release`.
    Running,
    /// Shutdown requested; in-flight jobs are finishing, nothing new is admitted.
    Draining,
    /// Terminal: every fixture is stopped.
    Stopped,
}

/// Point-in-time view of fixture occupancy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub capacity: usize,
    pub idle: usize,
    pub busy: usize,
    pub stopped: usize,
    pub phase: PoolPhase,
    /// Jobs that finished successfully.
    pub completed: u64,
    /// Jobs whose workload failed or panicked.
    pub failed: u64,
}

/// State shared between the pool handle, leases and fixture workers.
pub(crate) struct PoolShared {
    config: PoolConfig,
    state: Mutex<PoolState>,
    /// One permit per fixture in the idle set.
    permits: Semaphore,
    phase: watch::Sender<PoolPhase>,
}

struct PoolState {
    phase: PoolPhase,
    fixtures: Vec<Fixture>,
    idle: VecDeque<FixtureId>,
    completed: u64,
    failed: u64,
}

impl PoolState {
    fn count(&self, state: FixtureState) -> usize {
        self.fixtures.iter().filter(|f| f.state() == state).count()
    }

    fn all_stopped(&self) -> bool {
        self.fixtures
            .iter()
            .all(|f| f.state() == FixtureState::Stopped)
    }

    fn fixture_mut(&mut self, id: FixtureId) -> &mut Fixture {
        let capacity = self.fixtures.len();
        match self.fixtures.get_mut(id.index()) {
            Some(fixture) => fixture,
            None => panic!(
                "invalid release: fixture {id} does not belong to a pool of {capacity}"
            ),
        }
    }
}

impl PoolShared {
    fn snapshot(&self) -> PoolSnapshot {
        let state = self.state.lock();
        PoolSnapshot {
            capacity: state.fixtures.len(),
            idle: state.count(FixtureState::Idle),
            busy: state.count(FixtureState::Busy),
            stopped: state.count(FixtureState::Stopped),
            phase: state.phase,
            completed: state.completed,
            failed: state.failed,
        }
    }

    /// Take one idle fixture out of the idle set. Caller holds a permit.
    fn claim(&self) -> Result<FixtureId, PoolError> {
        let mut state = self.state.lock();
        if state.phase != PoolPhase::Running {
            return Err(PoolError::PoolClosed);
        }
        let Some(id) = state.idle.pop_front() else {
            unreachable!("idle permit granted with an empty idle set");
        };
        state.fixture_mut(id).claim();
        telemetry::set_pool_utilization(state.idle.len(), state.count(FixtureState::Busy));
        Ok(id)
    }

    /// Hand `job` to a claimed fixture.
    fn assign(&self, id: FixtureId, job: Job) -> Result<(), PoolError> {
        let mut state = self.state.lock();
        if state.phase != PoolPhase::Running {
            return Err(PoolError::PoolClosed);
        }
        match state.fixture_mut(id).assign(job) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                unreachable!("fixture {id} was handed a second job")
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::error!(fixture = %id, "fixture worker is gone, retiring fixture");
                state.fixture_mut(id).retire();
                self.settle(&mut state);
                Err(PoolError::FixtureUnavailable(id))
            }
        }
    }

    /// Return a busy fixture to the idle set, or stop it when draining.
    ///
    /// Jobs release their fixture through [`complete`](Self::complete);
    /// this path is for fixtures that were claimed but never given a job.
    ///
    /// # Panics
    ///
    /// If `id` is not a busy fixture of this pool, or is running a job.
    pub(crate) fn release(&self, id: FixtureId) -> FixtureState {
        let mut state = self.state.lock();
        if state.fixture_mut(id).is_running() {
            panic!("invalid release: fixture {id} is still running a job");
        }
        self.release_locked(&mut state, id)
    }

    /// Record the outcome of a job, then release its fixture.
    pub(crate) fn complete(&self, id: FixtureId, outcome: &WorkOutcome) -> FixtureState {
        let mut state = self.state.lock();
        state.fixture_mut(id).end_job();
        if outcome.is_success() {
            state.completed += 1;
        } else {
            state.failed += 1;
        }
        self.release_locked(&mut state, id)
    }

    fn release_locked(&self, state: &mut PoolState, id: FixtureId) -> FixtureState {
        let draining = state.phase != PoolPhase::Running;
        let next = state.fixture_mut(id).finish(draining);
        match next {
            FixtureState::Idle => {
                state.idle.push_back(id);
                self.permits.add_permits(1);
            }
            _ => self.settle(state),
        }
        telemetry::set_pool_utilization(state.idle.len(), state.count(FixtureState::Busy));
        next
    }

    /// Enter `Stopped` once the last fixture has stopped.
    fn settle(&self, state: &mut PoolState) {
        if state.phase != PoolPhase::Stopped && state.all_stopped() {
            state.phase = PoolPhase::Stopped;
            self.phase.send_replace(PoolPhase::Stopped);
        }
    }

    /// Move from `Running` to `Draining`. Returns the busy count, or `None`
    /// if shutdown had already begun.
    fn begin_drain(&self) -> Option<usize> {
        let mut state = self.state.lock();
        if state.phase != PoolPhase::Running {
            return None;
        }
        state.phase = PoolPhase::Draining;
        self.permits.close();
        state.idle.clear();
        for fixture in state.fixtures.iter_mut() {
            fixture.stop();
        }
        let busy = state.count(FixtureState::Busy);
        self.phase.send_replace(PoolPhase::Draining);
        self.settle(&mut state);
        Some(busy)
    }
}

/// Fixed set of fixtures with blocking admission.
///
/// Each fixture owns a worker task spawned at construction. [`acquire`]
/// hands out an idle fixture (waiting while all are busy), the returned
/// [`FixtureLease`] binds one job to it, and the fixture returns itself to
/// the idle set when the job ends. [`shutdown`] stops admission, lets
/// in-flight jobs finish, and waits for every fixture to stop.
///
/// [`acquire`]: FixturePool::acquire
/// [`shutdown`]: FixturePool::shutdown
pub struct FixturePool {
    shared: Arc<PoolShared>,
    events: Arc<dyn EventPublisher>,
    workers: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    /// Set once the workers are joined and `PoolStopped` is published.
    finished: OnceCell<()>,
}

impl fmt::Debug for FixturePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let worker_count = self
            .workers
            .try_lock()
            .map(|handles| handles.len())
            .unwrap_or_default();

        f.debug_struct("FixturePool")
            .field("config", &self.shared.config)
            .field("snapshot", &self.shared.snapshot())
            .field("worker_count", &worker_count)
            .finish()
    }
}

impl FixturePool {
    /// Create the pool and spawn one worker task per fixture.
    ///
    /// # Panics
    ///
    /// When called outside a tokio runtime.
    pub fn new(
        config: PoolConfig,
        workload: Arc<dyn Workload>,
        events: Arc<dyn EventPublisher>,
    ) -> Result<Self, PoolError> {
        config.validate()?;
        let capacity = config.capacity();

        let mut fixtures = Vec::with_capacity(capacity);
        let mut receivers = Vec::with_capacity(capacity);
        for index in 0..capacity {
            // Capacity 1: a fixture holds at most one job.
            let (tx, rx) = mpsc::channel(1);
            let id = FixtureId(index as u32);
            fixtures.push(Fixture::new(id, tx));
            receivers.push((id, rx));
        }
        let idle = fixtures.iter().map(Fixture::id).collect();

        let (phase, _) = watch::channel(PoolPhase::Running);
        let shared = Arc::new(PoolShared {
            config,
            state: Mutex::new(PoolState {
                phase: PoolPhase::Running,
                fixtures,
                idle,
                completed: 0,
                failed: 0,
            }),
            permits: Semaphore::new(capacity),
            phase,
        });

        let workers = receivers
            .into_iter()
            .map(|(id, rx)| {
                let worker = FixtureWorker::new(
                    id,
                    rx,
                    Arc::clone(&workload),
                    Arc::clone(&events),
                    Arc::clone(&shared),
                );
                tokio::spawn(worker.run())
            })
            .collect();

        tracing::info!(
            capacity,
            trays = shared.config.trays,
            fixtures_per_tray = shared.config.fixtures_per_tray,
            "fixture pool started"
        );

        Ok(Self {
            shared,
            events,
            workers: tokio::sync::Mutex::new(workers),
            finished: OnceCell::new(),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    pub fn capacity(&self) -> usize {
        self.shared.config.capacity()
    }

    pub fn phase(&self) -> PoolPhase {
        *self.shared.phase.borrow()
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        self.shared.snapshot()
    }

    /// Wait for an idle fixture and claim it.
    ///
    /// Waiters are not promised any particular order. Fails with
    /// [`PoolError::PoolClosed`] once shutdown has begun (including for
    /// callers already waiting), and with [`PoolError::AcquireTimeout`] when
    /// an acquire timeout is configured and expires.
    pub async fn acquire(&self) -> Result<FixtureLease, PoolError> {
        let started = std::time::Instant::now();
        let span = telemetry::acquire_span(self.capacity());
        let acquired = match self.shared.config.acquire_timeout() {
            Some(limit) => tokio::time::timeout(limit, self.shared.permits.acquire())
                .instrument(span)
                .await
                .map_err(|_| PoolError::AcquireTimeout(limit))?,
            None => self.shared.permits.acquire().instrument(span).await,
        };
        let permit = acquired.map_err(|_| PoolError::PoolClosed)?;
        // The permit stands for the fixture taken below; `release` adds it back.
        permit.forget();

        let id = self.shared.claim()?;
        telemetry::observe_acquire_wait(started.elapsed().as_secs_f64());
        tracing::trace!(fixture = %id, "fixture acquired");

        Ok(FixtureLease {
            id,
            shared: Arc::clone(&self.shared),
            settled: false,
        })
    }

    /// Return a fixture previously handed out by [`acquire`](Self::acquire).
    ///
    /// Fixtures running a job release themselves; this is for callers that
    /// track fixture ids directly. During shutdown the fixture is stopped
    /// instead of re-entering the idle set.
    ///
    /// # Panics
    ///
    /// If `id` is not currently busy in this pool, or if it has been given
    /// a job with [`FixtureLease::run`]; such a fixture releases itself
    /// when the job ends.
    pub fn release(&self, id: FixtureId) -> FixtureState {
        self.shared.release(id)
    }

    /// Stop admitting work and wait for every fixture to stop.
    ///
    /// Idle fixtures stop immediately; busy fixtures finish their current
    /// job first. Every caller waiting in `acquire` fails with
    /// [`PoolError::PoolClosed`]. Calling this again, concurrently or
    /// later, waits for the same terminal state.
    pub async fn shutdown(&self) -> Result<(), PoolError> {
        async {
            if let Some(busy) = self.shared.begin_drain() {
                tracing::info!(busy, "fixture pool draining");
                self.announce(FixtureEvent::pool_draining(busy)).await;
            }
            self.await_shutdown().await
        }
        .instrument(telemetry::shutdown_span(self.capacity()))
        .await
    }

    /// Wait until the pool reaches [`PoolPhase::Stopped`] without initiating
    /// shutdown.
    pub async fn await_shutdown(&self) -> Result<(), PoolError> {
        let mut phase = self.shared.phase.subscribe();
        let stopped = async move {
            phase
                .wait_for(|phase| *phase == PoolPhase::Stopped)
                .await
                .map(|_| ())
        };

        let result = match self.shared.config.drain_timeout() {
            Some(limit) => match tokio::time::timeout(limit, stopped).await {
                Ok(result) => result,
                Err(_) => {
                    let busy = self.snapshot().busy;
                    tracing::warn!(busy, "fixture pool drain timed out");
                    return Err(PoolError::DrainTimeout {
                        busy,
                        waited: limit,
                    });
                }
            },
            None => stopped.await,
        };
        // The sender lives in `shared`, which we hold.
        result.map_err(|_| PoolError::PoolClosed)?;

        // Concurrent callers all wait here until the first one has joined
        // the workers and announced the stop.
        self.finished
            .get_or_init(|| async {
                self.join_workers().await;
                let snapshot = self.snapshot();
                tracing::info!(
                    completed = snapshot.completed,
                    failed = snapshot.failed,
                    "fixture pool stopped"
                );
                self.announce(FixtureEvent::pool_stopped(
                    snapshot.completed,
                    snapshot.failed,
                ))
                .await;
            })
            .await;
        Ok(())
    }

    async fn join_workers(&self) {
        let handles = {
            let mut guard = self.workers.lock().await;
            std::mem::take(&mut *guard)
        };

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!("fixture worker task failed: {:?}", e);
            }
        }
    }

    async fn announce(&self, event: FixtureEvent) {
        match AssertUnwindSafe(self.events.publish(event)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!("publish pool event failed: {err}"),
            Err(payload) => tracing::warn!(
                "event publisher panicked: {}",
                panic_message(payload.as_ref())
            ),
        }
    }
}

impl Drop for FixturePool {
    fn drop(&mut self) {
        // Workers hold the shared state; closing the channels lets them exit.
        if self.shared.begin_drain().is_some() {
            tracing::debug!("fixture pool dropped while running, draining");
        }
    }
}

/// A claimed fixture, not yet bound to a job.
///
/// Consumed by [`run`](Self::run) or [`release`](Self::release). Dropping
/// an unused lease releases the fixture.
#[must_use = "an acquired fixture stays busy until it is run or released"]
pub struct FixtureLease {
    id: FixtureId,
    shared: Arc<PoolShared>,
    settled: bool,
}

impl fmt::Debug for FixtureLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureLease")
            .field("id", &self.id)
            .field("settled", &self.settled)
            .finish()
    }
}

impl FixtureLease {
    pub fn id(&self) -> FixtureId {
        self.id
    }

    /// Bind `job` to the fixture. The job runs on the fixture's own task;
    /// this returns as soon as the handoff is done.
    ///
    /// Fails with [`PoolError::PoolClosed`] if shutdown began after the
    /// fixture was acquired; the job is not run and the fixture stops.
    pub fn run(mut self, job: Job) -> Result<(), PoolError> {
        let job_id = job.id();
        match self.shared.assign(self.id, job) {
            Ok(()) => {
                self.settled = true;
                tracing::debug!(fixture = %self.id, job = %job_id, "job assigned");
                Ok(())
            }
            Err(PoolError::FixtureUnavailable(id)) => {
                // Already retired under the lock.
                self.settled = true;
                Err(PoolError::FixtureUnavailable(id))
            }
            // Drop releases the fixture, which stops it while draining.
            Err(err) => Err(err),
        }
    }

    /// Disarm the lease and keep the fixture busy; the caller becomes
    /// responsible for [`FixturePool::release`].
    pub fn detach(mut self) -> FixtureId {
        self.settled = true;
        self.id
    }

    /// Give the fixture back without running anything on it.
    pub fn release(mut self) -> FixtureState {
        self.settled = true;
        self.shared.release(self.id)
    }
}

impl Drop for FixtureLease {
    fn drop(&mut self) {
        if !self.settled {
            self.shared.release(self.id);
        }
    }
}
