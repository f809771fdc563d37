use std::pin::pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use super::pool::FixturePool;
use super::shutdown::ShutdownToken;
use crate::error::PoolError;
use crate::fixture::FixtureId;
use crate::job::Job;

/// Counters reported when a dispatch loop ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSummary {
    /// Jobs handed to a fixture.
    pub submitted: u64,
    /// Jobs that could not be placed.
    pub rejected: u64,
}

/// Bridges a producer to the pool.
///
/// The dispatcher owns no queue: `submit` waits in `acquire` while the pool
/// is saturated, which is what slows the producer down. `submit` takes
/// `&mut self`, so a dispatcher never has two acquires in flight.
#[derive(Debug)]
pub struct Dispatcher {
    pool: Arc<FixturePool>,
    summary: DispatchSummary,
}

impl Dispatcher {
    pub fn new(pool: Arc<FixturePool>) -> Self {
        Self {
            pool,
            summary: DispatchSummary::default(),
        }
    }

    pub fn pool(&self) -> Arc<FixturePool> {
        Arc::clone(&self.pool)
    }

    pub fn summary(&self) -> DispatchSummary {
        self.summary
    }

    /// Place `job` on an idle fixture, waiting for one if necessary.
    ///
    /// Returns once the job is handed over; the job itself runs on the
    /// fixture's task. Fails fast with [`PoolError::PoolClosed`] once the
    /// pool is shutting down.
    pub async fn submit(&mut self, job: Job) -> Result<FixtureId, PoolError> {
        let result = self.place(job).await;
        match &result {
            Ok(_) => self.summary.submitted += 1,
            Err(_) => self.summary.rejected += 1,
        }
        result
    }

    async fn place(&self, job: Job) -> Result<FixtureId, PoolError> {
        let lease = self.pool.acquire().await?;
        let fixture_id = lease.id();
        lease.run(job)?;
        Ok(fixture_id)
    }

    /// Pull jobs from `source` and submit them one at a time.
    ///
    /// Stops when the source ends, when `stop` is cancelled (including
    /// while waiting for a fixture), or when the pool closes. Jobs that
    /// time out waiting for a fixture are dropped and counted as rejected.
    pub async fn run<S>(&mut self, source: S, stop: &ShutdownToken) -> DispatchSummary
    where
        S: Stream<Item = Job>,
    {
        let mut source = pin!(source);
        loop {
            let job = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                next = source.next() => match next {
                    Some(job) => job,
                    None => {
                        tracing::info!("job source exhausted");
                        break;
                    }
                },
            };

            let job_id = job.id();
            let placed = tokio::select! {
                biased;
                _ = stop.cancelled() => {
                    self.summary.rejected += 1;
                    tracing::debug!(job = %job_id, "stop requested while waiting for a fixture");
                    break;
                }
                placed = self.submit(job) => placed,
            };

            match placed {
                Ok(fixture_id) => {
                    tracing::trace!(job = %job_id, fixture = %fixture_id, "job dispatched");
                }
                Err(PoolError::PoolClosed) => {
                    tracing::info!(job = %job_id, "fixture pool closed, dispatcher stopping");
                    break;
                }
                Err(err) => {
                    tracing::warn!(job = %job_id, "job not dispatched: {err}");
                }
            }
        }

        tracing::info!(
            submitted = self.summary.submitted,
            rejected = self.summary.rejected,
            "dispatcher stopped"
        );
        self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::time::timeout;

    use crate::config::PoolConfig;
    use crate::events::InProcEventBus;
    use crate::workload::TimedWorkload;

    fn build_pool(capacity: u32) -> Arc<FixturePool> {
        Arc::new(
            FixturePool::new(
                PoolConfig::with_capacity(capacity),
                Arc::new(TimedWorkload),
                Arc::new(InProcEventBus::new(64)),
            )
            .expect("build pool"),
        )
    }

    fn jobs(durations_ms: &[u64]) -> Vec<Job> {
        durations_ms
            .iter()
            .enumerate()
            .map(|(i, ms)| Job::new(i as u64 + 1, Duration::from_millis(*ms)))
            .collect()
    }

    #[tokio::test]
    async fn test_submit_counts_placements() {
        let pool = build_pool(2);
        let mut dispatcher = Dispatcher::new(Arc::clone(&pool));

        for job in jobs(&[0, 0]) {
            dispatcher.submit(job).await.unwrap();
        }
        assert_eq!(
            dispatcher.summary(),
            DispatchSummary {
                submitted: 2,
                rejected: 0
            }
        );
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails_fast() {
        let pool = build_pool(1);
        pool.shutdown().await.unwrap();

        let mut dispatcher = Dispatcher::new(pool);
        let err = timeout(Duration::from_secs(1), dispatcher.submit(Job::new(1, Duration::ZERO)))
            .await
            .expect("submit must not block on a closed pool")
            .unwrap_err();
        assert!(err.is_closed());
        assert_eq!(dispatcher.summary().rejected, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_drains_finite_source() {
        let pool = build_pool(2);
        let mut dispatcher = Dispatcher::new(Arc::clone(&pool));
        let stop = ShutdownToken::new();

        let summary = dispatcher
            .run(futures::stream::iter(jobs(&[100, 100, 100, 100])), &stop)
            .await;
        assert_eq!(summary.submitted, 4);
        assert_eq!(summary.rejected, 0);

        pool.shutdown().await.unwrap();
        assert_eq!(pool.snapshot().completed, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_cancel_while_saturated() {
        let pool = build_pool(1);
        let mut dispatcher = Dispatcher::new(Arc::clone(&pool));
        let stop = ShutdownToken::new();

        let canceller = tokio::spawn({
            let stop = stop.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                stop.cancel();
            }
        });

        // The first job holds the only fixture for 10s; the second waits.
        let summary = dispatcher
            .run(futures::stream::iter(jobs(&[10_000, 10, 10])), &stop)
            .await;
        canceller.await.unwrap();

        assert_eq!(summary.submitted, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(pool.snapshot().busy, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_when_pool_closes() {
        let pool = build_pool(1);
        let mut dispatcher = Dispatcher::new(Arc::clone(&pool));
        let stop = ShutdownToken::new();

        let closer = tokio::spawn({
            let pool = Arc::clone(&pool);
            async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                pool.shutdown().await
            }
        });

        let endless = futures::stream::repeat_with(|| Job::new(1, Duration::from_secs(1)));
        let summary = dispatcher.run(endless, &stop).await;
        closer.await.unwrap().unwrap();

        assert_eq!(summary.submitted, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(pool.snapshot().completed, 1);
    }
}
