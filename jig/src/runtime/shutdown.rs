use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::pool::{FixturePool, PoolSnapshot};
use crate::error::PoolError;

/// Token for signalling shutdown to the producer loop and the coordinator.
#[derive(Clone, Debug)]
pub struct ShutdownToken {
    inner: Arc<ShutdownTokenInner>,
}

#[derive(Debug)]
struct ShutdownTokenInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl ShutdownToken {
    /// Create a new shutdown token.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ShutdownTokenInner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Check if cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until cancelled.
    pub async fn cancelled(&self) {
        // Register before checking so a cancel in between is not missed.
        let notified = self.inner.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Orchestrates an orderly stop of a [`FixturePool`].
///
/// Anything may trigger the shutdown (a timer, Ctrl-C, an explicit call);
/// [`run`](Self::run) waits for the trigger, drains the pool and returns
/// once every admitted job has finished.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    pool: Arc<FixturePool>,
    token: ShutdownToken,
}

impl ShutdownCoordinator {
    pub fn new(pool: Arc<FixturePool>) -> Self {
        Self {
            pool,
            token: ShutdownToken::new(),
        }
    }

    /// Token shared with the producer loop; cancelled when shutdown is triggered.
    pub fn token(&self) -> ShutdownToken {
        self.token.clone()
    }

    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Trigger shutdown once `after` has elapsed.
    pub fn trigger_after(&self, after: Duration) -> JoinHandle<()> {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(after) => {
                    tracing::info!(?after, "run time elapsed, triggering shutdown");
                    token.cancel();
                }
            }
        })
    }

    /// Trigger shutdown on Ctrl-C.
    pub fn trigger_on_ctrl_c(&self) -> JoinHandle<()> {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                signal = tokio::signal::ctrl_c() => match signal {
                    Ok(()) => {
                        tracing::info!("ctrl-c received, triggering shutdown");
                        token.cancel();
                    }
                    Err(err) => tracing::warn!("ctrl-c handler unavailable: {err}"),
                }
            }
        })
    }

    /// Wait for the trigger, then drain the pool.
    pub async fn run(&self) -> Result<PoolSnapshot, PoolError> {
        self.token.cancelled().await;
        tracing::info!("shutdown triggered, draining fixture pool");
        self.pool.shutdown().await?;
        Ok(self.pool.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    use crate::config::PoolConfig;
    use crate::events::InProcEventBus;
    use crate::job::Job;
    use crate::runtime::pool::PoolPhase;
    use crate::workload::TimedWorkload;

    #[tokio::test]
    async fn test_shutdown_token_shared_state() {
        let token = ShutdownToken::new();
        let clone1 = token.clone();
        let clone2 = token.clone();

        token.cancel();

        assert!(clone1.is_cancelled());
        assert!(clone2.is_cancelled());

        timeout(Duration::from_secs(1), clone1.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_token_cancelled_wakes_clones() {
        let token = ShutdownToken::new();
        let clone1 = token.clone();
        let clone2 = token.clone();
        let clone3 = token.clone();

        let h1 = tokio::spawn(async move { clone1.cancelled().await });
        let h2 = tokio::spawn(async move { clone2.cancelled().await });
        let h3 = tokio::spawn(async move { clone3.cancelled().await });

        tokio::time::sleep(Duration::from_millis(50)).await;

        token.cancel();

        let results = timeout(
            Duration::from_secs(5),
            futures::future::join_all(vec![h1, h2, h3]),
        )
        .await
        .expect("waiters did not observe cancellation within 5 seconds");

        for r in results {
            r.expect("waiter task panicked");
        }
    }

    #[tokio::test]
    async fn test_shutdown_token_default_not_cancelled() {
        let token = ShutdownToken::default();
        assert!(!token.is_cancelled());
    }

    fn build_pool(capacity: u32) -> Arc<FixturePool> {
        Arc::new(
            FixturePool::new(
                PoolConfig::with_capacity(capacity),
                Arc::new(TimedWorkload),
                Arc::new(InProcEventBus::new(16)),
            )
            .expect("build pool"),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_coordinator_waits_for_trigger_then_drains() {
        let pool = build_pool(2);
        pool.acquire()
            .await
            .unwrap()
            .run(Job::new(1, Duration::from_secs(2)))
            .unwrap();

        let coordinator = ShutdownCoordinator::new(Arc::clone(&pool));
        let start = tokio::time::Instant::now();
        coordinator.trigger_after(Duration::from_secs(1));

        let snapshot = coordinator.run().await.expect("drained");
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(snapshot.phase, PoolPhase::Stopped);
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.busy, 0);
    }

    #[tokio::test]
    async fn test_explicit_trigger_stops_idle_pool() {
        let pool = build_pool(3);
        let coordinator = ShutdownCoordinator::new(Arc::clone(&pool));
        let token = coordinator.token();

        coordinator.trigger();
        assert!(token.is_cancelled());

        let snapshot = timeout(Duration::from_secs(1), coordinator.run())
            .await
            .expect("coordinator finished")
            .unwrap();
        assert_eq!(snapshot.stopped, 3);
    }
}
