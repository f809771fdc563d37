use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::PoolConfig;
use crate::fixture::FixtureId;
use crate::job::{Job, JobId};
use crate::workload::WorkOutcome;

/// Metadata envelope attached to every fixture event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventMeta {
    pub version: u16,
    pub correlation_id: Uuid,
    pub idempotency_key: String,
    pub timestamp: DateTime<Utc>,
}

impl EventMeta {
    pub fn new(
        correlation_id: Option<Uuid>,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            version: 1,
            correlation_id: correlation_id.unwrap_or_else(Uuid::now_v7),
            idempotency_key: idempotency_key.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Event with metadata and payload.
#[derive(Clone, Debug)]
pub struct FixtureEvent {
    pub meta: EventMeta,
    pub payload: FixtureEventPayload,
}

/// Payload emitted at job and pool lifecycle transitions.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum FixtureEventPayload {
    /// A fixture started working on a job.
    JobStarted {
        fixture_id: FixtureId,
        job_id: JobId,
        duration: Duration,
    },
    /// A fixture finished a job, successfully or not.
    JobFinished {
        fixture_id: FixtureId,
        job_id: JobId,
        outcome: WorkOutcome,
    },
    /// Shutdown began; `busy` fixtures are still finishing their jobs.
    PoolDraining { busy: usize },
    /// Every fixture has stopped.
    PoolStopped { completed: u64, failed: u64 },
}

impl FixtureEvent {
    /// Start notification. `correlation_id` ties it to the matching finish.
    pub fn job_started(
        fixture_id: FixtureId,
        job: &Job,
        correlation_id: Uuid,
    ) -> Self {
        Self {
            meta: EventMeta::new(
                Some(correlation_id),
                format!("start-{}", job.id().0),
            ),
            payload: FixtureEventPayload::JobStarted {
                fixture_id,
                job_id: job.id(),
                duration: job.duration(),
            },
        }
    }

    pub fn job_finished(
        fixture_id: FixtureId,
        job_id: JobId,
        outcome: WorkOutcome,
        correlation_id: Uuid,
    ) -> Self {
        Self {
            meta: EventMeta::new(
                Some(correlation_id),
                format!("finish-{}", job_id.0),
            ),
            payload: FixtureEventPayload::JobFinished {
                fixture_id,
                job_id,
                outcome,
            },
        }
    }

    pub fn pool_draining(busy: usize) -> Self {
        Self {
            meta: EventMeta::new(None, "pool-draining"),
            payload: FixtureEventPayload::PoolDraining { busy },
        }
    }

    pub fn pool_stopped(completed: u64, failed: u64) -> Self {
        Self {
            meta: EventMeta::new(None, "pool-stopped"),
            payload: FixtureEventPayload::PoolStopped { completed, failed },
        }
    }
}

/// Sink for fixture events.
///
/// The pool never depends on delivery: publish errors are logged and
/// otherwise ignored.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event.
    async fn publish(&self, event: FixtureEvent) -> anyhow::Result<()>;
}

/// Source of fixture events for observers.
pub trait EventSubscriber: Send + Sync {
    /// Subscribe to events, returning a broadcast receiver.
    ///
    /// Multiple subscribers receive the same events (fan-out).
    fn subscribe(&self) -> broadcast::Receiver<FixtureEvent>;
}

/// In-process event bus using a tokio broadcast channel.
///
/// Publishing never waits for slow subscribers; a subscriber that falls
/// more than `capacity` events behind receives `RecvError::Lagged`.
pub struct InProcEventBus {
    sender: broadcast::Sender<FixtureEvent>,
    capacity: usize,
}

impl std::fmt::Debug for InProcEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcEventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl InProcEventBus {
    /// Create a new event bus buffering up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    /// Bus sized by the pool's `event_capacity`.
    pub fn for_pool(config: &PoolConfig) -> Self {
        Self::new(config.event_capacity)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[async_trait]
impl EventPublisher for InProcEventBus {
    async fn publish(&self, event: FixtureEvent) -> anyhow::Result<()> {
        // No subscribers is not an error.
        let _ = self.sender.send(event);
        Ok(())
    }
}

impl EventSubscriber for InProcEventBus {
    fn subscribe(&self) -> broadcast::Receiver<FixtureEvent> {
        self.sender.subscribe()
    }
}

/// Renders progress lines through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogPublisher;

impl LogPublisher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: FixtureEvent) -> anyhow::Result<()> {
        match event.payload {
            FixtureEventPayload::JobStarted {
                fixture_id,
                job_id,
                duration,
            } => {
                tracing::info!(
                    "[Fixture {fixture_id}] Working on Product {job_id} for {duration:?}"
                );
            }
            FixtureEventPayload::JobFinished {
                fixture_id,
                job_id,
                outcome: WorkOutcome::Completed,
            } => {
                tracing::info!("[Fixture {fixture_id}] Finished Product {job_id}");
            }
            FixtureEventPayload::JobFinished {
                fixture_id,
                job_id,
                outcome: WorkOutcome::Failed { error },
            } => {
                tracing::warn!(
                    "[Fixture {fixture_id}] Failed Product {job_id}: {error}"
                );
            }
            FixtureEventPayload::PoolDraining { busy } => {
                tracing::info!(busy, "Shutting down...");
            }
            FixtureEventPayload::PoolStopped { completed, failed } => {
                tracing::info!(completed, failed, "All fixtures stopped");
            }
        }
        Ok(())
    }
}
