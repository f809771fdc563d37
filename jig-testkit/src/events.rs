use async_trait::async_trait;
use jig::*;
use parking_lot::Mutex;
use std::sync::Arc;

/// Publisher that keeps every event in memory.
#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<FixtureEvent>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<FixtureEvent> {
        self.events.lock().clone()
    }

    pub fn payloads(&self) -> Vec<FixtureEventPayload> {
        self.events
            .lock()
            .iter()
            .map(|event| event.payload.clone())
            .collect()
    }

    pub fn started(&self) -> Vec<(FixtureId, JobId)> {
        self.payloads()
            .into_iter()
            .filter_map(|payload| match payload {
                FixtureEventPayload::JobStarted {
                    fixture_id, job_id, ..
                } => Some((fixture_id, job_id)),
                _ => None,
            })
            .collect()
    }

    pub fn finished(&self) -> Vec<(FixtureId, JobId, WorkOutcome)> {
        self.payloads()
            .into_iter()
            .filter_map(|payload| match payload {
                FixtureEventPayload::JobFinished {
                    fixture_id,
                    job_id,
                    outcome,
                } => Some((fixture_id, job_id, outcome)),
                _ => None,
            })
            .collect()
    }

    pub fn assert_event_count_eq(&self, expected: usize) {
        let actual = self.events.lock().len();
        assert_eq!(actual, expected, "Expected {expected} events, got {actual}");
    }
}

#[async_trait]
impl EventPublisher for EventRecorder {
    async fn publish(&self, event: FixtureEvent) -> anyhow::Result<()> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Publisher whose every publish fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct FailingPublisher;

#[async_trait]
impl EventPublisher for FailingPublisher {
    async fn publish(&self, _event: FixtureEvent) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("event sink unavailable"))
    }
}

/// Publisher that panics on every publish.
#[derive(Clone, Copy, Debug, Default)]
pub struct PanickingPublisher;

#[async_trait]
impl EventPublisher for PanickingPublisher {
    async fn publish(&self, event: FixtureEvent) -> anyhow::Result<()> {
        panic!("event observer crashed on {:?}", event.meta.idempotency_key);
    }
}
