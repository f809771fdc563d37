use std::fmt;
use std::sync::Arc;

use crate::config::PoolConfig;
use crate::events::EventPublisher;
use crate::workload::{TimedWorkload, Workload};

use super::pool::FixturePool;

/// Builder for constructing a [`FixturePool`] with explicit dependencies.
///
/// The event publisher is required. The workload defaults to
/// [`TimedWorkload`], which simply holds the fixture for the job's duration.
///
/// # Example
///
/// ```ignore
/// use jig::*;
///
/// let pool = FixturePoolBuilder::new(PoolConfig::default())
///     .with_workload(Arc::new(TimedWorkload))
///     .with_events(Arc::new(LogPublisher::new()))
///     .build()?;
/// ```
pub struct FixturePoolBuilder {
    config: PoolConfig,
    workload: Option<Arc<dyn Workload>>,
    events: Option<Arc<dyn EventPublisher>>,
}

impl fmt::Debug for FixturePoolBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixturePoolBuilder")
            .field("config", &self.config)
            .field("workload_set", &self.workload.is_some())
            .field("events_set", &self.events.is_some())
            .finish()
    }
}

impl FixturePoolBuilder {
    /// Create a new builder with the given pool configuration.
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            workload: None,
            events: None,
        }
    }

    /// Set the workload run for every job.
    pub fn with_workload(mut self, workload: Arc<dyn Workload>) -> Self {
        self.workload = Some(workload);
        self
    }

    /// Set the event publisher.
    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the pool and spawn its fixture workers.
    ///
    /// # Errors
    ///
    /// Returns an error if the event publisher is missing or the
    /// configuration is invalid.
    pub fn build(self) -> anyhow::Result<FixturePool> {
        let events = self
            .events
            .ok_or_else(|| anyhow::anyhow!("events dependency missing"))?;
        let workload = self
            .workload
            .unwrap_or_else(|| Arc::new(TimedWorkload) as Arc<dyn Workload>);

        Ok(FixturePool::new(self.config, workload, events)?)
    }
}
