use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PoolError;

/// Layout and hardening knobs for a [`FixturePool`](crate::runtime::FixturePool).
///
/// The tray grouping only affects how fixtures are labelled; scheduling
/// treats every fixture as interchangeable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of trays in the pool.
    pub trays: u32,
    /// Fixtures mounted on each tray.
    pub fixtures_per_tray: u32,
    /// Upper bound on how long `acquire` waits for an idle fixture.
    /// `None` waits indefinitely.
    pub acquire_timeout_ms: Option<u64>,
    /// Upper bound on how long `shutdown` waits for busy fixtures.
    /// `None` waits until every in-flight job has finished.
    pub drain_timeout_ms: Option<u64>,
    /// Buffer size for event channels created alongside the pool.
    pub event_capacity: usize,
}

impl PoolConfig {
    /// A single tray holding `capacity` fixtures.
    pub fn with_capacity(capacity: u32) -> Self {
        Self {
            trays: 1,
            fixtures_per_tray: capacity,
            ..Self::default()
        }
    }

    /// Set the tray layout.
    pub fn with_layout(mut self, trays: u32, fixtures_per_tray: u32) -> Self {
        self.trays = trays;
        self.fixtures_per_tray = fixtures_per_tray;
        self
    }

    /// Set the acquire timeout.
    pub fn with_acquire_timeout(mut self, ms: u64) -> Self {
        self.acquire_timeout_ms = Some(ms);
        self
    }

    /// Set the drain timeout.
    pub fn with_drain_timeout(mut self, ms: u64) -> Self {
        self.drain_timeout_ms = Some(ms);
        self
    }

    /// Set the event channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Total number of fixtures.
    pub fn capacity(&self) -> usize {
        self.trays as usize * self.fixtures_per_tray as usize
    }

    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }

    pub fn drain_timeout(&self) -> Option<Duration> {
        self.drain_timeout_ms.map(Duration::from_millis)
    }

    /// Reject layouts the pool cannot run with.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.capacity() == 0 {
            return Err(PoolError::InvalidConfig(format!(
                "pool needs at least one fixture, got {} trays x {} fixtures",
                self.trays, self.fixtures_per_tray
            )));
        }
        if u32::try_from(self.capacity()).is_err() {
            return Err(PoolError::InvalidConfig(format!(
                "pool capacity {} exceeds the fixture id range",
                self.capacity()
            )));
        }
        if self.event_capacity == 0 {
            return Err(PoolError::InvalidConfig(
                "event capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            trays: 8,
            fixtures_per_tray: 12,
            acquire_timeout_ms: None,
            drain_timeout_ms: None,
            event_capacity: 1024,
        }
    }
}

/// Cadence and duration range for the product generator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Delay between consecutive products, in milliseconds.
    pub arrival_interval_ms: u64,
    /// Shortest work time handed to a product, in milliseconds.
    pub min_duration_ms: u64,
    /// Longest work time handed to a product, in milliseconds.
    pub max_duration_ms: u64,
    /// Seed for the duration generator. `None` seeds from entropy.
    pub seed: Option<u64>,
    /// Id given to the first generated product.
    pub first_id: u64,
}

impl SourceConfig {
    /// Set the arrival interval.
    pub fn with_interval(mut self, ms: u64) -> Self {
        self.arrival_interval_ms = ms;
        self
    }

    /// Set the work time range.
    pub fn with_duration_range(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.min_duration_ms = min_ms;
        self.max_duration_ms = max_ms;
        self
    }

    /// Set the generator seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn arrival_interval(&self) -> Duration {
        Duration::from_millis(self.arrival_interval_ms)
    }

    pub fn validate(&self) -> Result<(), PoolError> {
        if self.min_duration_ms > self.max_duration_ms {
            return Err(PoolError::InvalidConfig(format!(
                "duration range is empty: {}ms > {}ms",
                self.min_duration_ms, self.max_duration_ms
            )));
        }
        Ok(())
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            arrival_interval_ms: 1000,
            min_duration_ms: 3000,
            max_duration_ms: 6000,
            seed: None,
            first_id: 1,
        }
    }
}
