use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;

/// Producer-assigned job identifier. Ids increase monotonically per source.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub struct JobId(pub u64);

impl JobId {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

impl From<u64> for JobId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// One product to be worked on a fixture.
///
/// A job is immutable once created: the duration is fixed by the producer
/// and the fixture that picks it up executes it exactly once.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Job {
    id: JobId,
    duration: Duration,
}

impl Job {
    pub fn new(id: impl Into<JobId>, duration: Duration) -> Self {
        Self {
            id: id.into(),
            duration,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Product {} ({:?})", self.id, self.duration)
    }
}
