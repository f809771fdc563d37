use std::time::Duration;

use thiserror::Error;

use crate::fixture::FixtureId;

/// Errors surfaced to producers and lifecycle callers.
///
/// Contract violations on the pool itself (releasing a fixture that is not
/// busy) are not represented here; they panic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("fixture pool is closed")]
    PoolClosed,

    #[error("no fixture became idle within {0:?}")]
    AcquireTimeout(Duration),

    #[error("{busy} fixtures still busy after {waited:?} of draining")]
    DrainTimeout { busy: usize, waited: Duration },

    #[error("fixture {0} has no running worker")]
    FixtureUnavailable(FixtureId),

    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),
}

impl PoolError {
    /// True when the producer should stop generating work.
    pub fn is_closed(&self) -> bool {
        matches!(self, PoolError::PoolClosed)
    }
}
