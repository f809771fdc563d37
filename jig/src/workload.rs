use std::any::Any;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::fixture::FixtureId;
use crate::job::Job;

/// The work a fixture performs for one job.
///
/// Implementations may take as long as they like and may fail; a failure
/// (or a panic) is contained by the fixture and reported as
/// [`WorkOutcome::Failed`], the fixture is released either way.
#[async_trait]
pub trait Workload: Send + Sync {
    /// Perform `job` on `fixture`.
    async fn perform(&self, fixture: FixtureId, job: &Job) -> WorkOutcome;
}

/// Result of running one job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkOutcome {
    /// Job ran to completion.
    Completed,
    /// Job failed; the fixture is still returned to the pool.
    Failed {
        /// Error message.
        error: String,
    },
}

impl WorkOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, WorkOutcome::Completed)
    }

    /// Label used in logs and metrics.
    pub fn status(&self) -> &'static str {
        match self {
            WorkOutcome::Completed => "success",
            WorkOutcome::Failed { .. } => "failed",
        }
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        WorkOutcome::Failed {
            error: format!("workload panicked: {}", panic_message(payload.as_ref())),
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "non-string panic payload"
    }
}

/// Holds the fixture for exactly the job's duration.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimedWorkload;

#[async_trait]
impl Workload for TimedWorkload {
    async fn perform(&self, _fixture: FixtureId, job: &Job) -> WorkOutcome {
        tokio::time::sleep(job.duration()).await;
        WorkOutcome::Completed
    }
}
