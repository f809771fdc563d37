//! Test doubles for the jig fixture pool.

mod events;
mod job;
mod workload;

pub use events::{EventRecorder, FailingPublisher, PanickingPublisher};
pub use job::{job, jobs};
pub use workload::{RunRecord, ScriptedWorkload};
