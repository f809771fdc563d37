use std::time::Duration;

use jig::Job;

/// A job with the given id and a duration in milliseconds.
pub fn job(id: u64, duration_ms: u64) -> Job {
    Job::new(id, Duration::from_millis(duration_ms))
}

/// Jobs numbered from 1, one per entry in `durations_ms`.
pub fn jobs(durations_ms: &[u64]) -> Vec<Job> {
    durations_ms
        .iter()
        .enumerate()
        .map(|(i, ms)| job(i as u64 + 1, *ms))
        .collect()
}
