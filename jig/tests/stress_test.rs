//! Stress tests for the fixture pool.
//!
//! Pushes 1000 jobs through 10 fixtures and checks the occupancy
//! invariants hold throughout.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use jig::*;
use jig_testkit::{EventRecorder, ScriptedWorkload};
use tokio::time::timeout;

#[tokio::test(start_paused = true)]
async fn stress_1000_jobs_with_10_fixtures() {
    let workload = ScriptedWorkload::new().failing_on((1..=1000).step_by(97));
    let recorder = EventRecorder::new();
    let pool = Arc::new(
        FixturePoolBuilder::new(PoolConfig::default().with_layout(2, 5))
            .with_workload(Arc::new(workload.clone()))
            .with_events(Arc::new(recorder.clone()))
            .build()
            .expect("build pool"),
    );

    // Durations between 1ms and 50ms, no spacing between arrivals.
    let source_config = SourceConfig::default().with_interval(0);
    let source = JobSource::new(&source_config, |id: JobId| {
        Duration::from_millis(1 + id.0 * 7 % 50)
    });

    let stop = ShutdownToken::new();
    let mut dispatcher = Dispatcher::new(Arc::clone(&pool));
    let summary = dispatcher
        .run(source.into_stream().take(1000), &stop)
        .await;
    assert_eq!(summary.submitted, 1000);
    assert_eq!(summary.rejected, 0);

    timeout(Duration::from_secs(60), pool.shutdown())
        .await
        .expect("timed out waiting for drain")
        .expect("drain");

    let expected_failed = (1..=1000).step_by(97).count() as u64;
    let snapshot = pool.snapshot();
    assert_eq!(snapshot.completed + snapshot.failed, 1000);
    assert_eq!(snapshot.failed, expected_failed);
    assert_eq!(snapshot.stopped, 10);

    workload.assert_peak_at_most(10);
    workload.assert_no_fixture_overlap();

    let started: HashSet<JobId> = recorder.started().into_iter().map(|(_, id)| id).collect();
    assert_eq!(started.len(), 1000, "every job started exactly once");
    assert_eq!(recorder.finished().len(), 1000);

    let fixtures_used: HashSet<FixtureId> =
        recorder.started().into_iter().map(|(fixture, _)| fixture).collect();
    assert!(fixtures_used.iter().all(|f| f.index() < 10));
}

#[tokio::test]
async fn stress_concurrent_producers_share_one_pool() {
    let workload = ScriptedWorkload::new();
    let pool = Arc::new(
        FixturePoolBuilder::new(PoolConfig::with_capacity(4))
            .with_workload(Arc::new(workload.clone()))
            .with_events(Arc::new(EventRecorder::new()))
            .build()
            .expect("build pool"),
    );

    let producers: Vec<_> = (0..8u64)
        .map(|p| {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                let mut dispatcher = Dispatcher::new(pool);
                for n in 0..50u64 {
                    dispatcher
                        .submit(Job::new(p * 1000 + n, Duration::from_micros(200)))
                        .await
                        .expect("submit");
                }
                dispatcher.summary()
            })
        })
        .collect();

    let mut submitted = 0;
    for producer in producers {
        submitted += producer.await.expect("producer task").submitted;
    }
    assert_eq!(submitted, 400);

    timeout(Duration::from_secs(30), pool.shutdown())
        .await
        .expect("timed out waiting for drain")
        .expect("drain");

    assert_eq!(pool.snapshot().completed, 400);
    workload.assert_peak_at_most(4);
    workload.assert_no_fixture_overlap();
}
