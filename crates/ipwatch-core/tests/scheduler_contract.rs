//! Contract: the scheduler drives the engine and shuts down cleanly.
//!
//! Properties verified:
//! - The first check fires immediately, then the scheduler waits out its
//!   interval
//! - A manual trigger runs an extra check without waiting
//! - Job status reflects the outcome of the most recent run
//! - An injected shutdown signal stops the loop and joins without error

mod common;

use common::*;
use ipwatch_core::{
    JobOutcome, JobState, MemoryEventLog, MemoryStateStore, MonitorEngine, Scheduler,
};
use std::time::Duration;
use tokio::sync::oneshot;

fn build_scheduler(
    source: ScriptedAddressSource,
) -> (Scheduler, ipwatch_core::SchedulerHandle) {
    let mut config = test_config();
    // Long enough that only the immediate first tick fires during a test
    config.schedule.check_interval_secs = 3600;

    let (engine, _event_rx) = MonitorEngine::new(
        Box::new(source),
        Box::new(MemoryStateStore::new()),
        Box::new(MemoryEventLog::new()),
        Box::new(RecordingNotifier::new(
            vec!["ops@example.com".to_string()],
            DeliveryMode::Success,
        )),
        &config,
    )
    .expect("engine construction succeeds");

    Scheduler::new(engine, &config.schedule).expect("scheduler construction succeeds")
}

#[tokio::test]
async fn first_check_fires_immediately_and_shutdown_joins_cleanly() {
    let source = ScriptedAddressSource::new(vec![Scripted::Ok("1.2.3.4")]);
    let counter = source.fetch_counter();
    let (scheduler, handle) = build_scheduler(source);

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(scheduler.run_with_shutdown(Some(shutdown_rx)));

    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = handle.check_status();
    assert_eq!(status.runs, 1, "exactly the immediate first check ran");
    assert_eq!(status.state, JobState::Idle);
    assert_eq!(status.last_outcome, Some(JobOutcome::Succeeded));
    assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 1);

    shutdown_tx.send(()).expect("scheduler is still listening");
    task.await
        .expect("task joins")
        .expect("scheduler exits without error");
}

#[tokio::test]
async fn run_now_triggers_an_extra_check() {
    let source =
        ScriptedAddressSource::new(vec![Scripted::Ok("1.2.3.4"), Scripted::Ok("1.2.3.4")]);
    let counter = source.fetch_counter();
    let (scheduler, handle) = build_scheduler(source);

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(scheduler.run_with_shutdown(Some(shutdown_rx)));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(handle.check_status().runs, 1);

    handle.run_now().await.expect("trigger accepted");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = handle.check_status();
    assert_eq!(status.runs, 2, "manual trigger bypassed the interval");
    assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 2);

    shutdown_tx.send(()).expect("scheduler is still listening");
    task.await.expect("task joins").expect("clean exit");
}

#[tokio::test]
async fn failed_check_is_visible_in_job_status() {
    // Every attempt fails; zero backoff keeps the retries instant.
    let source = ScriptedAddressSource::new(vec![
        Scripted::Transient,
        Scripted::Transient,
        Scripted::Transient,
        Scripted::Transient,
        Scripted::Transient,
    ]);
    let (scheduler, handle) = build_scheduler(source);

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(scheduler.run_with_shutdown(Some(shutdown_rx)));

    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = handle.check_status();
    assert_eq!(status.runs, 1);
    assert_eq!(status.failures, 1);
    assert_eq!(status.last_outcome, Some(JobOutcome::Failed));

    // A failed check does not wedge the loop
    shutdown_tx.send(()).expect("scheduler is still listening");
    task.await.expect("task joins").expect("clean exit");
}

#[tokio::test]
async fn run_now_fails_after_shutdown() {
    let source = ScriptedAddressSource::new(vec![Scripted::Ok("1.2.3.4")]);
    let (scheduler, handle) = build_scheduler(source);

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(scheduler.run_with_shutdown(Some(shutdown_rx)));

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(()).expect("scheduler is still listening");
    task.await.expect("task joins").expect("clean exit");

    assert!(handle.run_now().await.is_err());
}
