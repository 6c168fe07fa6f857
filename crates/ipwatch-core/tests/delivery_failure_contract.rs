//! Contract: delivery failure never unwinds a committed change.
//!
//! Properties verified:
//! - A total delivery failure leaves the appended event and the stored
//!   state intact, and the outcome says so
//! - A failed notification is not re-attempted on the next tick unless a
//!   new change occurs
//! - Partial delivery is reported per recipient, not as one boolean

mod common;

use common::*;
use ipwatch_core::traits::{EventLog, StateStore};
use ipwatch_core::{MemoryEventLog, MemoryStateStore, MonitorEngine, TickOutcome};
use std::net::IpAddr;

fn engine_with(
    source: ScriptedAddressSource,
    state: MemoryStateStore,
    log: MemoryEventLog,
    notifier: RecordingNotifier,
) -> MonitorEngine {
    let mut config = test_config();
    config.recipients = vec![
        "first@example.com".to_string(),
        "second@example.com".to_string(),
    ];
    let (engine, _event_rx) = MonitorEngine::new(
        Box::new(source),
        Box::new(state),
        Box::new(log),
        Box::new(notifier),
        &config,
    )
    .expect("engine construction succeeds");
    engine
}

#[tokio::test]
async fn total_failure_keeps_committed_change() {
    let state = MemoryStateStore::new();
    let log = MemoryEventLog::new();
    let notifier = RecordingNotifier::new(
        vec!["first@example.com".to_string(), "second@example.com".to_string()],
        DeliveryMode::TotalFailure,
    );

    let engine = engine_with(
        ScriptedAddressSource::new(vec![Scripted::Ok("5.6.7.8")]),
        state.clone(),
        log.clone(),
        notifier.clone(),
    );

    let outcome = engine.run_check().await.expect("tick completes");
    assert!(matches!(outcome, TickOutcome::ChangedNotifyFailed { .. }));

    // The change is real regardless of whether anyone was told
    assert_eq!(log.count().await.unwrap(), 1);
    let committed = state.load().await.unwrap().expect("state written");
    assert_eq!(committed.address, "5.6.7.8".parse::<IpAddr>().unwrap());
}

#[tokio::test]
async fn failed_notification_is_not_replayed_without_a_new_change() {
    let state = MemoryStateStore::new();
    let log = MemoryEventLog::new();
    let notifier = RecordingNotifier::new(
        vec!["first@example.com".to_string(), "second@example.com".to_string()],
        DeliveryMode::TotalFailure,
    );

    let engine = engine_with(
        ScriptedAddressSource::new(vec![Scripted::Ok("5.6.7.8"), Scripted::Ok("5.6.7.8")]),
        state.clone(),
        log.clone(),
        notifier.clone(),
    );

    engine.run_check().await.expect("first tick completes");
    let outcome = engine.run_check().await.expect("second tick completes");

    assert!(matches!(outcome, TickOutcome::NoChange { .. }));
    assert_eq!(log.count().await.unwrap(), 1);
    assert_eq!(notifier.changes().len(), 1, "no re-notification for an old change");
}

#[tokio::test]
async fn partial_delivery_is_reported_per_recipient() {
    let state = MemoryStateStore::new();
    let log = MemoryEventLog::new();
    let notifier = RecordingNotifier::new(
        vec!["first@example.com".to_string(), "second@example.com".to_string()],
        DeliveryMode::Partial(vec!["second@example.com".to_string()]),
    );

    let engine = engine_with(
        ScriptedAddressSource::new(vec![Scripted::Ok("5.6.7.8")]),
        state.clone(),
        log.clone(),
        notifier.clone(),
    );

    let outcome = engine.run_check().await.expect("tick completes");
    let TickOutcome::ChangedAndNotified { report, .. } = outcome else {
        panic!("a partially delivered change still counts as notified");
    };

    assert_eq!(report.delivered, vec!["first@example.com".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].recipient, "second@example.com");
    assert!(!report.is_complete());
}
