//! Contract: the check pipeline appends an event if and only if the
//! comparison key differs from the persisted state.
//!
//! Properties verified:
//! - First-ever run (no prior state) records exactly one change
//! - An unchanged address appends nothing and sends nothing
//! - A changed address commits one event, updates state, and notifies with
//!   both the previous and the new value
//! - A failed fetch aborts the tick without touching either store

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
    let (engine, _event_rx) = MonitorEngine::new(
        Box::new(source),
        Box::new(state),
        Box::new(log),
        Box::new(notifier),
        &test_config(),
    )
    .expect("engine construction succeeds");
    engine
}

#[tokio::test]
async fn first_run_records_one_event_and_notifies() {
    let state = MemoryStateStore::new();
    let log = MemoryEventLog::new();
    let notifier = RecordingNotifier::new(
        vec!["ops@example.com".to_string()],
        DeliveryMode::Success,
    );

    let engine = engine_with(
        ScriptedAddressSource::new(vec![Scripted::Ok("9.9.9.9")]),
        state.clone(),
        log.clone(),
        notifier.clone(),
    );

    let outcome = engine.run_check().await.expect("tick succeeds");
    assert!(matches!(outcome, TickOutcome::ChangedAndNotified { .. }));

    assert_eq!(log.count().await.unwrap(), 1);
    let committed = state.load().await.unwrap().expect("state written");
    assert_eq!(committed.address, "9.9.9.9".parse::<IpAddr>().unwrap());

    let changes = notifier.changes();
    assert_eq!(changes.len(), 1);
    assert!(changes[0].previous.is_none(), "first run has no previous value");
}

#[tokio::test]
async fn unchanged_address_appends_nothing() {
    let state = MemoryStateStore::new();
    let log = MemoryEventLog::new();
    let notifier = RecordingNotifier::new(
        vec!["ops@example.com".to_string()],
        DeliveryMode::Success,
    );

    let engine = engine_with(
        ScriptedAddressSource::new(vec![
            Scripted::Ok("1.2.3.4"),
            Scripted::Ok("1.2.3.4"),
            Scripted::Ok("1.2.3.4"),
        ]),
        state.clone(),
        log.clone(),
        notifier.clone(),
    );

    // First run commits the initial value
    engine.run_check().await.expect("first tick succeeds");
    assert_eq!(log.count().await.unwrap(), 1);

    // Re-running with the same address is idempotent
    for _ in 0..2 {
        let outcome = engine.run_check().await.expect("tick succeeds");
        assert!(matches!(outcome, TickOutcome::NoChange { .. }));
    }

    assert_eq!(log.count().await.unwrap(), 1, "no new events for unchanged address");
    assert_eq!(notifier.changes().len(), 1, "no new notifications either");
}

#[tokio::test]
async fn changed_address_commits_and_references_both_values() {
    let state = MemoryStateStore::new();
    let log = MemoryEventLog::new();
    let notifier = RecordingNotifier::new(
        vec!["ops@example.com".to_string()],
        DeliveryMode::Success,
    );

    let engine = engine_with(
        ScriptedAddressSource::new(vec![Scripted::Ok("1.2.3.4"), Scripted::Ok("5.6.7.8")]),
        state.clone(),
        log.clone(),
        notifier.clone(),
    );

    engine.run_check().await.expect("first tick succeeds");
    let outcome = engine.run_check().await.expect("second tick succeeds");

    let TickOutcome::ChangedAndNotified { event, report } = outcome else {
        panic!("expected a notified change");
    };
    assert_eq!(event.address, "5.6.7.8".parse::<IpAddr>().unwrap());
    assert_eq!(report.delivered_count(), 1);

    let committed = state.load().await.unwrap().expect("state written");
    assert_eq!(committed.address, "5.6.7.8".parse::<IpAddr>().unwrap());
    assert_eq!(log.count().await.unwrap(), 2);

    let changes = notifier.changes();
    assert_eq!(changes.len(), 2);
    let second = &changes[1];
    assert_eq!(
        second.previous.as_ref().map(|state| state.address),
        Some("1.2.3.4".parse::<IpAddr>().unwrap())
    );
    assert_eq!(second.current.address, "5.6.7.8".parse::<IpAddr>().unwrap());
}

#[tokio::test]
async fn fetch_failure_leaves_stores_untouched() {
    let state = MemoryStateStore::new();
    let log = MemoryEventLog::new();
    let notifier = RecordingNotifier::new(
        vec!["ops@example.com".to_string()],
        DeliveryMode::Success,
    );

    // Every attempt fails; the policy gives up after max_attempts
    let engine = engine_with(
        ScriptedAddressSource::new(vec![
            Scripted::Transient,
            Scripted::Transient,
            Scripted::Transient,
            Scripted::Transient,
            Scripted::Transient,
        ]),
        state.clone(),
        log.clone(),
        notifier.clone(),
    );

    let result = engine.run_check().await;
    assert!(matches!(result, Err(ipwatch_core::Error::Upstream(_))));

    // Unknown is never treated as changed
    assert!(state.load().await.unwrap().is_none());
    assert_eq!(log.count().await.unwrap(), 0);
    assert!(notifier.changes().is_empty());
}
