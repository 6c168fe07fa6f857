// # ipwatch-core
//
// Core library for the ipwatch change-detection and delivery engine.
//
// ## Architecture Overview
//
// The system observes one mutable external fact — the caller's public
// network address and its approximate geographic origin — on a schedule,
// durably remembers the last observed value, and reacts to changes:
//
// - **AddressSource**: trait for fetching the current address (one attempt)
// - **Resolver** + **BackoffPolicy**: the single retry/backoff policy
// - **compare()**: pure change detection on a configurable key
// - **StateStore**: crash-safe last-known-value record
// - **EventLog**: append-only record of confirmed changes
// - **Notifier**: per-recipient alert and digest delivery
// - **MonitorEngine**: orchestrates one check or digest run
// - **Scheduler**: interval check job + cron digest job + run-now trigger
//
// ## Design Principles
//
// 1. **Separation of Concerns**: sources fetch, stores persist, the engine
//    decides; retry logic exists in exactly one place
// 2. **Crash Safety**: state writes are atomic, events are append-only, and
//    an unknown value is never treated as a change
// 3. **Single Writer**: one scheduler instance per state-store/event-log
//    pair; the design does not arbitrate concurrent instances

pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod events;
pub mod retry;
pub mod scheduler;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{EventLogConfig, MonitorConfig, ResolverConfig, ScheduleConfig, StateStoreConfig};
pub use detect::{ChangeDecision, ChangeKey, compare};
pub use engine::{DigestOutcome, EngineEvent, MonitorEngine, TickOutcome};
pub use error::{DeliveryError, Error, Result, UpstreamError};
pub use events::MemoryEventLog;
pub use retry::{BackoffPolicy, Resolver};
pub use scheduler::{JobOutcome, JobState, Scheduler, SchedulerHandle};
pub use state::{FileStateStore, MemoryStateStore};
pub use traits::{
    AddressObservation, AddressSource, ChangeEvent, ChangeNotification, DeliveryReport,
    DigestNotification, EventLog, LastKnownState, NewChangeEvent, Notifier, StateStore,
};
