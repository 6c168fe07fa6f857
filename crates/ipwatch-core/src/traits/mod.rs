//! Core traits for the ipwatch system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`AddressSource`]: Fetch the current public address (one attempt per call)
//! - [`StateStore`]: Durable last-known-value record
//! - [`EventLog`]: Append-only record of confirmed changes
//! - [`Notifier`]: Render and deliver alerts and digests

pub mod address_source;
pub mod event_log;
pub mod notifier;
pub mod state_store;

pub use address_source::{AddressObservation, AddressSource};
pub use event_log::{ChangeEvent, EventLog, NewChangeEvent};
pub use notifier::{
    ChangeNotification, DeliveryReport, DigestNotification, Notifier, RecipientFailure,
};
pub use state_store::{LastKnownState, StateStore};
