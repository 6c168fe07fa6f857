// # Notifier Trait
//
// Defines the interface for delivering human-readable alerts.
//
// ## Delivery semantics
//
// The notifier does NOT retry internally — a failed delivery is reported
// and the next change cycle naturally re-attempts only if a new change
// occurs. Partial delivery across a recipient list is possible and must be
// reported per recipient, never collapsed into one boolean.
//
// `Err` from a notify method means nothing was delivered at all (render
// failure, relay unreachable). `Ok(report)` with entries in `failed` means
// some recipients got the message and some did not.
//
// ## Implementations
//
// - SMTP-backed: `ipwatch-notify-smtp` crate
// - Recording/failing doubles for tests: `tests/common/mod.rs`

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DeliveryError;
use crate::traits::address_source::AddressObservation;
use crate::traits::event_log::ChangeEvent;
use crate::traits::state_store::LastKnownState;

/// Alert payload for one confirmed change. Ephemeral — constructed,
/// delivered, discarded, never persisted.
#[derive(Debug, Clone)]
pub struct ChangeNotification {
    /// The previous committed state, `None` on first-ever run
    pub previous: Option<LastKnownState>,
    /// The observation that triggered the change
    pub current: AddressObservation,
}

/// Digest payload over a trailing window of recorded changes.
#[derive(Debug, Clone)]
pub struct DigestNotification {
    /// Window start (inclusive)
    pub from: DateTime<Utc>,
    /// Window end (exclusive)
    pub to: DateTime<Utc>,
    /// Events in the window, ascending by timestamp
    pub events: Vec<ChangeEvent>,
}

/// One recipient that did not receive the message, and why.
#[derive(Debug, Clone)]
pub struct RecipientFailure {
    /// The recipient address
    pub recipient: String,
    /// Classified delivery failure
    pub error: DeliveryError,
}

/// Per-recipient outcome of one delivery attempt.
#[derive(Debug, Clone, Default)]
pub struct DeliveryReport {
    /// Recipients the relay accepted the message for
    pub delivered: Vec<String>,
    /// Recipients that failed, each with its classified error
    pub failed: Vec<RecipientFailure>,
}

impl DeliveryReport {
    /// True if every recipient was delivered to
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && !self.delivered.is_empty()
    }

    /// Number of successful deliveries
    pub fn delivered_count(&self) -> usize {
        self.delivered.len()
    }
}

/// Trait for notifier implementations.
///
/// Implementations render the message body themselves (template plus
/// substitution values); an unresolved placeholder is a render failure, not
/// a silent pass-through of literal placeholder text.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Render and deliver an alert for one confirmed change.
    async fn notify_change(
        &self,
        change: &ChangeNotification,
    ) -> Result<DeliveryReport, crate::Error>;

    /// Render and deliver a tabular digest over a window of changes.
    async fn notify_digest(
        &self,
        digest: &DigestNotification,
    ) -> Result<DeliveryReport, crate::Error>;
}
