//! Core monitor engine
//!
//! The MonitorEngine is responsible for one check tick end to end:
//!
//! 1. Resolve the current public address (retry policy applied)
//! 2. Load the last committed state
//! 3. Compare on the configured change key
//! 4. If changed: append the change event, overwrite the state (commit),
//!    then render and deliver the notification
//!
//! and for the digest pipeline: query the event log over a trailing window
//! and deliver one summary message.
//!
//! ## Failure semantics
//!
//! - A resolver failure aborts the tick with no writes — an unknown value is
//!   never treated as a change.
//! - A storage failure fails the tick; the change is not committed.
//! - A delivery failure never rolls back the committed event; it is reported
//!   in the tick outcome and the operational log.
//!
//! Every tick outcome (no-change, changed-and-notified, changed-but-notify-
//! failed, fetch-failed, storage-failed) is distinguishable to the caller.

use std::net::IpAddr;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::detect::{ChangeDecision, ChangeKey, compare};
use crate::error::{Error, Result};
use crate::retry::{BackoffPolicy, Resolver};
use crate::traits::{
    AddressObservation, AddressSource, ChangeEvent, ChangeNotification, DeliveryReport,
    DigestNotification, EventLog, LastKnownState, NewChangeEvent, Notifier, StateStore,
};

/// Events emitted by the engine for external monitoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A check tick started
    CheckStarted,

    /// The observed address matched the committed state
    NoChange {
        /// The unchanged address
        address: IpAddr,
    },

    /// The comparison key differed (or there was no prior state)
    ChangeDetected {
        /// Previously committed address, `None` on first run
        previous: Option<IpAddr>,
        /// Newly observed address
        new: IpAddr,
    },

    /// Event appended and state overwritten
    ChangeCommitted {
        /// Surrogate id assigned by the event log
        event_id: i64,
        /// The committed address
        address: IpAddr,
    },

    /// Notification delivered (possibly to a subset of recipients)
    NotificationSent {
        /// Recipients the relay accepted the message for
        delivered: usize,
        /// Recipients that failed
        failed: usize,
    },

    /// No recipient received the notification
    NotificationFailed {
        /// Why delivery failed outright
        error: String,
    },

    /// The tick aborted before commit
    CheckFailed {
        /// Classified failure description
        error: String,
    },

    /// Digest delivered
    DigestSent {
        /// Number of events summarized
        events: usize,
        /// Recipients the relay accepted the message for
        delivered: usize,
    },

    /// Digest window contained no events; nothing was sent
    DigestSkipped,
}

/// Outcome of one check tick that completed without a fatal error.
///
/// Fetch and storage failures surface as `Err` from [`MonitorEngine::run_check`]
/// instead, so silence and failure are never conflated.
#[derive(Debug)]
pub enum TickOutcome {
    /// Comparison key unchanged; no writes, no mail
    NoChange {
        /// The unchanged address
        address: IpAddr,
    },

    /// Change committed and at least one recipient notified
    ChangedAndNotified {
        /// The appended event
        event: ChangeEvent,
        /// Per-recipient delivery results
        report: DeliveryReport,
    },

    /// Change committed but no recipient was notified
    ChangedNotifyFailed {
        /// The appended event (still valid — the change is real regardless)
        event: ChangeEvent,
        /// Why delivery failed
        error: String,
    },
}

/// Outcome of one digest run.
#[derive(Debug)]
pub enum DigestOutcome {
    /// The window contained no events; nothing was sent
    Empty,

    /// Summary delivered
    Sent {
        /// Number of events summarized
        events: usize,
        /// Per-recipient delivery results
        report: DeliveryReport,
    },
}

/// Core monitor engine.
///
/// Owns the resolver-with-retry and the three collaborators, and serializes
/// the read-compare-write unit: the engine assumes it is the only writer
/// against its state store / event log pair (single scheduler instance).
pub struct MonitorEngine {
    /// Upstream source wrapped with the unified retry policy
    resolver: Resolver,

    /// Durable last-known-value record
    state_store: Box<dyn StateStore>,

    /// Append-only change log
    event_log: Box<dyn EventLog>,

    /// Alert delivery
    notifier: Box<dyn Notifier>,

    /// Which fields participate in comparison
    change_key: ChangeKey,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl MonitorEngine {
    /// Create a new engine.
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields
    /// engine events for monitoring. The receiver may be dropped; a full
    /// channel drops events rather than blocking the pipeline.
    pub fn new(
        source: Box<dyn AddressSource>,
        state_store: Box<dyn StateStore>,
        event_log: Box<dyn EventLog>,
        notifier: Box<dyn Notifier>,
        config: &MonitorConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);
        let policy = BackoffPolicy::from_config(&config.resolver.retry);

        let engine = Self {
            resolver: Resolver::new(source, policy),
            state_store,
            event_log,
            notifier,
            change_key: config.change_key,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Run one check tick.
    ///
    /// # Returns
    ///
    /// - `Ok(TickOutcome)`: The tick completed; see the outcome for whether
    ///   a change was committed and whether anyone was told
    /// - `Err(Error::Upstream)`: Fetch failed after retries; nothing written
    /// - `Err(Error::Storage)`: A write failed; the change is not committed
    pub async fn run_check(&self) -> Result<TickOutcome> {
        self.emit_event(EngineEvent::CheckStarted);

        let observation = match self.resolver.resolve().await {
            Ok(obs) => obs,
            Err(err) => {
                self.emit_event(EngineEvent::CheckFailed {
                    error: err.to_string(),
                });
                return Err(Error::Upstream(err));
            }
        };

        let last = self.state_store.load().await.inspect_err(|err| {
            self.emit_event(EngineEvent::CheckFailed {
                error: err.to_string(),
            });
        })?;

        match compare(self.change_key, &observation, last.as_ref()) {
            ChangeDecision::Unchanged => {
                debug!(address = %observation.address, "address unchanged");
                self.emit_event(EngineEvent::NoChange {
                    address: observation.address,
                });
                Ok(TickOutcome::NoChange {
                    address: observation.address,
                })
            }
            ChangeDecision::Changed => {
                self.emit_event(EngineEvent::ChangeDetected {
                    previous: last.as_ref().map(|state| state.address),
                    new: observation.address,
                });
                self.commit_and_notify(observation, last).await
            }
        }
    }

    /// Append the event, overwrite the state, then notify.
    ///
    /// Ordering is append-then-state so the committed state never points at
    /// an address with no corresponding event. If the process dies between
    /// the two writes, the next tick re-reads state and re-detects the
    /// change; neither write is ever blindly retried.
    async fn commit_and_notify(
        &self,
        observation: AddressObservation,
        previous: Option<LastKnownState>,
    ) -> Result<TickOutcome> {
        let event = self
            .event_log
            .append(NewChangeEvent::from(&observation))
            .await
            .inspect_err(|err| {
                self.emit_event(EngineEvent::CheckFailed {
                    error: format!("event append failed: {}", err),
                });
            })?;

        self.state_store
            .store(&LastKnownState::from(&observation))
            .await
            .inspect_err(|err| {
                self.emit_event(EngineEvent::CheckFailed {
                    error: format!("state write failed: {}", err),
                });
            })?;

        info!(
            event_id = event.id,
            previous = ?previous.as_ref().map(|state| state.address),
            new = %observation.address,
            "change committed"
        );
        self.emit_event(EngineEvent::ChangeCommitted {
            event_id: event.id,
            address: observation.address,
        });

        // Commit is complete; delivery failure from here on is reported but
        // never unwinds the event or the state.
        let notification = ChangeNotification {
            previous,
            current: observation,
        };

        match self.notifier.notify_change(&notification).await {
            Ok(report) => {
                for failure in &report.failed {
                    warn!(
                        recipient = %failure.recipient,
                        error = %failure.error,
                        "notification not delivered to recipient"
                    );
                }
                self.emit_event(EngineEvent::NotificationSent {
                    delivered: report.delivered.len(),
                    failed: report.failed.len(),
                });
                if report.delivered.is_empty() {
                    let error = "no recipient accepted the notification".to_string();
                    Ok(TickOutcome::ChangedNotifyFailed { event, error })
                } else {
                    Ok(TickOutcome::ChangedAndNotified { event, report })
                }
            }
            Err(err) => {
                warn!(error = %err, "notification delivery failed");
                self.emit_event(EngineEvent::NotificationFailed {
                    error: err.to_string(),
                });
                Ok(TickOutcome::ChangedNotifyFailed {
                    event,
                    error: err.to_string(),
                })
            }
        }
    }

    /// Run one digest over `from <= timestamp < to`.
    ///
    /// An empty window sends nothing and succeeds.
    pub async fn run_digest(
        &self,
        from: chrono::DateTime<chrono::Utc>,
        to: chrono::DateTime<chrono::Utc>,
    ) -> Result<DigestOutcome> {
        let events = self.event_log.query_range(from, to).await?;

        if events.is_empty() {
            debug!(%from, %to, "digest window empty, nothing to send");
            self.emit_event(EngineEvent::DigestSkipped);
            return Ok(DigestOutcome::Empty);
        }

        let digest = DigestNotification {
            from,
            to,
            events: events.clone(),
        };

        let report = self.notifier.notify_digest(&digest).await?;
        info!(
            events = events.len(),
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "digest sent"
        );
        self.emit_event(EngineEvent::DigestSent {
            events: events.len(),
            delivered: report.delivered.len(),
        });

        Ok(DigestOutcome::Sent {
            events: events.len(),
            report,
        })
    }

    /// Flush buffered state before exiting
    pub async fn flush(&self) -> Result<()> {
        self.state_store.flush().await
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        // Send event, logging if the channel is full (no consumer, or a slow
        // one). The pipeline never blocks on monitoring.
        if self.event_tx.try_send(event).is_err() {
            warn!("engine event channel full, dropping event");
        }
    }
}
