//! Test doubles and common utilities for the contract tests
//!
//! Doubles are deliberately minimal: they count calls, replay scripted
//! responses, and record what the engine handed them, without any real I/O.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use ipwatch_core::config::{
    EngineConfig, EventLogConfig, MonitorConfig, ResolverConfig, RetryConfig, ScheduleConfig,
    StateStoreConfig,
};
use ipwatch_core::error::{DeliveryError, UpstreamError};
use ipwatch_core::traits::{
    AddressObservation, AddressSource, ChangeNotification, DeliveryReport, DigestNotification,
    Notifier, RecipientFailure,
};
use ipwatch_core::{ChangeKey, Error};

/// One scripted upstream response
pub enum Scripted {
    /// Succeed with this address
    Ok(&'static str),
    /// Fail with a transient error
    Transient,
    /// Fail with a rate-limit error carrying no server hint
    RateLimited,
    /// Fail with a rate-limit error carrying an advised wait
    RateLimitedAfter(std::time::Duration),
    /// Fail permanently
    Permanent,
}

/// An address source that replays a scripted sequence of responses.
///
/// Once the script is exhausted the last `Ok` address (or a transient
/// failure) repeats, so long-running scheduler tests stay deterministic.
pub struct ScriptedAddressSource {
    script: std::sync::Mutex<VecDeque<Scripted>>,
    fallback: std::sync::Mutex<Option<&'static str>>,
    fetch_count: Arc<AtomicUsize>,
}

impl ScriptedAddressSource {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: std::sync::Mutex::new(script.into()),
            fallback: std::sync::Mutex::new(None),
            fetch_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of fetch attempts made so far
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// Shared counter handle, for asserting after the source is boxed
    pub fn fetch_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.fetch_count)
    }

    fn observation(addr: &str) -> AddressObservation {
        AddressObservation::new(addr.parse().unwrap()).with_location(
            Some("Lisbon".to_string()),
            None,
            Some("Portugal".to_string()),
        )
    }
}

#[async_trait]
impl AddressSource for ScriptedAddressSource {
    async fn fetch(&self) -> Result<AddressObservation, UpstreamError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Ok(addr)) => {
                *self.fallback.lock().unwrap() = Some(addr);
                Ok(Self::observation(addr))
            }
            Some(Scripted::Transient) => Err(UpstreamError::transient("scripted 503")),
            Some(Scripted::RateLimited) => Err(UpstreamError::rate_limited("scripted 429", None)),
            Some(Scripted::RateLimitedAfter(wait)) => {
                Err(UpstreamError::rate_limited("scripted 429", Some(wait)))
            }
            Some(Scripted::Permanent) => Err(UpstreamError::permanent("scripted bad payload")),
            None => match *self.fallback.lock().unwrap() {
                Some(addr) => Ok(Self::observation(addr)),
                None => Err(UpstreamError::transient("script exhausted")),
            },
        }
    }

    fn source_name(&self) -> &'static str {
        "scripted"
    }
}

/// How the recording notifier responds to delivery requests
#[derive(Clone)]
pub enum DeliveryMode {
    /// Every recipient accepted
    Success,
    /// `Err` from the trait: nothing delivered at all
    TotalFailure,
    /// Named recipients fail, the rest succeed
    Partial(Vec<String>),
}

/// A notifier that records every request it receives.
#[derive(Clone)]
pub struct RecordingNotifier {
    recipients: Vec<String>,
    mode: DeliveryMode,
    changes: Arc<std::sync::Mutex<Vec<ChangeNotification>>>,
    digests: Arc<std::sync::Mutex<Vec<DigestNotification>>>,
}

impl RecordingNotifier {
    pub fn new(recipients: Vec<String>, mode: DeliveryMode) -> Self {
        Self {
            recipients,
            mode,
            changes: Arc::new(std::sync::Mutex::new(Vec::new())),
            digests: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    /// Change notifications received so far
    pub fn changes(&self) -> Vec<ChangeNotification> {
        self.changes.lock().unwrap().clone()
    }

    /// Digest notifications received so far
    pub fn digests(&self) -> Vec<DigestNotification> {
        self.digests.lock().unwrap().clone()
    }

    fn report(&self) -> Result<DeliveryReport, Error> {
        match &self.mode {
            DeliveryMode::Success => Ok(DeliveryReport {
                delivered: self.recipients.clone(),
                failed: Vec::new(),
            }),
            DeliveryMode::TotalFailure => Err(Error::Delivery(DeliveryError::Connection(
                "relay unreachable".to_string(),
            ))),
            DeliveryMode::Partial(failing) => {
                let mut report = DeliveryReport::default();
                for recipient in &self.recipients {
                    if failing.contains(recipient) {
                        report.failed.push(RecipientFailure {
                            recipient: recipient.clone(),
                            error: DeliveryError::Protocol("mailbox unavailable".to_string()),
                        });
                    } else {
                        report.delivered.push(recipient.clone());
                    }
                }
                Ok(report)
            }
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_change(&self, change: &ChangeNotification) -> Result<DeliveryReport, Error> {
        self.changes.lock().unwrap().push(change.clone());
        self.report()
    }

    async fn notify_digest(&self, digest: &DigestNotification) -> Result<DeliveryReport, Error> {
        self.digests.lock().unwrap().push(digest.clone());
        self.report()
    }
}

/// Minimal config: zero backoff so retry tests never sleep.
pub fn test_config() -> MonitorConfig {
    MonitorConfig {
        resolver: ResolverConfig {
            url: "https://lookup.test/json".to_string(),
            request_timeout_secs: 1,
            retry: RetryConfig {
                max_attempts: 5,
                backoff_base_secs: 0,
            },
        },
        state_store: StateStoreConfig::Memory,
        event_log: EventLogConfig::Memory,
        recipients: vec!["ops@example.com".to_string()],
        change_key: ChangeKey::Address,
        schedule: ScheduleConfig::default(),
        engine: EngineConfig {
            event_channel_capacity: 100,
        },
    }
}
