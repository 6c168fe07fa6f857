//! Retry policy and the resolver wrapper that applies it
//!
//! Exactly one backoff policy exists in the system, and it lives here —
//! address sources perform single attempts and classify failures; the
//! [`Resolver`] decides whether and when to try again.

use tracing::{debug, warn};

use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::UpstreamError;
use crate::traits::address_source::{AddressObservation, AddressSource};

/// Bounded exponential backoff.
///
/// Attempt `n` (zero-based) waits `base * 2^n` before the next try.
/// A rate-limited response overrides the computed delay with the
/// server-advised wait when one is present.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Base delay for the exponential schedule
    pub base_delay: Duration,
}

impl BackoffPolicy {
    /// Build from configuration
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_secs(config.backoff_base_secs),
        }
    }

    /// Delay before the attempt following zero-based attempt `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        // Saturate the shift so pathological attempt counts stay finite.
        let factor = 1u64 << attempt.min(16);
        self.base_delay.saturating_mul(factor as u32)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Wraps an [`AddressSource`] with the retry policy.
///
/// `Permanent` failures abort immediately. After exhausting attempts the
/// last classified error is surfaced; the caller must not treat an unknown
/// value as a change.
pub struct Resolver {
    source: Box<dyn AddressSource>,
    policy: BackoffPolicy,
}

impl Resolver {
    /// Wrap a source with a policy
    pub fn new(source: Box<dyn AddressSource>, policy: BackoffPolicy) -> Self {
        Self { source, policy }
    }

    /// Fetch the current observation, retrying per the policy.
    pub async fn resolve(&self) -> Result<AddressObservation, UpstreamError> {
        let mut last_error = None;

        for attempt in 0..self.policy.max_attempts {
            match self.source.fetch().await {
                Ok(observation) => {
                    debug!(
                        source = self.source.source_name(),
                        address = %observation.address,
                        attempt,
                        "upstream lookup succeeded"
                    );
                    return Ok(observation);
                }
                Err(err @ UpstreamError::Permanent(_)) => {
                    warn!(
                        source = self.source.source_name(),
                        error = %err,
                        "permanent upstream failure, not retrying"
                    );
                    return Err(err);
                }
                Err(err) => {
                    let is_last = attempt + 1 == self.policy.max_attempts;
                    warn!(
                        source = self.source.source_name(),
                        error = %err,
                        attempt,
                        "upstream attempt failed"
                    );

                    if !is_last {
                        let wait = match &err {
                            UpstreamError::RateLimited {
                                retry_after: Some(advised),
                                ..
                            } => *advised,
                            _ => self.policy.delay_for(attempt),
                        };
                        tokio::time::sleep(wait).await;
                    }
                    last_error = Some(err);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| UpstreamError::transient("no attempts were made")))
    }
}
