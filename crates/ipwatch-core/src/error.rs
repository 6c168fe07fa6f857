//! Error types for the ipwatch system
//!
//! One taxonomy, three layers: upstream lookup failures (retryable or not),
//! persistence failures, and delivery failures with per-recipient granularity.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for ipwatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure modes of the upstream address-lookup service.
///
/// Classification drives the retry policy: `Transient` backs off
/// exponentially, `RateLimited` waits the server-advised duration, and
/// `Permanent` aborts immediately.
#[derive(Error, Debug)]
pub enum UpstreamError {
    /// Recoverable failure (5xx, most 4xx, connect/read errors)
    #[error("transient upstream error: {0}")]
    Transient(String),

    /// 429-class response; `retry_after` carries the server hint if present
    #[error("rate limited by upstream: {message}")]
    RateLimited {
        /// Server-advised wait before the next attempt
        retry_after: Option<Duration>,
        /// Human-readable detail
        message: String,
    },

    /// Unrecoverable failure (malformed payload, unparsable address)
    #[error("permanent upstream error: {0}")]
    Permanent(String),
}

impl UpstreamError {
    /// Create a transient error
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Create a rate-limit error with an optional server-advised wait
    pub fn rate_limited(msg: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimited {
            retry_after,
            message: msg.into(),
        }
    }

    /// Create a permanent error
    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    /// True if the retry policy may attempt again after this failure
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Permanent(_))
    }
}

/// Failure modes of notification delivery.
///
/// The notifier does not retry internally; these are reported per recipient
/// so the caller can tell partial delivery from total failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Relay rejected the credential pair
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Could not reach or stay connected to the relay
    #[error("connection failed: {0}")]
    Connection(String),

    /// Relay rejected the message or the conversation broke mid-protocol
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Message body could not be rendered (unresolved placeholder);
    /// never retried and never sent with literal placeholder text
    #[error("template error: {0}")]
    Template(String),
}

/// Core error type for the ipwatch system
#[derive(Error, Debug)]
pub enum Error {
    /// Upstream address lookup failed after the retry policy was exhausted
    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// State store or event log failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Notification delivery failure affecting every recipient
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Configuration error (fatal at startup only)
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O errors from file-backed stores
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_errors_are_not_retryable() {
        assert!(UpstreamError::transient("503").is_retryable());
        assert!(UpstreamError::rate_limited("429", None).is_retryable());
        assert!(!UpstreamError::permanent("bad payload").is_retryable());
    }
}
