//! Configuration types for the ipwatch system
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};

use crate::detect::ChangeKey;

/// Main monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Upstream resolver configuration
    pub resolver: ResolverConfig,

    /// Last-known-state store configuration
    pub state_store: StateStoreConfig,

    /// Change event log configuration
    pub event_log: EventLogConfig,

    /// Notification recipients (at least one required)
    pub recipients: Vec<String>,

    /// Which observation fields participate in change comparison
    #[serde(default)]
    pub change_key: ChangeKey,

    /// Scheduling cadences
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl MonitorConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.recipients.is_empty() {
            return Err(crate::Error::config("no notification recipients configured"));
        }
        self.resolver.validate()?;
        self.schedule.validate()?;
        Ok(())
    }
}

/// Upstream resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// URL of the address-lookup service
    pub url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Retry policy for transient upstream failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl ResolverConfig {
    /// Validate the resolver configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.url.is_empty() {
            return Err(crate::Error::config("resolver URL cannot be empty"));
        }
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(crate::Error::config(format!(
                "resolver URL must use HTTP or HTTPS scheme, got: {}",
                self.url
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(crate::Error::config("retry max_attempts must be at least 1"));
        }
        Ok(())
    }
}

/// Retry/backoff policy knobs, consumed by [`crate::Resolver`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first (default 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay in seconds; attempt n waits base * 2^n
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base_secs(),
        }
    }
}

/// State store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateStoreConfig {
    /// File-based state store with atomic replace
    File {
        /// Path to the state file
        path: String,
    },

    /// In-memory state store (not persistent; every restart is a first run)
    #[default]
    Memory,
}

/// Event log configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventLogConfig {
    /// SQLite-backed append-only log
    Sqlite {
        /// Path to the database file
        path: String,
    },

    /// In-memory log (not persistent)
    #[default]
    Memory,
}

/// Scheduling cadences for the two periodic jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Check job interval in seconds
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,

    /// Digest job cadence as a 5-field cron expression, UTC
    #[serde(default = "default_digest_cron")]
    pub digest_cron: String,

    /// Trailing window the digest reports over, in days
    #[serde(default = "default_digest_window_days")]
    pub digest_window_days: u32,
}

impl ScheduleConfig {
    /// Validate the schedule configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.check_interval_secs == 0 {
            return Err(crate::Error::config("check interval must be > 0"));
        }
        if self.digest_window_days == 0 {
            return Err(crate::Error::config("digest window must be > 0 days"));
        }
        crate::scheduler::parse_cron(&self.digest_cron)?;
        Ok(())
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval_secs(),
            digest_cron: default_digest_cron(),
            digest_window_days: default_digest_window_days(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the internal event channel.
    ///
    /// When full, new engine events are dropped (with a warning log).
    /// This prevents unbounded memory growth if no consumer is attached.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_base_secs() -> u64 {
    1
}

fn default_check_interval_secs() -> u64 {
    300
}

fn default_digest_cron() -> String {
    // Monday 08:00 UTC
    "0 8 * * 1".to_string()
}

fn default_digest_window_days() -> u32 {
    7
}

fn default_event_channel_capacity() -> usize {
    1000
}
