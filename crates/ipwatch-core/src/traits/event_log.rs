// # Event Log Trait
//
// Defines the interface for the append-only record of confirmed changes.
//
// ## Purpose
//
// Every committed change produces exactly one `ChangeEvent`. Append is the
// only mutation; no update or delete path exists in the domain. Queries are
// finite, restartable, and safe to re-issue — no cursor state leaks across
// calls. A query running concurrently with an append may see or miss the
// new row (read-committed), but never a partially written one.
//
// ## Implementations
//
// - SQLite-backed: `ipwatch-log-sqlite` crate
// - In-memory: [`crate::events::MemoryEventLog`]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::traits::address_source::AddressObservation;

/// A confirmed change, not yet assigned a surrogate id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChangeEvent {
    /// When the change was observed
    pub timestamp: DateTime<Utc>,
    /// The new address
    pub address: IpAddr,
    /// City at observation time, if known
    pub city: Option<String>,
    /// Region at observation time, if known
    pub region: Option<String>,
    /// Country at observation time, if known
    pub country: Option<String>,
}

impl From<&AddressObservation> for NewChangeEvent {
    fn from(obs: &AddressObservation) -> Self {
        Self {
            timestamp: obs.observed_at,
            address: obs.address,
            city: obs.city.clone(),
            region: obs.region.clone(),
            country: obs.country.clone(),
        }
    }
}

/// A recorded change, as stored: surrogate id plus the observed fields.
/// Never updated or deleted once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Surrogate key assigned by the log on append
    pub id: i64,
    /// When the change was observed
    pub timestamp: DateTime<Utc>,
    /// The new address
    pub address: IpAddr,
    /// City at observation time, if known
    pub city: Option<String>,
    /// Region at observation time, if known
    pub region: Option<String>,
    /// Country at observation time, if known
    pub country: Option<String>,
}

impl ChangeEvent {
    /// "City, Region, Country" with absent fields skipped, or "unknown"
    pub fn location_summary(&self) -> String {
        let parts: Vec<&str> = [&self.city, &self.region, &self.country]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect();
        if parts.is_empty() {
            "unknown".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Trait for event log implementations.
///
/// Assumes at most one writer (the single scheduler instance); queries may
/// run concurrently with an append.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append a confirmed change and return it with its assigned id.
    ///
    /// Must not be retried blindly after an ambiguous failure — the caller
    /// re-reads current state on the next tick instead, to avoid duplicate
    /// events.
    async fn append(&self, event: NewChangeEvent) -> Result<ChangeEvent, crate::Error>;

    /// Events with `from <= timestamp < to`, ascending by timestamp.
    async fn query_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ChangeEvent>, crate::Error>;

    /// The newest `limit` events, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<ChangeEvent>, crate::Error>;

    /// Every event recording the given address, newest first.
    async fn find_address(&self, address: IpAddr) -> Result<Vec<ChangeEvent>, crate::Error>;

    /// Total number of recorded changes.
    async fn count(&self) -> Result<u64, crate::Error>;

    /// Number of distinct addresses ever recorded.
    async fn distinct_address_count(&self) -> Result<u64, crate::Error>;
}
