// # State Store Trait
//
// Defines the interface for the durable last-known-value record.
//
// ## Purpose
//
// The state store makes change detection crash-safe: the engine reads the
// last committed observation at the top of every tick, compares, and only
// overwrites it after the corresponding change event has been appended.
//
// `None` on first-ever run is a normal condition, not an error; the change
// detector treats it as "always changed".
//
// ## Implementations
//
// - File-based with atomic replace: [`crate::state::FileStateStore`]
// - In-memory: [`crate::state::MemoryStateStore`]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::traits::address_source::AddressObservation;

/// The single persisted last-known value.
///
/// The full observation is kept (not just the address) so that either
/// comparison key works and notifications can reference the previous
/// location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastKnownState {
    /// Address of the most recent committed change
    pub address: IpAddr,
    /// City at the time of the last change, if known
    pub city: Option<String>,
    /// Region at the time of the last change, if known
    pub region: Option<String>,
    /// Country at the time of the last change, if known
    pub country: Option<String>,
    /// When this state was committed
    pub updated_at: DateTime<Utc>,
}

impl From<&AddressObservation> for LastKnownState {
    fn from(obs: &AddressObservation) -> Self {
        Self {
            address: obs.address,
            city: obs.city.clone(),
            region: obs.region.clone(),
            country: obs.country.clone(),
            updated_at: obs.observed_at,
        }
    }
}

/// Trait for state store implementations.
///
/// All methods must be safe to call concurrently from multiple tasks, but
/// the system assumes exactly one active scheduler instance per store: the
/// read-compare-write sequence is serialized by the engine, not by the
/// store. `store()` must be atomic with respect to crashes — after a
/// restart either the old or the new value is observable, never a torn one.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the last committed state.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(state))`: The last committed value
    /// - `Ok(None)`: First-ever run, nothing committed yet
    /// - `Err(Error)`: Storage error
    async fn load(&self) -> Result<Option<LastKnownState>, crate::Error>;

    /// Overwrite the last committed state. Crash-atomic.
    async fn store(&self, state: &LastKnownState) -> Result<(), crate::Error>;

    /// Persist any buffered writes. Called once on clean shutdown.
    async fn flush(&self) -> Result<(), crate::Error>;
}
