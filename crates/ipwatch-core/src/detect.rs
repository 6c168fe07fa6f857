//! Change detector
//!
//! Pure comparison of a fresh observation against the last committed state.
//! No I/O, no side effects, deterministic given its inputs — the engine owns
//! when to call it and what to do with the decision.

use serde::{Deserialize, Serialize};

use crate::traits::address_source::AddressObservation;
use crate::traits::state_store::LastKnownState;

/// Which observation fields participate in the equality comparison.
///
/// Geolocation services can return different city/region strings for the
/// same address on repeated calls, so including location in the key can
/// manufacture spurious changes. Address-only is the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKey {
    /// Compare on the address alone (location fields are informational)
    #[default]
    Address,
    /// Compare on the full (address, city, region, country) tuple
    AddressAndLocation,
}

/// Outcome of one comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeDecision {
    /// The comparison key differs from the persisted state (or there is no
    /// persisted state yet) — record and notify
    Changed,
    /// The comparison key is identical — nothing to do
    Unchanged,
}

/// Compare a fresh observation against the last committed state.
///
/// `last == None` (first-ever run) always yields `Changed`.
pub fn compare(
    key: ChangeKey,
    current: &AddressObservation,
    last: Option<&LastKnownState>,
) -> ChangeDecision {
    let Some(last) = last else {
        return ChangeDecision::Changed;
    };

    let same = match key {
        ChangeKey::Address => current.address == last.address,
        ChangeKey::AddressAndLocation => {
            current.address == last.address
                && current.city == last.city
                && current.region == last.region
                && current.country == last.country
        }
    };

    if same {
        ChangeDecision::Unchanged
    } else {
        ChangeDecision::Changed
    }
}
