// # Address Source Trait
//
// Defines the interface for fetching the caller's current public address and
// its approximate geographic origin from an upstream lookup service.
//
// ## Implementations
//
// - HTTP-based: `ipwatch-resolver-http` crate
// - Scripted doubles for tests: `tests/common/mod.rs`
//
// ## Retry ownership
//
// A source performs exactly ONE attempt per `fetch()` call and classifies
// the failure. All retry and backoff decisions belong to [`crate::Resolver`];
// a source that sleeps or loops internally is wrong by construction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::error::UpstreamError;

/// One observation of the public address, produced fresh by each fetch.
///
/// Immutable value type; the location fields are informational and may be
/// absent when the upstream does not return them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressObservation {
    /// The observed public address
    pub address: IpAddr,
    /// City reported by the upstream, if any
    pub city: Option<String>,
    /// Region/state reported by the upstream, if any
    pub region: Option<String>,
    /// Country reported by the upstream, if any
    pub country: Option<String>,
    /// When the observation was made
    pub observed_at: DateTime<Utc>,
}

impl AddressObservation {
    /// Create an observation stamped with the current time
    pub fn new(address: IpAddr) -> Self {
        Self {
            address,
            city: None,
            region: None,
            country: None,
            observed_at: Utc::now(),
        }
    }

    /// Attach location fields
    pub fn with_location(
        mut self,
        city: Option<String>,
        region: Option<String>,
        country: Option<String>,
    ) -> Self {
        self.city = city;
        self.region = region;
        self.country = country;
        self
    }

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

/// Trait for upstream address-lookup implementations.
///
/// Implementations must be thread-safe and usable across async tasks. They
/// perform a single outbound request per call, with no side effects beyond
/// that request, and classify every failure as one of the
/// [`UpstreamError`] variants so the resolver can decide what to do next.
#[async_trait]
pub trait AddressSource: Send + Sync {
    /// Fetch the current public address and location. One attempt, no retry.
    ///
    /// # Returns
    ///
    /// - `Ok(AddressObservation)`: A fresh observation
    /// - `Err(UpstreamError)`: Classified failure for the retry policy
    async fn fetch(&self) -> Result<AddressObservation, UpstreamError>;

    /// Short name for logs ("http", "scripted", ...)
    fn source_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_summary_skips_missing_fields() {
        let obs = AddressObservation::new("1.2.3.4".parse().unwrap()).with_location(
            Some("Lisbon".to_string()),
            None,
            Some("Portugal".to_string()),
        );
        assert_eq!(obs.location_summary(), "Lisbon, Portugal");

        let bare = AddressObservation::new("1.2.3.4".parse().unwrap());
        assert_eq!(bare.location_summary(), "unknown");
    }
}
