//! HTTP lookup of the current public address.
//!
//! Makes exactly one request per [`AddressSource::fetch`] call and classifies
//! every failure; retry pacing lives in the core resolver, not here.
//!
//! Two response shapes are accepted:
//! - JSON, as served by ipify (`{"ip": ...}`) or ip-api
//!   (`{"query": ..., "city": ..., "regionName": ..., "country": ...}`)
//! - Plain text containing just the address (ifconfig.me, icanhazip.com)

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use ipwatch_core::config::ResolverConfig;
use ipwatch_core::error::UpstreamError;
use ipwatch_core::traits::{AddressObservation, AddressSource};

/// Address source backed by a public HTTP lookup service.
pub struct HttpAddressSource {
    url: String,
    client: reqwest::Client,
}

/// Superset of the JSON payloads the supported services return.
///
/// ip-api sends both a region code (`region`) and a human-readable name
/// (`regionName`); they are kept as separate fields because serde treats an
/// alias colliding with a present field as a duplicate.
#[derive(Debug, Deserialize)]
struct LookupPayload {
    #[serde(alias = "query")]
    ip: String,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default, rename = "regionName")]
    region_name: Option<String>,
    #[serde(default)]
    country: Option<String>,
}


impl HttpAddressSource {
    /// Build a source from resolver configuration.
    pub fn from_config(config: &ResolverConfig) -> Result<Self, ipwatch_core::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ipwatch_core::Error::config(format!("http client: {}", e)))?;

        Ok(Self {
            url: config.url.clone(),
            client,
        })
    }

    pub fn new(url: String, client: reqwest::Client) -> Self {
        Self { url, client }
    }
}

#[async_trait]
impl AddressSource for HttpAddressSource {
    async fn fetch(&self) -> Result<AddressObservation, UpstreamError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| UpstreamError::transient(format!("request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = retry_after_hint(response.headers());
            return Err(UpstreamError::rate_limited(
                format!("rate limited by {}", self.url),
                retry_after,
            ));
        }
        if !status.is_success() {
            return Err(UpstreamError::transient(format!(
                "unexpected status {} from {}",
                status, self.url
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| UpstreamError::transient(format!("failed to read response: {}", e)))?;

        let observation = parse_body(&body)?;
        debug!(address = %observation.address, url = %self.url, "address resolved");
        Ok(observation)
    }

    fn source_name(&self) -> &'static str {
        "http"
    }
}

/// Seconds-valued `Retry-After` header, if the server sent one.
fn retry_after_hint(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Parse a lookup response body into an observation.
///
/// A well-formed response that does not contain a usable address is a
/// permanent error: the service will keep returning it, so retrying the same
/// URL cannot help.
fn parse_body(body: &str) -> Result<AddressObservation, UpstreamError> {
    if let Ok(payload) = serde_json::from_str::<LookupPayload>(body) {
        let address: IpAddr = payload.ip.trim().parse().map_err(|_| {
            UpstreamError::permanent(format!("unparsable address in payload: {}", payload.ip))
        })?;
        // Prefer the readable region name over the code
        let region = payload.region_name.or(payload.region);
        return Ok(AddressObservation::new(address).with_location(
            payload.city,
            region,
            payload.country,
        ));
    }

    // Plain-text services return the bare address with trailing whitespace
    let trimmed = body.trim();
    let address: IpAddr = trimmed.parse().map_err(|_| {
        UpstreamError::permanent(format!(
            "response is neither a known JSON shape nor a bare address: {:.120}",
            body
        ))
    })?;
    Ok(AddressObservation::new(address))
}
