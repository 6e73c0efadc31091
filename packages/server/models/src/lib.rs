#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! HTTP request and response types for the stream atlas server.
//!
//! The lookup types double as the wire format for remote chunk
//! resolution, so the enrichment pipeline depends on this crate too.

use serde::{Deserialize, Serialize};
use stream_atlas_analytics_models::ListeningSummary;
use stream_atlas_enrich_models::PipelineResult;
use stream_atlas_geoip_models::GeoLocation;

/// `POST /api/lookup` request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupRequest {
    /// Addresses to resolve.
    pub ips: Vec<String>,
}

/// One resolved address in a [`LookupResponse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupResult {
    /// The address as submitted.
    pub ip: String,
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// City name, or `null`.
    pub city: Option<String>,
    /// ISO country code, or `null`.
    pub country: Option<String>,
    /// First-level subdivision name, or `null`.
    #[serde(default)]
    pub region: Option<String>,
}

impl LookupResult {
    /// Builds a result for `ip` from a resolved location.
    #[must_use]
    pub fn new(ip: impl Into<String>, location: &GeoLocation) -> Self {
        Self {
            ip: ip.into(),
            latitude: location.latitude,
            longitude: location.longitude,
            city: location.city.clone(),
            country: location.country_code.clone(),
            region: location.region.clone(),
        }
    }

    /// Converts back into a location.
    #[must_use]
    pub fn into_location(self) -> GeoLocation {
        GeoLocation {
            latitude: self.latitude,
            longitude: self.longitude,
            city: self.city,
            region: self.region,
            country_code: self.country,
        }
    }
}

/// `POST /api/lookup` response body. Addresses that did not resolve are
/// absent from `results`.
///
/// The unresolved reason is not carried: a private, malformed, missing or
/// failed (`lookup-error`) address is simply absent, and remote callers
/// record every absent address as `not-found`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupResponse {
    /// Resolved addresses.
    pub results: Vec<LookupResult>,
    /// Number of entries in `results`.
    pub count: usize,
}

/// `POST /api/enrich` response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichResponse {
    /// Pipeline output.
    #[serde(flatten)]
    pub result: PipelineResult,
    /// Listening statistics over the enriched records.
    pub summary: ListeningSummary,
    /// Human-readable status line.
    pub message: String,
}

/// `GET /api/health` response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Always `true` when the server is answering.
    pub healthy: bool,
    /// Server version.
    pub version: String,
    /// Database type from the GeoIP metadata.
    pub database_type: String,
    /// Database build time (seconds since the Unix epoch).
    pub database_build_epoch: u64,
}

/// Error body returned with 4xx/5xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Short error message.
    pub error: String,
    /// Longer explanation, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    /// Builds an error with details.
    #[must_use]
    pub fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}
