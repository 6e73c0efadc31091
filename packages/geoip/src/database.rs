//! The point-lookup capability behind the resolver.
//!
//! A [`GeoDatabase`] answers one question: what geographic record, if
//! any, is associated with an address. Implementations must be safe to
//! query from many threads at once; the handle is opened once and shared.

use std::net::IpAddr;

use serde::Serialize;
use stream_atlas_geoip_models::GeoLocation;

/// A raw database hit. Every field is independently optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoRecord {
    /// Latitude (WGS84).
    pub latitude: Option<f64>,
    /// Longitude (WGS84).
    pub longitude: Option<f64>,
    /// City name (English).
    pub city: Option<String>,
    /// First-level subdivision name (English).
    pub region: Option<String>,
    /// ISO 3166-1 alpha-2 country code.
    pub country_code: Option<String>,
}

impl GeoRecord {
    /// Converts the record into a [`GeoLocation`].
    ///
    /// Returns `None` unless both coordinates are present and finite.
    #[must_use]
    pub fn into_location(self) -> Option<GeoLocation> {
        let latitude = self.latitude.filter(|v| v.is_finite())?;
        let longitude = self.longitude.filter(|v| v.is_finite())?;

        Some(GeoLocation {
            latitude,
            longitude,
            city: self.city,
            region: self.region,
            country_code: self.country_code,
        })
    }
}

/// Descriptive metadata about an open database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseInfo {
    /// Database type (e.g., `"GeoLite2-City"`).
    pub database_type: String,
    /// Build time as seconds since the Unix epoch.
    pub build_epoch: u64,
}

/// A lookup failed inside the database (corrupt entry, decode failure).
#[derive(Debug, Clone, thiserror::Error)]
#[error("GeoIP lookup failed: {message}")]
pub struct LookupError {
    /// Description of the failure.
    pub message: String,
}

/// Read-only geographic point lookup.
pub trait GeoDatabase: Send + Sync {
    /// Looks up the record associated with `ip`.
    ///
    /// Returns `Ok(None)` on a definitive miss.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError`] if the database could not answer.
    fn lookup(&self, ip: IpAddr) -> Result<Option<GeoRecord>, LookupError>;

    /// Returns metadata describing the database.
    fn info(&self) -> DatabaseInfo;
}
