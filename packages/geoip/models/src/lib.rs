#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Address keys and geolocation outcome types.
//!
//! An [`AddressKey`] is the normalized form of an IP address string found
//! in a streaming-history record. It is the deduplication key for batch
//! resolution and the join key when outcomes are merged back onto the
//! records. Every key resolves to exactly one [`ResolutionOutcome`].

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A normalized IP address string.
///
/// Textual variants of the same address (`2001:DB8::1`, `2001:db8:0::1`,
/// `" 8.8.8.8 "`) normalize to the same key. Text that does not parse as
/// an address is kept trimmed so that it still receives an outcome.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddressKey(String);

impl AddressKey {
    /// Normalizes a raw address string into a key.
    ///
    /// Returns `None` if the input is empty after trimming.
    #[must_use]
    pub fn normalize(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let unbracketed = trimmed
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .unwrap_or(trimmed)
            .trim();

        if unbracketed.is_empty() {
            return None;
        }

        Some(unbracketed.parse::<IpAddr>().map_or_else(
            |_| Self(unbracketed.to_string()),
            |ip| Self(ip.to_string()),
        ))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses the key as an IP address.
    ///
    /// Returns `None` for keys built from malformed input.
    #[must_use]
    pub fn ip(&self) -> Option<IpAddr> {
        self.0.parse().ok()
    }
}

impl From<IpAddr> for AddressKey {
    fn from(ip: IpAddr) -> Self {
        Self(ip.to_string())
    }
}

impl std::fmt::Display for AddressKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AddressKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Approximate location of a resolved address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoLocation {
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// City name (English), if known.
    pub city: Option<String>,
    /// First-level subdivision name (English), if known.
    pub region: Option<String>,
    /// ISO 3166-1 alpha-2 country code, if known.
    pub country_code: Option<String>,
}

/// Why an address could not be resolved.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum UnresolvedReason {
    /// The address lies in a private, loopback, link-local or otherwise
    /// reserved range. The database is never consulted.
    PrivateOrReserved,
    /// The text is not a syntactically valid IPv4 or IPv6 address.
    Malformed,
    /// The database has no usable record for the address.
    NotFound,
    /// The lookup failed (database error, chunk transport failure, or
    /// timeout).
    LookupError,
}

/// Terminal outcome of resolving one [`AddressKey`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ResolutionOutcome {
    /// The address was located.
    Resolved(GeoLocation),
    /// The address could not be located.
    Unresolved {
        /// Classification of the failure.
        reason: UnresolvedReason,
    },
}

impl ResolutionOutcome {
    /// Shorthand for an [`ResolutionOutcome::Unresolved`] outcome.
    #[must_use]
    pub const fn unresolved(reason: UnresolvedReason) -> Self {
        Self::Unresolved { reason }
    }

    /// Returns `true` if the address was located.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    /// Returns the location for a resolved outcome.
    #[must_use]
    pub const fn location(&self) -> Option<&GeoLocation> {
        match self {
            Self::Resolved(location) => Some(location),
            Self::Unresolved { .. } => None,
        }
    }

    /// Returns the failure reason for an unresolved outcome.
    #[must_use]
    pub const fn reason(&self) -> Option<UnresolvedReason> {
        match self {
            Self::Resolved(_) => None,
            Self::Unresolved { reason } => Some(*reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_whitespace_and_case() {
        let a = AddressKey::normalize(" 2001:DB8::1 ").unwrap();
        let b = AddressKey::normalize("2001:db8:0::1").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "2001:db8::1");
    }

    #[test]
    fn strips_brackets_from_ipv6() {
        let key = AddressKey::normalize("[::ffff:8.8.8.8]").unwrap();
        assert_eq!(key.as_str(), "::ffff:8.8.8.8");
        assert!(key.ip().is_some());
    }

    #[test]
    fn keeps_malformed_text_as_key() {
        let key = AddressKey::normalize("  not-an-ip ").unwrap();
        assert_eq!(key.as_str(), "not-an-ip");
        assert!(key.ip().is_none());
    }

    #[test]
    fn rejects_empty_input() {
        assert!(AddressKey::normalize("").is_none());
        assert!(AddressKey::normalize("   ").is_none());
        assert!(AddressKey::normalize("[]").is_none());
    }

    #[test]
    fn reason_display_is_kebab_case() {
        assert_eq!(
            UnresolvedReason::PrivateOrReserved.to_string(),
            "private-or-reserved"
        );
        assert_eq!(
            "lookup-error".parse::<UnresolvedReason>().unwrap(),
            UnresolvedReason::LookupError
        );
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let resolved = ResolutionOutcome::Resolved(GeoLocation {
            latitude: 37.751,
            longitude: -97.822,
            city: None,
            region: None,
            country_code: Some("US".to_string()),
        });
        let json = serde_json::to_value(&resolved).unwrap();
        assert_eq!(json["status"], "resolved");
        assert_eq!(json["countryCode"], "US");

        let unresolved = ResolutionOutcome::unresolved(UnresolvedReason::NotFound);
        let json = serde_json::to_value(&unresolved).unwrap();
        assert_eq!(json["status"], "unresolved");
        assert_eq!(json["reason"], "not-found");
    }
}
