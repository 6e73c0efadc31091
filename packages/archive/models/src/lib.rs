#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Raw streaming-history records and extraction report types.
//!
//! These types have no I/O dependencies so that the pipeline, analytics
//! and server crates can share them without pulling in the ZIP reader.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use stream_atlas_geoip_models::AddressKey;
use strum_macros::{AsRefStr, Display};

/// Default record fields that may hold the client IP address, checked in
/// order.
pub const DEFAULT_ADDRESS_FIELDS: &[&str] = &["ip_addr", "ip_addr_decrypted"];

/// Position of a record inside the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSource {
    /// Index into [`ExtractionReport::entries`].
    pub entry: usize,
    /// Position of the record inside its entry's JSON array.
    pub index: usize,
}

/// One play-event record exactly as it appeared in the archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    /// Where the record came from.
    pub source: RecordSource,
    /// Normalized address found in the record, if any.
    pub address: Option<AddressKey>,
    /// Original fields, untouched.
    pub fields: Map<String, Value>,
}

impl RawRecord {
    /// Builds a record, detecting its address from the first matching
    /// field in `address_fields` that holds a non-empty string.
    #[must_use]
    pub fn new<S: AsRef<str>>(
        source: RecordSource,
        fields: Map<String, Value>,
        address_fields: &[S],
    ) -> Self {
        let address = address_fields.iter().find_map(|field| {
            fields
                .get(field.as_ref())
                .and_then(Value::as_str)
                .and_then(AddressKey::normalize)
        });

        Self {
            source,
            address,
            fields,
        }
    }

    /// Returns a string field.
    #[must_use]
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

/// An entry that could not be read or parsed. Extraction continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryFailure {
    /// Entry name inside the archive.
    pub name: String,
    /// Description of the failure.
    pub reason: String,
}

/// Why an entry was passed over without being an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SkipReason {
    /// The top-level JSON value was not an array.
    NotAnArray,
    /// The array held elements that were not JSON objects.
    NonObjectElements,
}

/// An entry (or part of one) that contributed nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedEntry {
    /// Entry name inside the archive.
    pub name: String,
    /// Why it was skipped.
    pub reason: SkipReason,
    /// Number of skipped values.
    pub count: usize,
}

/// Bookkeeping for one extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionReport {
    /// Names of entries that produced records, indexed by
    /// [`RecordSource::entry`].
    pub entries: Vec<String>,
    /// Entries that failed to read or parse.
    pub failed_entries: Vec<EntryFailure>,
    /// Entries or elements passed over.
    pub skipped_entries: Vec<SkippedEntry>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    const SOURCE: RecordSource = RecordSource { entry: 0, index: 0 };

    #[test]
    fn detects_primary_address_field() {
        let record = RawRecord::new(
            SOURCE,
            fields(json!({"ip_addr": " 8.8.8.8 ", "ms_played": 1000})),
            DEFAULT_ADDRESS_FIELDS,
        );
        assert_eq!(record.address.unwrap().as_str(), "8.8.8.8");
    }

    #[test]
    fn falls_back_to_legacy_address_field() {
        let record = RawRecord::new(
            SOURCE,
            fields(json!({"ip_addr_decrypted": "1.1.1.1"})),
            DEFAULT_ADDRESS_FIELDS,
        );
        assert_eq!(record.address.unwrap().as_str(), "1.1.1.1");
    }

    #[test]
    fn ignores_empty_and_non_string_addresses() {
        for value in [json!({"ip_addr": ""}), json!({"ip_addr": 42}), json!({})] {
            let record = RawRecord::new(SOURCE, fields(value), DEFAULT_ADDRESS_FIELDS);
            assert!(record.address.is_none());
        }
    }

    #[test]
    fn skip_reasons_display_like_their_wire_names() {
        for reason in [SkipReason::NotAnArray, SkipReason::NonObjectElements] {
            assert_eq!(json!(reason), json!(reason.to_string()));
        }
        assert_eq!(SkipReason::NotAnArray.to_string(), "not-an-array");
    }

    #[test]
    fn keeps_fields_verbatim() {
        let original = fields(json!({"ip_addr": "8.8.8.8", "skipped": null, "ts": "2024-01-01T00:00:00Z"}));
        let record = RawRecord::new(SOURCE, original.clone(), DEFAULT_ADDRESS_FIELDS);
        assert_eq!(record.fields, original);
    }
}
