#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Types shared between the enrichment pipeline and its consumers.
//!
//! [`BatchProgress`] and the [`progress::ProgressSink`] trait describe
//! incremental progress; [`EnrichedRecord`] and [`PipelineResult`] are the
//! pipeline's output.

pub mod progress;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum_macros::{AsRefStr, Display};
use stream_atlas_archive_models::{EntryFailure, RecordSource, SkippedEntry};
use stream_atlas_geoip_models::{AddressKey, GeoLocation, ResolutionOutcome};

/// Cumulative progress of a batch run, emitted after every chunk.
///
/// All three counters are non-decreasing across a run and
/// `failed_count <= processed_count <= total_count` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    /// Addresses with a terminal outcome so far.
    pub processed_count: usize,
    /// Unique addresses in the run.
    pub total_count: usize,
    /// Addresses whose outcome is unresolved so far.
    pub failed_count: usize,
}

impl BatchProgress {
    /// Progress at the start of a run over `total_count` addresses.
    #[must_use]
    pub const fn new(total_count: usize) -> Self {
        Self {
            processed_count: 0,
            total_count,
            failed_count: 0,
        }
    }

    /// Returns `true` once every address has an outcome.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.processed_count >= self.total_count
    }

    /// Addresses resolved so far.
    #[must_use]
    pub const fn resolved_count(&self) -> usize {
        self.processed_count.saturating_sub(self.failed_count)
    }

    /// Completed fraction in `0.0..=1.0`. An empty run is complete.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> f64 {
        if self.total_count == 0 {
            1.0
        } else {
            self.processed_count as f64 / self.total_count as f64
        }
    }
}

/// One input record with its enrichment attached.
///
/// The original fields are kept verbatim under `record`; enrichment lives
/// beside them so nothing in the source data is overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedRecord {
    /// Where the record came from.
    pub source: RecordSource,
    /// Original record fields.
    pub record: Map<String, Value>,
    /// Normalized address, if the record had one.
    pub address: Option<AddressKey>,
    /// Outcome for `address`; `None` when the record had no address.
    pub outcome: Option<ResolutionOutcome>,
}

impl EnrichedRecord {
    /// Location of the record, if its address was resolved.
    #[must_use]
    pub fn location(&self) -> Option<&GeoLocation> {
        self.outcome.as_ref().and_then(ResolutionOutcome::location)
    }

    /// Returns a string field of the original record.
    #[must_use]
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.record.get(name).and_then(Value::as_str)
    }

    /// Returns a field of the original record.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.record.get(name)
    }
}

/// Terminal classification of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RunOutcome {
    /// The archive held no records.
    EmptyInput,
    /// Records exist but none carries an address.
    NoResolvableAddresses,
    /// Addresses exist but none resolved.
    AllFailed,
    /// Some addresses resolved, some did not.
    Partial,
    /// Every address resolved.
    Complete,
}

impl RunOutcome {
    /// Classifies a run from its counts.
    #[must_use]
    pub const fn classify(total_records: usize, total_addresses: usize, resolved: usize) -> Self {
        if total_records == 0 {
            Self::EmptyInput
        } else if total_addresses == 0 {
            Self::NoResolvableAddresses
        } else if resolved == 0 {
            Self::AllFailed
        } else if resolved < total_addresses {
            Self::Partial
        } else {
            Self::Complete
        }
    }

    /// Returns `true` for outcomes that produce a result.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Partial | Self::Complete)
    }
}

/// Output of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    /// One entry per extracted record, in archive order.
    pub enriched_records: Vec<EnrichedRecord>,
    /// Records extracted from the archive.
    pub total_records: usize,
    /// Unique addresses submitted for resolution.
    pub total_addresses: usize,
    /// Unique addresses that resolved.
    pub resolved_count: usize,
    /// Unique addresses that did not resolve.
    pub failed_count: usize,
    /// Archive entries that could not be read or parsed.
    pub failed_entries: Vec<EntryFailure>,
    /// Archive entries (or elements) passed over.
    pub skipped_entries: Vec<SkippedEntry>,
}

impl PipelineResult {
    /// Classifies this result.
    #[must_use]
    pub const fn outcome(&self) -> RunOutcome {
        RunOutcome::classify(
            self.total_records,
            self.total_addresses,
            self.resolved_count,
        )
    }

    /// Human-readable one-line summary of the run.
    #[must_use]
    pub fn status_message(&self) -> String {
        let mut message = match self.outcome() {
            RunOutcome::EmptyInput => "No streaming history records found".to_string(),
            RunOutcome::NoResolvableAddresses => format!(
                "None of the {} records contain an IP address",
                self.total_records
            ),
            RunOutcome::AllFailed => format!(
                "Could not geolocate any of the {} IP addresses",
                self.total_addresses
            ),
            RunOutcome::Partial => format!(
                "Geolocated {} of {} IP addresses across {} records ({} could not be located)",
                self.resolved_count, self.total_addresses, self.total_records, self.failed_count
            ),
            RunOutcome::Complete => format!(
                "Geolocated all {} IP addresses across {} records",
                self.total_addresses, self.total_records
            ),
        };

        if !self.failed_entries.is_empty() {
            use std::fmt::Write as _;
            let _ = write!(
                message,
                "; {} file(s) in the archive could not be read",
                self.failed_entries.len()
            );
        }

        message
    }
}
