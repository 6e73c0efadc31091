//! Final counts and terminal state of a run.

use std::collections::BTreeMap;

use stream_atlas_archive::ArchiveError;
use stream_atlas_archive_models::ExtractionReport;
use stream_atlas_enrich_models::{EnrichedRecord, PipelineResult, RunOutcome};
use stream_atlas_geoip_models::{AddressKey, ResolutionOutcome};
use thiserror::Error;

/// Terminal, user-visible failures of a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The archive could not be opened at all.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// The archive held no records.
    #[error("File processed, but no valid data could be extracted.")]
    NoRecordsFound,

    /// Records were found but none carries an IP address.
    #[error("File processed, but none of the {records} records contain an IP address.")]
    NoAddressesFound {
        /// Records extracted.
        records: usize,
    },

    /// No address could be geolocated.
    #[error("File processed, but no valid, geolocatable IP addresses were found.")]
    AllResolutionsFailed {
        /// Unique addresses submitted.
        addresses: usize,
    },
}

impl PipelineError {
    /// Longer explanation suitable for an error response's `details`.
    #[must_use]
    pub fn details(&self) -> String {
        match self {
            Self::Archive(e) => format!("The upload could not be read as a ZIP archive: {e}"),
            Self::NoRecordsFound => {
                "Check that the ZIP contains JSON files and they are correctly formatted."
                    .to_string()
            }
            Self::NoAddressesFound { records } => {
                format!("Out of {records} records, none has an ip_addr field.")
            }
            Self::AllResolutionsFailed { addresses } => format!(
                "Out of {addresses} unique IP addresses, none matched a public GeoIP address."
            ),
        }
    }
}

/// Assembles the result of a run from its parts.
#[must_use]
pub fn build_result(
    enriched_records: Vec<EnrichedRecord>,
    outcomes: &BTreeMap<AddressKey, ResolutionOutcome>,
    extraction: ExtractionReport,
) -> PipelineResult {
    let resolved_count = outcomes.values().filter(|o| o.is_resolved()).count();

    PipelineResult {
        total_records: enriched_records.len(),
        enriched_records,
        total_addresses: outcomes.len(),
        resolved_count,
        failed_count: outcomes.len() - resolved_count,
        failed_entries: extraction.failed_entries,
        skipped_entries: extraction.skipped_entries,
    }
}

/// Classifies a result, turning the terminal failure states into errors.
///
/// # Errors
///
/// Returns [`PipelineError::NoRecordsFound`],
/// [`PipelineError::NoAddressesFound`] or
/// [`PipelineError::AllResolutionsFailed`] for runs that produced nothing
/// useful.
pub fn report(result: PipelineResult) -> Result<PipelineResult, PipelineError> {
    match result.outcome() {
        RunOutcome::EmptyInput => Err(PipelineError::NoRecordsFound),
        RunOutcome::NoResolvableAddresses => Err(PipelineError::NoAddressesFound {
            records: result.total_records,
        }),
        RunOutcome::AllFailed => Err(PipelineError::AllResolutionsFailed {
            addresses: result.total_addresses,
        }),
        RunOutcome::Partial => {
            log::warn!("{}", result.status_message());
            Ok(result)
        }
        RunOutcome::Complete => {
            log::info!("{}", result.status_message());
            Ok(result)
        }
    }
}
