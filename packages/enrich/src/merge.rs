//! Joins resolution outcomes back onto records.

use std::collections::BTreeMap;

use stream_atlas_archive_models::RawRecord;
use stream_atlas_enrich_models::EnrichedRecord;
use stream_atlas_geoip_models::{AddressKey, ResolutionOutcome};

/// Attaches each record's outcome, producing exactly one output per input
/// in the same order.
///
/// Records without an address, or whose address has no outcome, get
/// `outcome: None`. Nothing is dropped.
#[must_use]
pub fn merge(
    records: Vec<RawRecord>,
    outcomes: &BTreeMap<AddressKey, ResolutionOutcome>,
) -> Vec<EnrichedRecord> {
    records
        .into_iter()
        .map(|record| {
            let outcome = record
                .address
                .as_ref()
                .and_then(|address| outcomes.get(address))
                .cloned();

            EnrichedRecord {
                source: record.source,
                record: record.fields,
                address: record.address,
                outcome,
            }
        })
        .collect()
}
