#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Extraction of play-event records from streaming-history archives.
//!
//! A streaming-history export is a ZIP holding one or more JSON files,
//! each a JSON array of play-event objects. Extraction walks every entry,
//! keeps the `.json` ones (ignoring directories and macOS metadata), and
//! turns each array element into a [`RawRecord`]. The unique set of
//! addresses found across all records is collected alongside.
//!
//! A malformed entry fails on its own: it is logged and reported in
//! [`ExtractionReport::failed_entries`] while the remaining entries are
//! still extracted. Only a container that is not a readable ZIP at all
//! is a hard error.

use std::collections::BTreeSet;
use std::io::{Read, Seek};
use std::path::Path;

use serde_json::Value;
use stream_atlas_archive_models::{
    DEFAULT_ADDRESS_FIELDS, EntryFailure, ExtractionReport, RawRecord, RecordSource, SkipReason,
    SkippedEntry,
};
use stream_atlas_geoip_models::AddressKey;

/// Path component used by macOS for resource-fork metadata in ZIPs.
const MACOS_METADATA_DIR: &str = "__MACOSX";

/// Default cap on the uncompressed size of a single entry (512 MiB).
pub const DEFAULT_MAX_ENTRY_BYTES: u64 = 512 * 1024 * 1024;

/// UTF-8 byte order mark, tolerated at the start of an entry.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Errors that abort an extraction.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The container is not a readable ZIP archive.
    #[error("Invalid archive: {0}")]
    InvalidArchive(#[from] zip::result::ZipError),

    /// The archive file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Options controlling extraction.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Record fields that may hold the IP address, checked in order.
    pub address_fields: Vec<String>,
    /// Entries larger than this (uncompressed) are failed without being
    /// read.
    pub max_entry_bytes: u64,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            address_fields: DEFAULT_ADDRESS_FIELDS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            max_entry_bytes: DEFAULT_MAX_ENTRY_BYTES,
        }
    }
}

/// Whether an extraction produced anything worth resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStatus {
    /// No records at all.
    NoRecordsFound,
    /// Records exist but none carries an address.
    NoAddressesFound,
    /// At least one address was found.
    Ready,
}

/// Records and addresses extracted from an archive.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Every record, in archive order.
    pub records: Vec<RawRecord>,
    /// Unique addresses referenced by the records.
    pub addresses: BTreeSet<AddressKey>,
    /// Entry bookkeeping.
    pub report: ExtractionReport,
}

impl Extraction {
    /// Classifies the extraction.
    #[must_use]
    pub fn status(&self) -> ExtractionStatus {
        if self.records.is_empty() {
            ExtractionStatus::NoRecordsFound
        } else if self.addresses.is_empty() {
            ExtractionStatus::NoAddressesFound
        } else {
            ExtractionStatus::Ready
        }
    }

    /// Parses one JSON document and appends its records.
    ///
    /// Never fails: malformed JSON is recorded as an [`EntryFailure`] and a
    /// non-array document as a [`SkippedEntry`].
    pub fn ingest_entry(&mut self, name: &str, bytes: &[u8], options: &ExtractOptions) {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

        let value: Value = match serde_json::from_slice(bytes) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Skipping malformed entry {name}: {e}");
                self.report.failed_entries.push(EntryFailure {
                    name: name.to_string(),
                    reason: format!("invalid JSON: {e}"),
                });
                return;
            }
        };

        let Value::Array(items) = value else {
            log::debug!("Skipping {name}: top-level value is not an array");
            self.report.skipped_entries.push(SkippedEntry {
                name: name.to_string(),
                reason: SkipReason::NotAnArray,
                count: 1,
            });
            return;
        };

        let entry = self.report.entries.len();
        self.report.entries.push(name.to_string());

        let before = self.records.len();
        let mut non_objects = 0usize;

        for (index, item) in items.into_iter().enumerate() {
            let Value::Object(fields) = item else {
                non_objects += 1;
                continue;
            };

            let record = RawRecord::new(
                RecordSource { entry, index },
                fields,
                &options.address_fields,
            );
            if let Some(address) = &record.address {
                if !self.addresses.contains(address) {
                    self.addresses.insert(address.clone());
                }
            }
            self.records.push(record);
        }

        if non_objects > 0 {
            log::debug!("{name}: skipped {non_objects} non-object element(s)");
            self.report.skipped_entries.push(SkippedEntry {
                name: name.to_string(),
                reason: SkipReason::NonObjectElements,
                count: non_objects,
            });
        }

        log::debug!("{name}: {} record(s)", self.records.len() - before);
    }

    fn fail_entry(&mut self, name: String, reason: String) {
        log::warn!("Skipping unreadable entry {name}: {reason}");
        self.report.failed_entries.push(EntryFailure { name, reason });
    }
}

/// Returns `true` if an archive entry should be parsed.
///
/// Only files ending in `.json` (any case) qualify. Directories, anything
/// under `__MACOSX/`, and `._*` AppleDouble files are excluded.
#[must_use]
pub fn is_candidate_entry(name: &str, is_dir: bool) -> bool {
    if is_dir || name.ends_with('/') {
        return false;
    }

    if !name.to_ascii_lowercase().ends_with(".json") {
        return false;
    }

    let components: Vec<&str> = name.split(['/', '\\']).filter(|c| !c.is_empty()).collect();
    if components.contains(&MACOS_METADATA_DIR) {
        return false;
    }

    !components
        .last()
        .is_some_and(|file_name| file_name.starts_with("._"))
}

/// Extracts records from a ZIP archive.
///
/// # Errors
///
/// Returns [`ArchiveError::InvalidArchive`] if the container cannot be
/// opened as a ZIP. Individual entry failures do not abort extraction.
pub fn extract_archive<R: Read + Seek>(
    reader: R,
    options: &ExtractOptions,
) -> Result<Extraction, ArchiveError> {
    let mut archive = zip::ZipArchive::new(reader)?;
    let mut extraction = Extraction::default();

    log::info!("Reading archive with {} entries", archive.len());

    for i in 0..archive.len() {
        let mut file = match archive.by_index(i) {
            Ok(file) => file,
            Err(e) => {
                extraction.fail_entry(format!("#{i}"), e.to_string());
                continue;
            }
        };

        let name = file.name().to_string();
        if !is_candidate_entry(&name, file.is_dir()) {
            log::debug!("Ignoring entry {name}");
            continue;
        }

        if file.size() > options.max_entry_bytes {
            extraction.fail_entry(
                name,
                format!(
                    "entry is {} bytes, limit is {}",
                    file.size(),
                    options.max_entry_bytes
                ),
            );
            continue;
        }

        let mut bytes = Vec::with_capacity(usize::try_from(file.size()).unwrap_or_default());
        let read = (&mut file)
            .take(options.max_entry_bytes.saturating_add(1))
            .read_to_end(&mut bytes);
        drop(file);

        match read {
            Ok(len) if u64::try_from(len).unwrap_or(u64::MAX) > options.max_entry_bytes => {
                extraction.fail_entry(
                    name,
                    format!("entry exceeds {} bytes", options.max_entry_bytes),
                );
            }
            Ok(_) => extraction.ingest_entry(&name, &bytes, options),
            Err(e) => extraction.fail_entry(name, e.to_string()),
        }
    }

    log::info!(
        "Extracted {} record(s) with {} unique address(es) from {} entr{} ({} failed)",
        extraction.records.len(),
        extraction.addresses.len(),
        extraction.report.entries.len(),
        if extraction.report.entries.len() == 1 { "y" } else { "ies" },
        extraction.report.failed_entries.len(),
    );

    Ok(extraction)
}

/// Extracts records from an in-memory ZIP archive.
///
/// # Errors
///
/// Returns [`ArchiveError::InvalidArchive`] if the bytes are not a ZIP.
pub fn extract_bytes(bytes: &[u8], options: &ExtractOptions) -> Result<Extraction, ArchiveError> {
    extract_archive(std::io::Cursor::new(bytes), options)
}

/// Extracts records from a single JSON document named `name`.
#[must_use]
pub fn extract_entry(name: &str, bytes: &[u8], options: &ExtractOptions) -> Extraction {
    let mut extraction = Extraction::default();
    extraction.ingest_entry(name, bytes, options);
    extraction
}

/// Extracts records from a file on disk.
///
/// A `.json` file is treated as a single entry; anything else is opened
/// as a ZIP archive.
///
/// # Errors
///
/// Returns [`ArchiveError::Io`] if the file cannot be read or
/// [`ArchiveError::InvalidArchive`] if it is not a ZIP.
pub fn extract_path(path: &Path, options: &ExtractOptions) -> Result<Extraction, ArchiveError> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    if is_json {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        return Ok(extract_entry(&name, &bytes, options));
    }

    let file = std::fs::File::open(path)?;
    extract_archive(std::io::BufReader::new(file), options)
}
