#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Offline IP geolocation.
//!
//! [`GeoResolver`] turns one address string into a [`ResolutionOutcome`]:
//!
//! 1. **Screening** ([`address::screen`]): malformed text and private or
//!    reserved ranges are rejected without touching the database.
//! 2. **Point lookup**: the injected [`GeoDatabase`] is queried. A miss
//!    is `not-found`; a database error is `lookup-error` and never
//!    propagates.
//! 3. **Extraction**: a hit needs both coordinates; city, region and
//!    country code are best-effort.
//!
//! The database handle is opened once by the process entry point and
//! shared (via `Arc`) by every resolution for the lifetime of the
//! process. The production backend is a MaxMind city database
//! ([`maxmind::MaxMindDatabase`]); [`memory::InMemoryDatabase`] backs
//! tests.

pub mod address;
pub mod database;
pub mod maxmind;
pub mod memory;
pub mod paths;

use std::path::Path;
use std::sync::Arc;

use stream_atlas_geoip_models::{AddressKey, ResolutionOutcome, UnresolvedReason};
use thiserror::Error;

pub use database::{DatabaseInfo, GeoDatabase, GeoRecord, LookupError};

/// Errors from opening the GeoIP database.
#[derive(Debug, Error)]
pub enum GeoIpError {
    /// The database file is missing or unreadable. Fatal at startup.
    #[error("GeoIP database unavailable at {path}: {message}")]
    DatabaseUnavailable {
        /// The path that was tried.
        path: String,
        /// Description of the failure.
        message: String,
    },
}

/// Resolves addresses against a shared, read-only [`GeoDatabase`].
///
/// Cheap to clone; clones share the same database handle.
#[derive(Clone)]
pub struct GeoResolver {
    db: Arc<dyn GeoDatabase>,
}

impl GeoResolver {
    /// Wraps an already-open database.
    #[must_use]
    pub fn new(db: Arc<dyn GeoDatabase>) -> Self {
        Self { db }
    }

    /// Opens the MaxMind database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`GeoIpError::DatabaseUnavailable`] if the database cannot
    /// be opened.
    pub fn open(path: &Path) -> Result<Self, GeoIpError> {
        let db = maxmind::MaxMindDatabase::open(path)?;
        Ok(Self::new(Arc::new(db)))
    }

    /// Locates the database (see [`paths::locate_database`]) and opens it.
    ///
    /// # Errors
    ///
    /// Returns [`GeoIpError::DatabaseUnavailable`] if no database is found
    /// or it cannot be opened.
    pub fn locate_and_open(explicit: Option<&Path>) -> Result<Self, GeoIpError> {
        let path = paths::locate_database(explicit)?;
        Self::open(&path)
    }

    /// Resolves a raw address string.
    #[must_use]
    pub fn resolve(&self, address: &str) -> ResolutionOutcome {
        AddressKey::normalize(address).map_or(
            ResolutionOutcome::unresolved(UnresolvedReason::Malformed),
            |key| self.resolve_key(&key),
        )
    }

    /// Resolves a normalized address key.
    #[must_use]
    pub fn resolve_key(&self, key: &AddressKey) -> ResolutionOutcome {
        let ip = match address::screen(key.as_str()) {
            Ok(ip) => ip,
            Err(reason) => {
                log::debug!("Skipping {key}: {reason}");
                return ResolutionOutcome::unresolved(reason);
            }
        };

        match self.db.lookup(ip) {
            Ok(Some(record)) => record.into_location().map_or_else(
                || {
                    log::debug!("GeoIP: record for {key} has no coordinates");
                    ResolutionOutcome::unresolved(UnresolvedReason::NotFound)
                },
                ResolutionOutcome::Resolved,
            ),
            Ok(None) => {
                log::debug!("GeoIP: no match for {key}");
                ResolutionOutcome::unresolved(UnresolvedReason::NotFound)
            }
            Err(e) => {
                log::warn!("GeoIP error for {key}: {e}");
                ResolutionOutcome::unresolved(UnresolvedReason::LookupError)
            }
        }
    }

    /// Returns metadata describing the underlying database.
    #[must_use]
    pub fn info(&self) -> DatabaseInfo {
        self.db.info()
    }
}

impl std::fmt::Debug for GeoResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoResolver")
            .field("database", &self.db.info().database_type)
            .finish()
    }
}
