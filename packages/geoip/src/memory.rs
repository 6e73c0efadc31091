//! In-memory [`GeoDatabase`] for tests and fixtures.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::database::{DatabaseInfo, GeoDatabase, GeoRecord, LookupError};

/// A fixed table of address → record entries.
///
/// Addresses registered with [`InMemoryDatabase::with_failure`] report a
/// [`LookupError`], simulating a corrupt entry. Every call to
/// [`GeoDatabase::lookup`] is counted.
#[derive(Debug, Default)]
pub struct InMemoryDatabase {
    records: BTreeMap<IpAddr, GeoRecord>,
    failures: BTreeSet<IpAddr>,
    lookups: AtomicUsize,
}

impl InMemoryDatabase {
    /// Creates an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record for `ip`.
    #[must_use]
    pub fn with_record(mut self, ip: IpAddr, record: GeoRecord) -> Self {
        self.records.insert(ip, record);
        self
    }

    /// Adds a fully-populated record for `ip`.
    #[must_use]
    pub fn with_location(
        self,
        ip: IpAddr,
        latitude: f64,
        longitude: f64,
        city: Option<&str>,
        country_code: Option<&str>,
    ) -> Self {
        self.with_record(
            ip,
            GeoRecord {
                latitude: Some(latitude),
                longitude: Some(longitude),
                city: city.map(str::to_string),
                region: None,
                country_code: country_code.map(str::to_string),
            },
        )
    }

    /// Makes lookups for `ip` fail.
    #[must_use]
    pub fn with_failure(mut self, ip: IpAddr) -> Self {
        self.failures.insert(ip);
        self
    }

    /// Number of lookups performed so far.
    #[must_use]
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}

impl GeoDatabase for InMemoryDatabase {
    fn lookup(&self, ip: IpAddr) -> Result<Option<GeoRecord>, LookupError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);

        if self.failures.contains(&ip) {
            return Err(LookupError {
                message: format!("corrupt entry for {ip}"),
            });
        }

        Ok(self.records.get(&ip).cloned())
    }

    fn info(&self) -> DatabaseInfo {
        DatabaseInfo {
            database_type: "in-memory".to_string(),
            build_epoch: 0,
        }
    }
}
