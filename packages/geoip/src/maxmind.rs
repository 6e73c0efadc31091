//! MaxMind `GeoLite2-City` / `GeoIP2-City` database backend.
//!
//! The `.mmdb` file is read fully into memory once. `maxminddb::Reader`
//! is immutable after opening, so a single instance serves concurrent
//! lookups without locking.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use maxminddb::{MaxMindDBError, geoip2};

use crate::GeoIpError;
use crate::database::{DatabaseInfo, GeoDatabase, GeoRecord, LookupError};

/// Language used for city and subdivision names.
const NAME_LANGUAGE: &str = "en";

/// A MaxMind city database loaded into memory.
pub struct MaxMindDatabase {
    reader: maxminddb::Reader<Vec<u8>>,
    path: PathBuf,
}

impl MaxMindDatabase {
    /// Opens the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`GeoIpError::DatabaseUnavailable`] if the file does not
    /// exist or is not a valid MaxMind database.
    pub fn open(path: &Path) -> Result<Self, GeoIpError> {
        if !path.is_file() {
            return Err(GeoIpError::DatabaseUnavailable {
                path: path.display().to_string(),
                message: "file not found".to_string(),
            });
        }

        let reader =
            maxminddb::Reader::open_readfile(path).map_err(|e| GeoIpError::DatabaseUnavailable {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        log::info!(
            "GeoIP database loaded from {} ({}, built {})",
            path.display(),
            reader.metadata.database_type,
            reader.metadata.build_epoch,
        );

        Ok(Self {
            reader,
            path: path.to_path_buf(),
        })
    }

    /// Returns the file the database was loaded from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl GeoDatabase for MaxMindDatabase {
    fn lookup(&self, ip: IpAddr) -> Result<Option<GeoRecord>, LookupError> {
        match self.reader.lookup::<geoip2::City<'_>>(ip) {
            Ok(city) => Ok(Some(record_from_city(&city))),
            Err(MaxMindDBError::AddressNotFoundError(_)) => Ok(None),
            Err(e) => Err(LookupError {
                message: e.to_string(),
            }),
        }
    }

    fn info(&self) -> DatabaseInfo {
        DatabaseInfo {
            database_type: self.reader.metadata.database_type.clone(),
            build_epoch: self.reader.metadata.build_epoch,
        }
    }
}

fn english_name(names: Option<&BTreeMap<&str, &str>>) -> Option<String> {
    names
        .and_then(|n| n.get(NAME_LANGUAGE))
        .map(|s| (*s).to_string())
}

fn record_from_city(city: &geoip2::City<'_>) -> GeoRecord {
    let location = city.location.as_ref();

    GeoRecord {
        latitude: location.and_then(|l| l.latitude),
        longitude: location.and_then(|l| l.longitude),
        city: english_name(city.city.as_ref().and_then(|c| c.names.as_ref())),
        region: english_name(
            city.subdivisions
                .as_ref()
                .and_then(|s| s.first())
                .and_then(|s| s.names.as_ref()),
        ),
        country_code: city
            .country
            .as_ref()
            .and_then(|c| c.iso_code)
            .map(str::to_string),
    }
}
