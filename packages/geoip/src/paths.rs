//! Discovery of the GeoIP database file.
//!
//! The database is looked up in order: an explicit path, the
//! `STREAM_ATLAS_GEOIP_DB` environment variable, then well-known
//! locations relative to the working directory.

use std::path::{Path, PathBuf};

use crate::GeoIpError;

/// Environment variable naming the database file.
pub const DATABASE_ENV_VAR: &str = "STREAM_ATLAS_GEOIP_DB";

/// Default database file name.
pub const DATABASE_FILE_NAME: &str = "GeoLite2-City.mmdb";

/// Directories (relative to the working directory) searched for
/// [`DATABASE_FILE_NAME`].
const SEARCH_DIRS: &[&str] = &["data", "server/data", "backend/data"];

/// Returns the candidate paths in search order.
///
/// An explicit path or the environment variable, when set, are the only
/// candidates: a misconfigured path must not silently fall back to
/// another database.
#[must_use]
pub fn candidate_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
    if let Some(path) = explicit {
        return vec![path.to_path_buf()];
    }

    if let Some(path) = std::env::var_os(DATABASE_ENV_VAR).filter(|p| !p.is_empty()) {
        return vec![PathBuf::from(path)];
    }

    let cwd = std::env::current_dir().unwrap_or_default();
    SEARCH_DIRS
        .iter()
        .map(|dir| cwd.join(dir).join(DATABASE_FILE_NAME))
        .collect()
}

/// Finds the database file.
///
/// # Errors
///
/// Returns [`GeoIpError::DatabaseUnavailable`] listing every checked path
/// if none exists.
pub fn locate_database(explicit: Option<&Path>) -> Result<PathBuf, GeoIpError> {
    let candidates = candidate_paths(explicit);

    if let Some(found) = candidates.iter().find(|p| p.is_file()) {
        return Ok(found.clone());
    }

    Err(GeoIpError::DatabaseUnavailable {
        path: candidates
            .first()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
        message: format!(
            "GeoIP database not found. Checked paths: {}",
            candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    })
}
