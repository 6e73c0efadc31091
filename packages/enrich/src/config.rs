//! Enrichment settings.
//!
//! Defaults are embedded from `config/default.toml`. A user TOML file
//! overrides them field by field, environment variables override the
//! file, and command-line flags (applied by the binary) override
//! everything.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::batch::BatchOrchestrator;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Overrides [`EnrichConfig::geoip_db`].
pub const GEOIP_DB_ENV_VAR: &str = stream_atlas_geoip::paths::DATABASE_ENV_VAR;

/// Overrides [`EnrichConfig::chunk_size`].
pub const CHUNK_SIZE_ENV_VAR: &str = "STREAM_ATLAS_CHUNK_SIZE";

/// Overrides [`EnrichConfig::remote_url`].
pub const REMOTE_URL_ENV_VAR: &str = "STREAM_ATLAS_REMOTE_URL";

/// Errors from loading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// The file that was tried.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML or has unknown fields.
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment variable held an unusable value.
    #[error("Invalid value {value:?} for {name}: {message}")]
    Env {
        /// Variable name.
        name: String,
        /// The value found.
        value: String,
        /// Why it was rejected.
        message: String,
    },

    /// A setting is out of range.
    #[error("Invalid setting: {message}")]
    Invalid {
        /// Description of the problem.
        message: String,
    },
}

/// Settings for one enrichment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichConfig {
    /// Maximum unique addresses per chunk. Must be positive.
    pub chunk_size: usize,
    /// Per-chunk deadline in seconds.
    pub chunk_timeout_secs: u64,
    /// Blocking workers per chunk for in-process resolution. Must be
    /// positive.
    pub concurrency: usize,
    /// HTTP timeout in seconds for remote resolution.
    pub request_timeout_secs: u64,
    /// GeoIP database path. When unset the usual locations are searched.
    pub geoip_db: Option<PathBuf>,
    /// Base URL of a lookup server. When set, resolution is remote.
    pub remote_url: Option<String>,
    /// Record fields that may hold the IP address, checked in order.
    pub address_fields: Vec<String>,
}

/// Partial settings as read from a user file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    chunk_size: Option<usize>,
    chunk_timeout_secs: Option<u64>,
    concurrency: Option<usize>,
    request_timeout_secs: Option<u64>,
    geoip_db: Option<PathBuf>,
    remote_url: Option<String>,
    address_fields: Option<Vec<String>>,
}

impl EnrichConfig {
    /// Returns the embedded defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the embedded defaults are invalid.
    pub fn defaults() -> Result<Self, ConfigError> {
        Ok(toml::from_str(DEFAULT_CONFIG)?)
    }

    /// Loads defaults, then `path` (if given), then environment overrides,
    /// and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, an
    /// environment variable is unusable, or a setting is out of range.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::defaults()?;

        if let Some(path) = path {
            log::debug!("Loading config from {}", path.display());
            let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
            config.merge_toml(&text)?;
        }

        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Overrides every field present in `text`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if `text` is not valid TOML or names
    /// an unknown field.
    pub fn merge_toml(&mut self, text: &str) -> Result<(), ConfigError> {
        let file: ConfigFile = toml::from_str(text)?;

        if let Some(v) = file.chunk_size {
            self.chunk_size = v;
        }
        if let Some(v) = file.chunk_timeout_secs {
            self.chunk_timeout_secs = v;
        }
        if let Some(v) = file.concurrency {
            self.concurrency = v;
        }
        if let Some(v) = file.request_timeout_secs {
            self.request_timeout_secs = v;
        }
        if file.geoip_db.is_some() {
            self.geoip_db = file.geoip_db;
        }
        if file.remote_url.is_some() {
            self.remote_url = file.remote_url;
        }
        if let Some(v) = file.address_fields {
            self.address_fields = v;
        }

        Ok(())
    }

    /// Applies environment overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Env`] if a numeric variable does not parse.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(path) = lookup(GEOIP_DB_ENV_VAR).filter(|v| !v.trim().is_empty()) {
            self.geoip_db = Some(PathBuf::from(path));
        }

        if let Some(url) = lookup(REMOTE_URL_ENV_VAR).filter(|v| !v.trim().is_empty()) {
            self.remote_url = Some(url);
        }

        if let Some(value) = lookup(CHUNK_SIZE_ENV_VAR).filter(|v| !v.trim().is_empty()) {
            self.chunk_size = value.trim().parse().map_err(|e| ConfigError::Env {
                name: CHUNK_SIZE_ENV_VAR.to_string(),
                value: value.clone(),
                message: format!("{e}"),
            })?;
        }

        Ok(())
    }

    /// Checks that every setting is in range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunk_size()?;
        self.concurrency()?;

        if self.chunk_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "chunk_timeout_secs must be positive".to_string(),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "request_timeout_secs must be positive".to_string(),
            });
        }
        if self.address_fields.iter().all(|f| f.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                message: "address_fields must name at least one field".to_string(),
            });
        }

        Ok(())
    }

    /// Chunk size as a non-zero count.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `chunk_size` is zero.
    pub fn chunk_size(&self) -> Result<NonZeroUsize, ConfigError> {
        NonZeroUsize::new(self.chunk_size).ok_or_else(|| ConfigError::Invalid {
            message: "chunk_size must be positive".to_string(),
        })
    }

    /// Worker count as a non-zero count.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `concurrency` is zero.
    pub fn concurrency(&self) -> Result<NonZeroUsize, ConfigError> {
        NonZeroUsize::new(self.concurrency).ok_or_else(|| ConfigError::Invalid {
            message: "concurrency must be positive".to_string(),
        })
    }

    /// Per-chunk deadline.
    #[must_use]
    pub const fn chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.chunk_timeout_secs)
    }

    /// HTTP timeout for remote resolution.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Builds an orchestrator from these settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `chunk_size` is zero.
    pub fn orchestrator(&self) -> Result<BatchOrchestrator, ConfigError> {
        Ok(BatchOrchestrator::new(
            self.chunk_size()?,
            self.chunk_timeout(),
        ))
    }

    /// Extraction options from these settings.
    #[must_use]
    pub fn extract_options(&self) -> stream_atlas_archive::ExtractOptions {
        stream_atlas_archive::ExtractOptions {
            address_fields: self.address_fields.clone(),
            ..stream_atlas_archive::ExtractOptions::default()
        }
    }
}
