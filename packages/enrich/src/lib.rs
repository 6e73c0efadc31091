#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Batch geolocation enrichment for streaming-history archives.
//!
//! The pipeline runs in four stages:
//!
//! 1. **Extract** ([`stream_atlas_archive`]): records and the unique set
//!    of addresses they reference.
//! 2. **Resolve** ([`batch::BatchOrchestrator`]): the address set is
//!    chunked and each chunk is passed to a [`resolver::ChunkResolver`],
//!    either in-process ([`resolver::LocalChunkResolver`]) or against a
//!    lookup server ([`remote::RemoteChunkResolver`]). Progress is
//!    reported after every chunk.
//! 3. **Merge** ([`merge::merge`]): outcomes are joined back onto every
//!    record; nothing is dropped.
//! 4. **Report** ([`report::report`]): counts plus the terminal state.
//!
//! Each address is resolved at most once per run, however many records
//! reference it.

pub mod batch;
pub mod config;
pub mod merge;
pub mod remote;
pub mod report;
pub mod resolver;

use std::path::Path;
use std::sync::Arc;

use stream_atlas_archive::{ExtractOptions, Extraction};
use stream_atlas_enrich_models::PipelineResult;
use stream_atlas_enrich_models::progress::ProgressSink;
use stream_atlas_geoip::{GeoIpError, GeoResolver};
use thiserror::Error;

use crate::batch::BatchOrchestrator;
use crate::config::{ConfigError, EnrichConfig};
use crate::remote::RemoteChunkResolver;
use crate::report::PipelineError;
use crate::resolver::{ChunkError, ChunkResolver, LocalChunkResolver};

/// Errors from assembling a pipeline.
#[derive(Debug, Error)]
pub enum SetupError {
    /// Settings were invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The GeoIP database could not be opened.
    #[error(transparent)]
    GeoIp(#[from] GeoIpError),

    /// The remote resolver could not be created.
    #[error(transparent)]
    Remote(#[from] ChunkError),
}

/// A configured enrichment pipeline.
///
/// Holds no per-run state; one pipeline can serve any number of runs.
#[derive(Clone)]
pub struct Pipeline {
    orchestrator: BatchOrchestrator,
    resolver: Arc<dyn ChunkResolver>,
    extract: ExtractOptions,
}

impl Pipeline {
    /// Creates a pipeline from its parts, using default extraction
    /// options.
    #[must_use]
    pub fn new(orchestrator: BatchOrchestrator, resolver: Arc<dyn ChunkResolver>) -> Self {
        Self {
            orchestrator,
            resolver,
            extract: ExtractOptions::default(),
        }
    }

    /// Replaces the extraction options.
    #[must_use]
    pub fn with_extract_options(mut self, extract: ExtractOptions) -> Self {
        self.extract = extract;
        self
    }

    /// In-process pipeline over an already-open resolver.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Config`] if the settings are invalid.
    pub fn local(config: &EnrichConfig, geo: GeoResolver) -> Result<Self, SetupError> {
        let resolver = LocalChunkResolver::new(geo, config.concurrency()?);
        Ok(Self::new(config.orchestrator()?, Arc::new(resolver))
            .with_extract_options(config.extract_options()))
    }

    /// Builds the pipeline `config` describes: remote when `remote_url` is
    /// set, otherwise in-process against the located GeoIP database.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError`] if the settings are invalid, the database
    /// cannot be opened, or the HTTP client cannot be built.
    pub fn from_config(config: &EnrichConfig) -> Result<Self, SetupError> {
        if let Some(url) = &config.remote_url {
            log::info!("Resolving remotely via {url}");
            let resolver = RemoteChunkResolver::new(url, config.request_timeout())?;
            return Ok(Self::new(config.orchestrator()?, Arc::new(resolver))
                .with_extract_options(config.extract_options()));
        }

        let geo = GeoResolver::locate_and_open(config.geoip_db.as_deref())?;
        Self::local(config, geo)
    }

    /// The orchestrator settings.
    #[must_use]
    pub const fn orchestrator(&self) -> &BatchOrchestrator {
        &self.orchestrator
    }

    /// The extraction options.
    #[must_use]
    pub const fn extract_options(&self) -> &ExtractOptions {
        &self.extract
    }

    /// Extracts an in-memory ZIP archive.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Archive`] if the bytes are not a ZIP.
    pub fn extract_bytes(&self, bytes: &[u8]) -> Result<Extraction, PipelineError> {
        Ok(stream_atlas_archive::extract_bytes(bytes, &self.extract)?)
    }

    /// Extracts a ZIP archive or bare JSON file from disk.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Archive`] if the file cannot be read.
    pub fn extract_path(&self, path: &Path) -> Result<Extraction, PipelineError> {
        Ok(stream_atlas_archive::extract_path(path, &self.extract)?)
    }

    /// Resolves, merges and reports an extraction.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the run found no records, no
    /// addresses, or resolved nothing.
    pub async fn run_extraction(
        &self,
        extraction: Extraction,
        progress: &dyn ProgressSink,
    ) -> Result<PipelineResult, PipelineError> {
        let Extraction {
            records,
            addresses,
            report: extraction_report,
        } = extraction;

        log::info!(
            "Enriching {} records referencing {} unique addresses",
            records.len(),
            addresses.len()
        );

        let outcomes = self
            .orchestrator
            .run(addresses, self.resolver.as_ref(), progress)
            .await;

        let enriched = merge::merge(records, &outcomes);
        report::report(report::build_result(
            enriched,
            &outcomes,
            extraction_report,
        ))
    }

    /// Extracts and enriches an in-memory ZIP archive.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the archive is unreadable or the run
    /// produced nothing.
    pub async fn run_bytes(
        &self,
        bytes: &[u8],
        progress: &dyn ProgressSink,
    ) -> Result<PipelineResult, PipelineError> {
        let extraction = self.extract_bytes(bytes)?;
        self.run_extraction(extraction, progress).await
    }

    /// Extracts and enriches a ZIP archive or bare JSON file on disk.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the file is unreadable or the run
    /// produced nothing.
    pub async fn run_path(
        &self,
        path: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<PipelineResult, PipelineError> {
        let extraction = self.extract_path(path)?;
        self.run_extraction(extraction, progress).await
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("orchestrator", &self.orchestrator)
            .field("resolver", &self.resolver.name())
            .field("extract", &self.extract)
            .finish()
    }
}
