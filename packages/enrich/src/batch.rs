//! Chunked batch resolution.
//!
//! [`BatchOrchestrator::run`] deduplicates the address set, splits it into
//! ordered chunks and drives each chunk through a [`ChunkResolver`]. A
//! failed or timed-out chunk marks its addresses `lookup-error` and the run
//! moves on to the next chunk. Progress is reported after every chunk.

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;
use std::time::Duration;

use stream_atlas_enrich_models::BatchProgress;
use stream_atlas_enrich_models::progress::ProgressSink;
use stream_atlas_geoip_models::{AddressKey, ResolutionOutcome, UnresolvedReason};

use crate::resolver::{ChunkError, ChunkResolver};

/// Default number of addresses per chunk.
pub const DEFAULT_CHUNK_SIZE: NonZeroUsize = match NonZeroUsize::new(500) {
    Some(n) => n,
    None => NonZeroUsize::MIN,
};

/// Default per-chunk deadline.
pub const DEFAULT_CHUNK_TIMEOUT: Duration = Duration::from_secs(30);

/// Drives chunked resolution of an address set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOrchestrator {
    chunk_size: NonZeroUsize,
    chunk_timeout: Duration,
}

impl Default for BatchOrchestrator {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_TIMEOUT)
    }
}

impl BatchOrchestrator {
    /// Creates an orchestrator with the given chunk size and deadline.
    #[must_use]
    pub const fn new(chunk_size: NonZeroUsize, chunk_timeout: Duration) -> Self {
        Self {
            chunk_size,
            chunk_timeout,
        }
    }

    /// Maximum addresses per chunk.
    #[must_use]
    pub const fn chunk_size(&self) -> NonZeroUsize {
        self.chunk_size
    }

    /// Per-chunk deadline.
    #[must_use]
    pub const fn chunk_timeout(&self) -> Duration {
        self.chunk_timeout
    }

    /// Resolves every unique address, returning exactly one outcome per
    /// address.
    ///
    /// Never fails: chunk-level failures become `lookup-error` outcomes.
    pub async fn run<I>(
        &self,
        addresses: I,
        resolver: &dyn ChunkResolver,
        progress: &dyn ProgressSink,
    ) -> BTreeMap<AddressKey, ResolutionOutcome>
    where
        I: IntoIterator<Item = AddressKey>,
    {
        let keys: Vec<AddressKey> = addresses
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let chunk_size = self.chunk_size.get();
        let chunk_count = keys.len().div_ceil(chunk_size);
        let mut state = BatchProgress::new(keys.len());
        let mut outcomes = BTreeMap::new();

        log::info!(
            "Resolving {} unique addresses in {chunk_count} chunk(s) of up to {chunk_size} via {} resolver",
            keys.len(),
            resolver.name(),
        );
        progress.start(&state);

        for (i, chunk) in keys.chunks(chunk_size).enumerate() {
            let result = tokio::time::timeout(self.chunk_timeout, resolver.resolve_chunk(chunk))
                .await
                .unwrap_or(Err(ChunkError::Timeout {
                    timeout: self.chunk_timeout,
                }));

            let mut chunk_failed = 0;

            match result {
                Ok(mut resolved) => {
                    for key in chunk {
                        let outcome = resolved.remove(key).unwrap_or_else(|| {
                            log::warn!(
                                "{} resolver returned no outcome for {key}",
                                resolver.name()
                            );
                            ResolutionOutcome::unresolved(UnresolvedReason::LookupError)
                        });
                        if !outcome.is_resolved() {
                            chunk_failed += 1;
                        }
                        outcomes.insert(key.clone(), outcome);
                    }
                    if !resolved.is_empty() {
                        log::debug!(
                            "Ignoring {} unrequested outcome(s) from {} resolver",
                            resolved.len(),
                            resolver.name()
                        );
                    }
                }
                Err(e) => {
                    log::warn!(
                        "Chunk {}/{chunk_count} ({} addresses) failed: {e}",
                        i + 1,
                        chunk.len()
                    );
                    for key in chunk {
                        outcomes.insert(
                            key.clone(),
                            ResolutionOutcome::unresolved(UnresolvedReason::LookupError),
                        );
                    }
                    chunk_failed = chunk.len();
                }
            }

            state.processed_count += chunk.len();
            state.failed_count += chunk_failed;

            log::info!(
                "Chunk {}/{chunk_count}: {} resolved, {chunk_failed} unresolved ({}/{} done)",
                i + 1,
                chunk.len() - chunk_failed,
                state.processed_count,
                state.total_count,
            );
            progress.report(&state);
        }

        progress.finish(&state);
        outcomes
    }
}
