//! Chunk resolvers.
//!
//! A [`ChunkResolver`] turns one chunk of address keys into outcomes. The
//! orchestrator treats any `Err` as a failure of the whole chunk.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::time::Duration;

use async_trait::async_trait;
use stream_atlas_geoip::GeoResolver;
use stream_atlas_geoip_models::{AddressKey, ResolutionOutcome};
use thiserror::Error;

/// Outcomes for one chunk, keyed by address.
pub type ChunkOutcomes = BTreeMap<AddressKey, ResolutionOutcome>;

/// Failure of a whole chunk.
#[derive(Debug, Error)]
pub enum ChunkError {
    /// HTTP request failed (connection, timeout or body decoding).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote resolver answered with a non-success status.
    #[error("Lookup server returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, if any.
        message: String,
    },

    /// The chunk did not finish within its deadline.
    #[error("Chunk timed out after {timeout:?}")]
    Timeout {
        /// The deadline that expired.
        timeout: Duration,
    },

    /// A resolution worker panicked or was cancelled.
    #[error("Resolver worker failed: {message}")]
    Worker {
        /// Description of the failure.
        message: String,
    },
}

/// Resolves one chunk of addresses.
#[async_trait]
pub trait ChunkResolver: Send + Sync {
    /// Short name used in log messages.
    fn name(&self) -> &'static str;

    /// Resolves every key in `chunk`.
    ///
    /// Keys missing from the returned map are treated as lookup errors and
    /// keys that were not requested are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError`] if the chunk as a whole could not be
    /// resolved.
    async fn resolve_chunk(&self, chunk: &[AddressKey]) -> Result<ChunkOutcomes, ChunkError>;
}

/// Resolves chunks in-process against the shared GeoIP database.
///
/// Each chunk is split across up to `concurrency` blocking workers; the
/// database handle is shared, never copied.
///
/// Blocking workers cannot be cancelled. When the orchestrator's chunk
/// deadline expires the workers still run to completion in the
/// background and their results are discarded.
#[derive(Debug, Clone)]
pub struct LocalChunkResolver {
    resolver: GeoResolver,
    concurrency: NonZeroUsize,
}

impl LocalChunkResolver {
    /// Wraps `resolver`, resolving each chunk on up to `concurrency`
    /// workers.
    #[must_use]
    pub const fn new(resolver: GeoResolver, concurrency: NonZeroUsize) -> Self {
        Self {
            resolver,
            concurrency,
        }
    }
}

#[async_trait]
impl ChunkResolver for LocalChunkResolver {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn resolve_chunk(&self, chunk: &[AddressKey]) -> Result<ChunkOutcomes, ChunkError> {
        if chunk.is_empty() {
            return Ok(ChunkOutcomes::new());
        }

        let per_worker = chunk.len().div_ceil(self.concurrency.get());

        let handles: Vec<_> = chunk
            .chunks(per_worker)
            .map(|part| {
                let resolver = self.resolver.clone();
                let part = part.to_vec();
                tokio::task::spawn_blocking(move || {
                    part.into_iter()
                        .map(|key| {
                            let outcome = resolver.resolve_key(&key);
                            (key, outcome)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut outcomes = ChunkOutcomes::new();
        for joined in futures::future::join_all(handles).await {
            let part = joined.map_err(|e| ChunkError::Worker {
                message: e.to_string(),
            })?;
            outcomes.extend(part);
        }

        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;
    use std::sync::Arc;

    use stream_atlas_geoip::memory::InMemoryDatabase;
    use stream_atlas_geoip_models::UnresolvedReason;

    use super::*;

    fn key(s: &str) -> AddressKey {
        AddressKey::normalize(s).unwrap()
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn local_resolver_answers_every_key() {
        let db = Arc::new(
            InMemoryDatabase::new()
                .with_location(ip("8.8.8.8"), 37.751, -97.822, None, Some("US"))
                .with_location(ip("1.1.1.1"), -33.494, 143.2104, None, Some("AU")),
        );
        let resolver = LocalChunkResolver::new(
            GeoResolver::new(db.clone()),
            NonZeroUsize::new(3).unwrap(),
        );

        let chunk = vec![
            key("8.8.8.8"),
            key("1.1.1.1"),
            key("192.168.1.5"),
            key("9.9.9.9"),
            key("garbage"),
        ];
        let outcomes = resolver.resolve_chunk(&chunk).await.unwrap();

        assert_eq!(outcomes.len(), chunk.len());
        assert!(outcomes[&key("8.8.8.8")].is_resolved());
        assert!(outcomes[&key("1.1.1.1")].is_resolved());
        assert_eq!(
            outcomes[&key("192.168.1.5")].reason(),
            Some(UnresolvedReason::PrivateOrReserved)
        );
        assert_eq!(
            outcomes[&key("9.9.9.9")].reason(),
            Some(UnresolvedReason::NotFound)
        );
        assert_eq!(
            outcomes[&key("garbage")].reason(),
            Some(UnresolvedReason::Malformed)
        );
        assert_eq!(db.lookup_count(), 3);
    }

    #[tokio::test]
    async fn empty_chunk_is_empty() {
        let resolver = LocalChunkResolver::new(
            GeoResolver::new(Arc::new(InMemoryDatabase::new())),
            NonZeroUsize::MIN,
        );
        assert!(resolver.resolve_chunk(&[]).await.unwrap().is_empty());
    }
}
