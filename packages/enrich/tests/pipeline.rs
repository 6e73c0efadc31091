use std::io::Write as _;
use std::net::IpAddr;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use stream_atlas_enrich::batch::BatchOrchestrator;
use stream_atlas_enrich::config::EnrichConfig;
use stream_atlas_enrich::report::PipelineError;
use stream_atlas_enrich::resolver::{ChunkError, ChunkOutcomes, ChunkResolver, LocalChunkResolver};
use stream_atlas_enrich::{Pipeline, SetupError};
use stream_atlas_enrich_models::progress::NullProgress;
use stream_atlas_enrich_models::{BatchProgress, RunOutcome};
use stream_atlas_geoip::memory::InMemoryDatabase;
use stream_atlas_geoip::{GeoIpError, GeoResolver};
use stream_atlas_geoip_models::{AddressKey, GeoLocation, ResolutionOutcome, UnresolvedReason};
use zip::write::SimpleFileOptions;

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn key(s: &str) -> AddressKey {
    AddressKey::normalize(s).unwrap()
}

fn nz(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

fn geo() -> GeoResolver {
    let db = InMemoryDatabase::new()
        .with_location(ip("8.8.8.8"), 37.751, -97.822, None, Some("US"))
        .with_location(
            ip("81.2.69.142"),
            51.5142,
            -0.0931,
            Some("London"),
            Some("GB"),
        );
    GeoResolver::new(Arc::new(db))
}

fn local_pipeline() -> Pipeline {
    Pipeline::local(&EnrichConfig::defaults().unwrap(), geo()).unwrap()
}

fn zip_of(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, body) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn history(ips: &[&str]) -> String {
    let records: Vec<String> = ips
        .iter()
        .map(|ip| format!(r#"{{"ts":"2023-01-01T00:00:00Z","ms_played":1000,"ip_addr":"{ip}"}}"#))
        .collect();
    format!("[{}]", records.join(","))
}

#[tokio::test]
async fn public_and_private_addresses_across_entries() {
    let archive = zip_of(&[
        ("Streaming_History_Audio_2022.json", &history(&["8.8.8.8", "8.8.8.8"])),
        ("Streaming_History_Audio_2023.json", &history(&["192.168.1.5"])),
    ]);

    let result = local_pipeline()
        .run_bytes(&archive, &NullProgress)
        .await
        .unwrap();

    assert_eq!(result.total_records, 3);
    assert_eq!(result.total_addresses, 2);
    assert_eq!(result.resolved_count, 1);
    assert_eq!(result.failed_count, 1);
    assert_eq!(result.outcome(), RunOutcome::Partial);
    assert_eq!(result.enriched_records.len(), result.total_records);

    let located = result.enriched_records[0].location().unwrap();
    assert_eq!(located.country_code.as_deref(), Some("US"));
    assert_eq!(result.enriched_records[1].location(), Some(located));
    assert_eq!(
        result.enriched_records[2].outcome,
        Some(ResolutionOutcome::unresolved(
            UnresolvedReason::PrivateOrReserved
        ))
    );
}

#[tokio::test]
async fn malformed_entry_does_not_abort_the_run() {
    let archive = zip_of(&[
        ("a.json", r#"[{"ip_addr": "8.8.8.8"}, {"#),
        ("b.json", &history(&["81.2.69.142"])),
    ]);

    let result = local_pipeline()
        .run_bytes(&archive, &NullProgress)
        .await
        .unwrap();

    assert_eq!(result.total_records, 1);
    assert_eq!(result.resolved_count, 1);
    assert_eq!(result.outcome(), RunOutcome::Complete);
    assert_eq!(result.failed_entries.len(), 1);
    assert_eq!(result.failed_entries[0].name, "a.json");
    assert_eq!(
        result.enriched_records[0]
            .location()
            .and_then(|l| l.city.as_deref()),
        Some("London")
    );
}

#[tokio::test]
async fn terminal_failures_are_reported() {
    let pipeline = local_pipeline();

    let err = pipeline
        .run_bytes(&zip_of(&[("readme.txt", "hello")]), &NullProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::NoRecordsFound));

    let err = pipeline
        .run_bytes(
            &zip_of(&[("a.json", r#"[{"ts":"2023-01-01T00:00:00Z"}]"#)]),
            &NullProgress,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::NoAddressesFound { records: 1 }));

    let err = pipeline
        .run_bytes(
            &zip_of(&[("a.json", &history(&["10.0.0.1", "9.9.9.9"]))]),
            &NullProgress,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::AllResolutionsFailed { addresses: 2 }
    ));

    let err = pipeline
        .run_bytes(b"not a zip", &NullProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Archive(_)));
}

#[tokio::test]
async fn chunk_size_does_not_change_outcomes() {
    let mut db = InMemoryDatabase::new();
    let addresses: Vec<AddressKey> = (0..5000)
        .map(|i| key(&format!("8.{}.{}.1", i / 250, i % 250)))
        .collect();
    for (i, address) in addresses.iter().enumerate() {
        if i % 7 == 0 {
            db = db.with_location(address.ip().unwrap(), 1.0, 2.0, None, Some("US"));
        }
    }
    let geo = GeoResolver::new(Arc::new(db));
    let resolver = LocalChunkResolver::new(geo, nz(4));
    let timeout = Duration::from_secs(30);

    let small = BatchOrchestrator::new(nz(100), timeout)
        .run(addresses.clone(), &resolver, &NullProgress)
        .await;
    let large = BatchOrchestrator::new(nz(1000), timeout)
        .run(addresses.clone(), &resolver, &NullProgress)
        .await;

    assert_eq!(small.len(), 5000);
    assert_eq!(small, large);
    assert_eq!(small.values().filter(|o| o.is_resolved()).count(), 715);
}

/// Resolves everything, except that any chunk containing `stall` never
/// finishes in time.
struct Stalling {
    stall: AddressKey,
}

#[async_trait]
impl ChunkResolver for Stalling {
    fn name(&self) -> &'static str {
        "stalling"
    }

    async fn resolve_chunk(&self, chunk: &[AddressKey]) -> Result<ChunkOutcomes, ChunkError> {
        if chunk.contains(&self.stall) {
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
        Ok(chunk
            .iter()
            .map(|k| {
                (
                    k.clone(),
                    ResolutionOutcome::Resolved(GeoLocation {
                        latitude: 1.0,
                        longitude: 2.0,
                        city: None,
                        region: None,
                        country_code: None,
                    }),
                )
            })
            .collect())
    }
}

#[tokio::test]
async fn timed_out_chunk_fails_only_its_addresses() {
    let pipeline = Pipeline::new(
        BatchOrchestrator::new(nz(2), Duration::from_millis(50)),
        Arc::new(Stalling {
            stall: key("2.2.2.1"),
        }),
    );
    let archive = zip_of(&[(
        "a.json",
        &history(&[
            "1.1.1.1", "1.1.1.2", "2.2.2.1", "2.2.2.2", "3.3.3.1", "3.3.3.2",
        ]),
    )]);

    let (tx, rx) = tokio::sync::watch::channel(BatchProgress::default());
    let result = pipeline.run_bytes(&archive, &tx).await.unwrap();

    assert_eq!(result.outcome(), RunOutcome::Partial);
    assert_eq!(result.resolved_count, 4);
    assert_eq!(result.failed_count, 2);
    for record in &result.enriched_records[2..4] {
        assert_eq!(
            record.outcome,
            Some(ResolutionOutcome::unresolved(UnresolvedReason::LookupError))
        );
    }

    let last = *rx.borrow();
    assert!(last.is_complete());
    assert_eq!(last.processed_count, 6);
    assert_eq!(last.failed_count, 2);
}

#[test]
fn missing_database_is_fatal_at_setup() {
    let path: PathBuf = std::env::temp_dir().join("stream_atlas_pipeline_missing.mmdb");
    let _ = std::fs::remove_file(&path);

    let mut config = EnrichConfig::defaults().unwrap();
    config.geoip_db = Some(path);

    let err = Pipeline::from_config(&config).unwrap_err();
    assert!(matches!(
        err,
        SetupError::GeoIp(GeoIpError::DatabaseUnavailable { .. })
    ));
}
