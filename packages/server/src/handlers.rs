//! HTTP handler functions for the stream atlas API.

use actix_web::{HttpResponse, web};
use stream_atlas_enrich_models::progress::NullProgress;
use stream_atlas_server_models::{
    ApiError, ApiHealth, EnrichResponse, LookupRequest, LookupResponse, LookupResult,
};

use crate::{AppState, SUMMARY_TOP_N};

/// `GET /api/health`
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let info = state.geo.info();
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        database_type: info.database_type,
        database_build_epoch: info.build_epoch,
    })
}

/// `POST /api/lookup`
///
/// Resolves every submitted address. Only resolved addresses appear in
/// the response; the caller treats absent ones as not found, including
/// addresses whose database lookup failed.
pub async fn lookup(state: web::Data<AppState>, body: web::Json<LookupRequest>) -> HttpResponse {
    let LookupRequest { ips } = body.into_inner();

    if ips.len() > state.max_lookup_batch {
        return HttpResponse::PayloadTooLarge().json(ApiError::new(
            "Too many addresses",
            format!(
                "{} addresses submitted; the limit is {} per request.",
                ips.len(),
                state.max_lookup_batch
            ),
        ));
    }

    let geo = state.geo.clone();
    let resolved = web::block(move || {
        ips.into_iter()
            .filter_map(|ip| {
                let outcome = geo.resolve(&ip);
                outcome.location().map(|location| LookupResult::new(ip, location))
            })
            .collect::<Vec<_>>()
    })
    .await;

    match resolved {
        Ok(results) => {
            log::debug!("Lookup resolved {} addresses", results.len());
            HttpResponse::Ok().json(LookupResponse {
                count: results.len(),
                results,
            })
        }
        Err(e) => {
            log::error!("Lookup worker failed: {e}");
            HttpResponse::InternalServerError()
                .json(ApiError::new("Lookup failed", e.to_string()))
        }
    }
}

/// `POST /api/enrich`
///
/// Takes the raw bytes of a streaming-history ZIP, runs the full pipeline
/// in-process, and returns the enriched records with a listening summary.
pub async fn enrich(state: web::Data<AppState>, body: web::Bytes) -> HttpResponse {
    if body.is_empty() {
        return HttpResponse::BadRequest().json(ApiError {
            error: "No ZIP file uploaded.".to_string(),
            details: None,
        });
    }

    log::info!("Received upload of {} bytes", body.len());

    let pipeline = state.pipeline.clone();
    let extraction = match web::block(move || pipeline.extract_bytes(&body)).await {
        Ok(Ok(extraction)) => extraction,
        Ok(Err(e)) => {
            log::warn!("Upload rejected: {e}");
            return HttpResponse::BadRequest().json(ApiError::new(e.to_string(), e.details()));
        }
        Err(e) => {
            log::error!("Extraction worker failed: {e}");
            return HttpResponse::InternalServerError()
                .json(ApiError::new("Extraction failed", e.to_string()));
        }
    };

    match state.pipeline.run_extraction(extraction, &NullProgress).await {
        Ok(result) => {
            let summary =
                stream_atlas_analytics::summarize(&result.enriched_records, SUMMARY_TOP_N);
            let message = result.status_message();
            log::info!("{message}");
            HttpResponse::Ok().json(EnrichResponse {
                result,
                summary,
                message,
            })
        }
        Err(e) => {
            log::warn!("Enrichment produced nothing: {e}");
            HttpResponse::BadRequest().json(ApiError::new(e.to_string(), e.details()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;
    use std::net::IpAddr;
    use std::sync::Arc;

    use actix_web::{App, http::StatusCode, test, web};
    use serde_json::{Value, json};
    use stream_atlas_enrich::config::EnrichConfig;
    use stream_atlas_geoip::GeoResolver;
    use stream_atlas_geoip::memory::InMemoryDatabase;
    use zip::write::SimpleFileOptions;

    use crate::{AppState, configure};

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn state(max_lookup_batch: usize) -> web::Data<AppState> {
        let db = InMemoryDatabase::new()
            .with_location(ip("8.8.8.8"), 37.751, -97.822, None, Some("US"))
            .with_location(
                ip("81.2.69.142"),
                51.5142,
                -0.0931,
                Some("London"),
                Some("GB"),
            )
            .with_failure(ip("203.0.114.1"));
        let geo = GeoResolver::new(Arc::new(db));
        let config = EnrichConfig::defaults().unwrap();
        web::Data::new(AppState::new(&config, geo, max_lookup_batch).unwrap())
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

    macro_rules! app {
        ($state:expr) => {
            test::init_service(App::new().app_data($state).configure(configure)).await
        };
    }

    #[actix_web::test]
    async fn health_reports_database() {
        let app = app!(state(10));
        let req = test::TestRequest::get().uri("/api/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["healthy"], json!(true));
        assert_eq!(body["databaseType"], json!("in-memory"));
    }

    #[actix_web::test]
    async fn lookup_returns_only_resolved_addresses() {
        let app = app!(state(10));
        let req = test::TestRequest::post()
            .uri("/api/lookup")
            .set_json(json!({
                "ips": ["8.8.8.8", "192.168.1.5", "9.9.9.9", "garbage", "81.2.69.142"]
            }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["count"], json!(2));
        let results = body["results"].as_array().unwrap();
        assert_eq!(results[0]["ip"], json!("8.8.8.8"));
        assert_eq!(results[0]["city"], Value::Null);
        assert_eq!(results[0]["country"], json!("US"));
        assert_eq!(results[1]["ip"], json!("81.2.69.142"));
        assert_eq!(results[1]["city"], json!("London"));
    }

    #[actix_web::test]
    async fn lookup_omits_failed_database_lookups() {
        let app = app!(state(10));
        let req = test::TestRequest::post()
            .uri("/api/lookup")
            .set_json(json!({"ips": ["203.0.114.1", "8.8.8.8"]}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["count"], json!(1));
        assert_eq!(body["results"][0]["ip"], json!("8.8.8.8"));
    }

    #[actix_web::test]
    async fn lookup_rejects_oversized_batch() {
        let app = app!(state(2));
        let req = test::TestRequest::post()
            .uri("/api/lookup")
            .set_json(json!({"ips": ["8.8.8.8", "8.8.4.4", "1.1.1.1"]}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[actix_web::test]
    async fn enrich_returns_records_and_summary() {
        let app = app!(state(10));
        let archive = zip_of(&[
            (
                "Streaming_History_Audio_2023.json",
                r#"[{"ts":"2023-06-01T12:00:00Z","ms_played":60000,"ip_addr":"81.2.69.142","master_metadata_album_artist_name":"A"},
                    {"ts":"2023-06-01T13:00:00Z","ms_played":30000,"ip_addr":"192.168.1.5","master_metadata_album_artist_name":"A"}]"#,
            ),
            ("Userdata.json", r#"{"username":"x"}"#),
        ]);
        let req = test::TestRequest::post()
            .uri("/api/enrich")
            .set_payload(archive)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;

        assert_eq!(body["totalRecords"], json!(2));
        assert_eq!(body["totalAddresses"], json!(2));
        assert_eq!(body["resolvedCount"], json!(1));
        assert_eq!(body["failedCount"], json!(1));
        assert_eq!(body["enrichedRecords"].as_array().unwrap().len(), 2);
        assert_eq!(body["summary"]["totalRecords"], json!(2));
        assert!(body["message"].as_str().unwrap().contains("1 of 2"));
    }

    #[actix_web::test]
    async fn enrich_rejects_empty_upload() {
        let app = app!(state(10));
        let req = test::TestRequest::post().uri("/api/enrich").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], json!("No ZIP file uploaded."));
    }

    #[actix_web::test]
    async fn enrich_rejects_non_zip() {
        let app = app!(state(10));
        let req = test::TestRequest::post()
            .uri("/api/enrich")
            .set_payload("definitely not a zip")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn enrich_reports_when_nothing_resolves() {
        let app = app!(state(10));
        let archive = zip_of(&[(
            "Streaming_History_Audio_2023.json",
            r#"[{"ts":"2023-06-01T12:00:00Z","ip_addr":"10.0.0.1"}]"#,
        )]);
        let req = test::TestRequest::post()
            .uri("/api/enrich")
            .set_payload(archive)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(
            body["error"],
            json!("File processed, but no valid, geolocatable IP addresses were found.")
        );
        assert!(body["details"].is_string());
    }
}
