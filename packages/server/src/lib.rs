#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web lookup and enrichment service.
//!
//! - `GET /api/health`: liveness plus GeoIP database metadata.
//! - `POST /api/lookup`: resolve a batch of addresses (`{"ips": [...]}`).
//!   This is also the endpoint remote chunk resolution talks to.
//! - `POST /api/enrich`: upload a streaming-history ZIP as the raw request
//!   body; returns the enriched records, counts, a listening summary and a
//!   status message.
//!
//! The GeoIP database is opened once at startup and shared by every
//! worker; a missing database stops the server before it binds.

mod handlers;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use stream_atlas_enrich::Pipeline;
use stream_atlas_enrich::config::EnrichConfig;
use stream_atlas_geoip::GeoResolver;

/// Default cap on addresses per `/api/lookup` request.
pub const DEFAULT_MAX_LOOKUP_BATCH: usize = 5000;

/// Overrides [`DEFAULT_MAX_LOOKUP_BATCH`].
pub const MAX_LOOKUP_BATCH_ENV_VAR: &str = "STREAM_ATLAS_MAX_LOOKUP_BATCH";

/// Largest accepted `/api/enrich` upload (100 MiB).
pub const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Largest accepted `/api/lookup` JSON body.
const MAX_LOOKUP_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Entries in each ranked list of the listening summary.
const SUMMARY_TOP_N: usize = 10;

/// Shared application state.
pub struct AppState {
    /// Resolver over the shared GeoIP database.
    pub geo: GeoResolver,
    /// In-process enrichment pipeline over the same database.
    pub pipeline: Arc<Pipeline>,
    /// Maximum addresses per lookup request.
    pub max_lookup_batch: usize,
}

impl AppState {
    /// Builds the state from settings and an open resolver.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline settings are invalid.
    pub fn new(
        config: &EnrichConfig,
        geo: GeoResolver,
        max_lookup_batch: usize,
    ) -> Result<Self, stream_atlas_enrich::SetupError> {
        let pipeline = Pipeline::local(config, geo.clone())?;
        Ok(Self {
            geo,
            pipeline: Arc::new(pipeline),
            max_lookup_batch,
        })
    }
}

/// Registers the `/api` routes and body limits.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::PayloadConfig::new(MAX_UPLOAD_BYTES))
        .app_data(web::JsonConfig::default().limit(MAX_LOOKUP_BODY_BYTES))
        .service(
            web::scope("/api")
                .route("/health", web::get().to(handlers::health))
                .route("/lookup", web::post().to(handlers::lookup))
                .route("/enrich", web::post().to(handlers::enrich)),
        );
}

/// Starts the server.
///
/// Loads settings, opens the GeoIP database, and serves until shut down.
/// The caller provides the async runtime (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the settings are invalid, the
/// GeoIP database cannot be opened, or the HTTP server fails to bind.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let config = EnrichConfig::load(None).map_err(std::io::Error::other)?;

    log::info!("Opening GeoIP database...");
    let geo = GeoResolver::locate_and_open(config.geoip_db.as_deref()).map_err(|e| {
        log::error!("{e}");
        std::io::Error::other(e)
    })?;

    let max_lookup_batch = std::env::var(MAX_LOOKUP_BATCH_ENV_VAR)
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|&n: &usize| n > 0)
        .unwrap_or(DEFAULT_MAX_LOOKUP_BATCH);

    let state = web::Data::new(
        AppState::new(&config, geo, max_lookup_batch).map_err(std::io::Error::other)?,
    );

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    log::info!("Starting server on {bind_addr}:{port} (max lookup batch {max_lookup_batch})");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((bind_addr, port))?
    .run()
    .await
}
