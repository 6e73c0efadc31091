#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the streaming-history enrichment tool.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use stream_atlas_cli_utils::IndicatifProgress;
use stream_atlas_enrich::Pipeline;
use stream_atlas_enrich::config::EnrichConfig;
use stream_atlas_geoip::GeoResolver;
use stream_atlas_geoip_models::ResolutionOutcome;

#[derive(Parser)]
#[command(
    name = "stream_atlas_enrich",
    about = "Geolocate the IP addresses in a streaming-history export"
)]
struct Cli {
    /// TOML settings file (overrides the built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enrich every record in an archive with its approximate location
    Enrich {
        /// ZIP export, or a single JSON file
        archive: PathBuf,
        /// GeoIP city database (`.mmdb`)
        #[arg(long)]
        db: Option<PathBuf>,
        /// Resolve through a lookup server instead of a local database
        #[arg(long)]
        remote: Option<String>,
        /// Unique addresses per chunk
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Seconds before a chunk is abandoned
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Blocking workers per chunk for local resolution
        #[arg(long)]
        concurrency: Option<usize>,
        /// Write the JSON result here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Print listening statistics instead of the enriched records
        #[arg(long)]
        summary: bool,
    },
    /// Resolve individual addresses
    Lookup {
        /// Addresses to resolve
        #[arg(required = true)]
        ips: Vec<String>,
        /// GeoIP city database (`.mmdb`)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Report what an archive contains without resolving anything
    Inspect {
        /// ZIP export, or a single JSON file
        archive: PathBuf,
    },
}

#[allow(clippy::too_many_lines)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = stream_atlas_cli_utils::init_logger();
    let cli = Cli::parse();
    let mut config = EnrichConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Enrich {
            archive,
            db,
            remote,
            chunk_size,
            timeout_secs,
            concurrency,
            output,
            summary,
        } => {
            if db.is_some() {
                config.geoip_db = db;
            }
            if remote.is_some() {
                config.remote_url = remote;
            }
            if let Some(v) = chunk_size {
                config.chunk_size = v;
            }
            if let Some(v) = timeout_secs {
                config.chunk_timeout_secs = v;
            }
            if let Some(v) = concurrency {
                config.concurrency = v;
            }
            config.validate()?;

            let start = Instant::now();
            let pipeline = Pipeline::from_config(&config)?;

            let spinner = IndicatifProgress::spinner(&multi, "Reading archive...");
            let extraction = pipeline.extract_path(&archive)?;
            spinner.finish_and_clear();

            let bar = IndicatifProgress::addresses_bar(&multi, "Resolving addresses");
            let result = pipeline.run_extraction(extraction, &*bar).await?;

            log::info!(
                "{} ({:.1}s)",
                result.status_message(),
                start.elapsed().as_secs_f64()
            );

            let json = if summary {
                let stats = stream_atlas_analytics::summarize(&result.enriched_records, 10);
                serde_json::to_string_pretty(&stats)?
            } else {
                serde_json::to_string_pretty(&result)?
            };
            write_output(output.as_deref(), &json)?;
        }
        Commands::Lookup { ips, db } => {
            let geo = GeoResolver::locate_and_open(db.as_deref().or(config.geoip_db.as_deref()))?;
            for ip in &ips {
                match geo.resolve(ip) {
                    ResolutionOutcome::Resolved(location) => println!(
                        "{ip:<40} {:>9.4} {:>10.4}  {}, {}",
                        location.latitude,
                        location.longitude,
                        location.city.as_deref().unwrap_or("-"),
                        location.country_code.as_deref().unwrap_or("-"),
                    ),
                    ResolutionOutcome::Unresolved { reason } => {
                        println!("{ip:<40} unresolved ({reason})");
                    }
                }
            }
        }
        Commands::Inspect { archive } => {
            let extraction =
                stream_atlas_archive::extract_path(&archive, &config.extract_options())?;

            println!("Entries:          {}", extraction.report.entries.len());
            for name in &extraction.report.entries {
                println!("  {name}");
            }
            println!("Records:          {}", extraction.records.len());
            println!("Unique addresses: {}", extraction.addresses.len());

            if !extraction.report.failed_entries.is_empty() {
                println!("Failed entries:");
                for failure in &extraction.report.failed_entries {
                    println!("  {}: {}", failure.name, failure.reason);
                }
            }
            if !extraction.report.skipped_entries.is_empty() {
                println!("Skipped:");
                for skipped in &extraction.report.skipped_entries {
                    println!(
                        "  {}: {} ({})",
                        skipped.name, skipped.reason, skipped.count
                    );
                }
            }
        }
    }

    Ok(())
}

fn write_output(path: Option<&Path>, json: &str) -> std::io::Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, json)?;
            log::info!("Wrote {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
