#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared CLI utilities for the stream atlas tools.
//!
//! Provides an `indicatif`-backed [`ProgressSink`] for batch runs, plus
//! [`init_logger`] which sets up `indicatif-log-bridge` so that
//! `log::info!` and friends are suspended while progress bars redraw.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use stream_atlas_enrich_models::BatchProgress;
use stream_atlas_enrich_models::progress::ProgressSink;

pub use indicatif::MultiProgress;

/// An `indicatif` [`ProgressBar`] that implements [`ProgressSink`].
pub struct IndicatifProgress {
    bar: ProgressBar,
    /// Style to switch to once the run reports its total.
    bar_style: ProgressStyle,
}

impl IndicatifProgress {
    /// Creates a bar for address resolution. It starts as a spinner and
    /// becomes a full bar with percentage and ETA once the run starts.
    #[must_use]
    pub fn addresses_bar(multi: &MultiProgress, message: &str) -> Arc<Self> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.yellow} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());

        let bar_style = ProgressStyle::with_template(
            "  {msg} {wide_bar:.yellow/dim} {pos}/{len} {percent}% [{eta}]",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

        Arc::new(Self { bar, bar_style })
    }

    /// Creates a spinner for work with no known length, such as reading an
    /// archive.
    #[must_use]
    pub fn spinner(multi: &MultiProgress, message: &str) -> ProgressBar {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());
        bar
    }
}

impl ProgressSink for IndicatifProgress {
    fn start(&self, progress: &BatchProgress) {
        self.bar.set_length(progress.total_count as u64);
        self.bar.set_position(0);
        // Switch from spinner to bar style now that we know the total.
        self.bar.set_style(self.bar_style.clone());
    }

    fn report(&self, progress: &BatchProgress) {
        self.bar.set_position(progress.processed_count as u64);
        if progress.failed_count > 0 {
            self.bar
                .set_message(format!("{} unresolved", progress.failed_count));
        }
    }

    fn finish(&self, progress: &BatchProgress) {
        self.bar.finish_with_message(format!(
            "{} resolved, {} unresolved",
            progress.resolved_count(),
            progress.failed_count
        ));
    }
}

/// Initializes the global logger wrapped in `indicatif-log-bridge` so that
/// `log::info!` and friends are suspended while progress bars redraw.
///
/// Returns the [`MultiProgress`] that all progress bars must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    // Build the pretty-env-logger logger manually so we can wrap it.
    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok(); // Ignore error if logger was already set (e.g., in tests)

    log::set_max_level(level);

    multi
}
