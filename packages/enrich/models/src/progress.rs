//! Progress sinks for batch runs.
//!
//! The orchestrator pushes a [`BatchProgress`] snapshot into a
//! [`ProgressSink`] after every chunk. Implementations are provided for
//! synchronous and asynchronous channels, and a terminal progress bar
//! lives in the CLI utilities crate.

use std::sync::Arc;

use crate::BatchProgress;

/// Receives progress snapshots from a batch run.
///
/// Implementations must be `Send + Sync`; the orchestrator calls them from
/// whichever task is driving the run.
pub trait ProgressSink: Send + Sync {
    /// Called once before the first chunk with the initial snapshot.
    fn start(&self, _progress: &BatchProgress) {}

    /// Called after every chunk with the cumulative snapshot.
    fn report(&self, progress: &BatchProgress);

    /// Called once after the final chunk.
    fn finish(&self, _progress: &BatchProgress) {}
}

/// A [`ProgressSink`] that ignores every update.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&self, _progress: &BatchProgress) {}
}

/// Returns a shared [`NullProgress`] instance.
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressSink> {
    Arc::new(NullProgress)
}

// A dropped receiver means nobody is listening any more; the run carries on.

impl ProgressSink for std::sync::mpsc::Sender<BatchProgress> {
    fn report(&self, progress: &BatchProgress) {
        let _ = self.send(*progress);
    }
}

impl ProgressSink for tokio::sync::mpsc::UnboundedSender<BatchProgress> {
    fn report(&self, progress: &BatchProgress) {
        let _ = self.send(*progress);
    }
}

impl ProgressSink for tokio::sync::watch::Sender<BatchProgress> {
    fn start(&self, progress: &BatchProgress) {
        self.send_replace(*progress);
    }

    fn report(&self, progress: &BatchProgress) {
        self.send_replace(*progress);
    }
}

impl<T: ProgressSink + ?Sized> ProgressSink for Arc<T> {
    fn start(&self, progress: &BatchProgress) {
        (**self).start(progress);
    }

    fn report(&self, progress: &BatchProgress) {
        (**self).report(progress);
    }

    fn finish(&self, progress: &BatchProgress) {
        (**self).finish(progress);
    }
}
