//! Progress-callback trait for per-image compression events.
//!
//! Inject an [`Arc<dyn CompressionProgressCallback>`] via
//! [`crate::config::CompressionConfigBuilder::progress_callback`] to receive
//! events as the dispatcher collects finished jobs.
//!
//! The total is the number of candidate images found before any job starts;
//! `done` counts completed candidates regardless of whether they were
//! replaced, kept by the size guard, or fell back after a codec failure.
//!
//! # Example
//!
//! ```rust
//! use cyoa_compressor::{CompressionConfig, CompressionProgressCallback, SegmentReport};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl CompressionProgressCallback for Printer {
//!     fn on_segment_complete(&self, done: usize, total: usize, report: &SegmentReport) {
//!         eprintln!("{done}/{total}: segment {} → {} bytes", report.index, report.output_len);
//!     }
//! }
//!
//! let config = CompressionConfig::builder()
//!     .progress_callback(Arc::new(Printer))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{CompressionStats, SegmentReport};
use std::sync::Arc;

/// Called by the pipeline as a run progresses.
///
/// Events arrive from the dispatcher's control task, in completion order (not
/// document order). All methods default to no-ops.
pub trait CompressionProgressCallback: Send + Sync {
    /// Called once after splitting, before any job is submitted.
    fn on_run_start(&self, total_candidates: usize) {
        let _ = total_candidates;
    }

    /// Called when a candidate's job has finished, whatever its outcome.
    fn on_segment_complete(&self, done: usize, total: usize, report: &SegmentReport) {
        let _ = (done, total, report);
    }

    /// Called once after reassembly.
    fn on_run_complete(&self, stats: &CompressionStats) {
        let _ = stats;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl CompressionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::CompressionConfig`].
pub type ProgressCallback = Arc<dyn CompressionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::SegmentOutcome;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        total: AtomicUsize,
        completes: AtomicUsize,
        last_done: AtomicUsize,
    }

    impl CompressionProgressCallback for TrackingCallback {
        fn on_run_start(&self, total_candidates: usize) {
            self.total.store(total_candidates, Ordering::SeqCst);
        }

        fn on_segment_complete(&self, done: usize, _total: usize, _report: &SegmentReport) {
            self.completes.fetch_add(1, Ordering::SeqCst);
            self.last_done.store(done, Ordering::SeqCst);
        }
    }

    fn report(index: usize) -> SegmentReport {
        SegmentReport {
            index,
            classification: None,
            original_len: 10,
            output_len: 10,
            outcome: SegmentOutcome::NotSmaller,
            error: None,
            duration_ms: 1,
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(3);
        cb.on_segment_complete(1, 3, &report(1));
        cb.on_run_complete(&CompressionStats::default());
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_run_start(2);
        tracker.on_segment_complete(1, 2, &report(3));
        tracker.on_segment_complete(2, 2, &report(1));

        assert_eq!(tracker.total.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.last_done.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_run_start(10);
    }
}
