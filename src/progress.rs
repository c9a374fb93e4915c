//! Progress reporting.
//!
//! This module provides [`ProgressCallback`] for monitoring an analysis run
//! and [`ProgressInfo`] for progress snapshots. The frame count of a piped
//! stream is unknown until it ends, so progress is reported as frames
//! processed and throughput rather than a percentage.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use cutscore::{AnalysisOptions, ProgressCallback, ProgressInfo};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("{} frames ({:.1} fps)", info.current, info.frames_per_second);
//!     }
//! }
//!
//! let options = AnalysisOptions::new()
//!     .with_progress(Arc::new(PrintProgress))
//!     .with_batch_size(25);
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

/// A snapshot of analysis progress.
///
/// Delivered to [`ProgressCallback::on_progress`] at a cadence controlled
/// by [`AnalysisOptions::with_batch_size`](crate::AnalysisOptions::with_batch_size).
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// How many frames have been processed so far.
    pub current: u64,
    /// Wall-clock time elapsed since the run started.
    pub elapsed: Duration,
    /// Average processing rate since the run started.
    pub frames_per_second: f64,
    /// Index of the frame just processed. `None` in the final report.
    pub current_frame: Option<u32>,
    /// `true` for the single report emitted when the stream ends.
    pub finished: bool,
}

/// Trait for receiving progress updates during analysis.
///
/// Implementations must be [`Send`] and [`Sync`] so a single callback can be
/// shared between runs on different threads.
///
/// Progress callbacks are **infallible**: they observe but cannot halt the
/// run.
pub trait ProgressCallback: Send + Sync {
    /// Called at regular intervals during a run.
    fn on_progress(&self, info: &ProgressInfo);
}

/// A no-op implementation that discards all progress notifications.
///
/// This is the default when no callback is configured.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Internal helper that tracks progress timing and emits callbacks.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    current: u64,
    batch_size: u64,
    start_time: Instant,
    items_since_last_report: u64,
}

impl ProgressTracker {
    pub(crate) fn new(callback: Arc<dyn ProgressCallback>, batch_size: u64) -> Self {
        Self {
            callback,
            current: 0,
            batch_size: batch_size.max(1),
            start_time: Instant::now(),
            items_since_last_report: 0,
        }
    }

    /// Record one processed frame and fire the callback if the batch
    /// threshold is reached.
    pub(crate) fn advance(&mut self, frame_index: u32) {
        self.current += 1;
        self.items_since_last_report += 1;

        if self.items_since_last_report >= self.batch_size {
            self.report(Some(frame_index), false);
            self.items_since_last_report = 0;
        }
    }

    /// Unconditionally emit a final progress report.
    pub(crate) fn finish(&mut self) {
        self.report(None, true);
    }

    fn report(&self, current_frame: Option<u32>, finished: bool) {
        let elapsed = self.start_time.elapsed();
        let seconds = elapsed.as_secs_f64();
        let frames_per_second = if seconds > 0.0 {
            self.current as f64 / seconds
        } else {
            0.0
        };

        let info = ProgressInfo {
            current: self.current,
            elapsed,
            frames_per_second,
            current_frame,
            finished,
        };

        self.callback.on_progress(&info);
    }
}
