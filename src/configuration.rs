//! Options for an analysis run.
//!
//! A piped PPM stream carries no frame count, so the only thing worth
//! configuring on the dispatcher side is how the run is observed:
//! [`AnalysisOptions`] holds an optional [`ProgressCallback`] and how many
//! frames pass between two reports. Transcoder settings (executable, time
//! limit) live on [`Transcoder`](crate::Transcoder) instead.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use cutscore::{AnalysisOptions, ProgressCallback, ProgressInfo, VideoAnalyzer};
//!
//! struct FrameCounter;
//! impl ProgressCallback for FrameCounter {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         eprintln!("{} frame(s) scored", info.current);
//!     }
//! }
//!
//! let analyzer = VideoAnalyzer::new("ffmpeg").with_options(
//!     AnalysisOptions::new()
//!         .with_progress(Arc::new(FrameCounter))
//!         .with_batch_size(25),
//! );
//! ```

use std::fmt;
use std::sync::Arc;

use crate::progress::{NoOpProgress, ProgressCallback};

/// How an analysis run reports its progress.
///
/// Cloning shares the callback.
#[derive(Clone)]
pub struct AnalysisOptions {
    pub(crate) progress: Option<Arc<dyn ProgressCallback>>,
    pub(crate) batch_size: u64,
}

impl AnalysisOptions {
    /// Silent options: no callback, one report per frame once one is set.
    pub fn new() -> Self {
        Self {
            progress: None,
            batch_size: 1,
        }
    }

    /// Report progress to `callback` while frames are dispatched, plus one
    /// final report with `finished` set after the last frame.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Frames dispatched between two progress reports. `0` is treated as `1`.
    #[must_use]
    pub fn with_batch_size(mut self, frames: u64) -> Self {
        self.batch_size = frames.max(1);
        self
    }

    /// Frames dispatched between two progress reports.
    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    pub(crate) fn progress_callback(&self) -> Arc<dyn ProgressCallback> {
        match &self.progress {
            Some(callback) => Arc::clone(callback),
            None => Arc::new(NoOpProgress),
        }
    }
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self::new()
    }
}

// Callbacks are trait objects, so only their presence is shown.
impl fmt::Debug for AnalysisOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisOptions")
            .field("has_progress", &self.progress.is_some())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}
