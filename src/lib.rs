//! # cutscore
//!
//! Stream raw frames out of an FFmpeg child process and score how much each
//! frame differs from the one before it, for scene-cut analysis.
//!
//! FFmpeg decodes the video and writes a pipe of binary PPM images to its
//! standard output. `cutscore` consumes that pipe one frame at a time, never
//! buffering the whole video, and hands each frame to an
//! [`AnalysisPlugin`]. The bundled [`CutScorePlugin`] computes the sum of
//! absolute channel differences against the previous frame.
//!
//! ## Quick Start
//!
//! ### Score a Video
//!
//! ```no_run
//! use cutscore::{CsvSink, CutScorePlugin, VideoAnalyzer};
//!
//! let mut plugin = CutScorePlugin::new(CsvSink::create("scores.csv").unwrap());
//! VideoAnalyzer::new("/usr/bin/ffmpeg")
//!     .analyze("input.mp4", &mut plugin)
//!     .unwrap();
//! ```
//!
//! ### Iterate Frames
//!
//! ```no_run
//! use cutscore::VideoAnalyzer;
//!
//! let analyzer = VideoAnalyzer::new("ffmpeg").with_time_limit(5);
//! for (index, frame) in analyzer.frames("input.mp4").unwrap().enumerate() {
//!     let frame = frame.unwrap();
//!     frame.to_rgb_image().unwrap().save(format!("frame_{index:06}.png")).unwrap();
//! }
//! ```
//!
//! ### Write a Custom Analysis
//!
//! ```
//! use cutscore::{AnalysisPlugin, CutScoreError, VideoFrame};
//!
//! #[derive(Default)]
//! struct Brightness(Vec<f64>);
//!
//! impl AnalysisPlugin for Brightness {
//!     fn frame(&mut self, _index: u32, frame: VideoFrame) -> Result<(), CutScoreError> {
//!         let samples = frame.samples();
//!         let sum: u64 = samples.iter().map(|&s| u64::from(s)).sum();
//!         self.0.push(sum as f64 / samples.len().max(1) as f64);
//!         Ok(())
//!     }
//! }
//!
//! let mut plugin = Brightness::default();
//! let frames = cutscore::run(&b""[..], &mut plugin)?;
//! assert_eq!(frames, 0);
//! # Ok::<(), CutScoreError>(())
//! ```
//!
//! ## Features
//!
//! - **Streaming decode**: frames are pulled from the pipe one at a time;
//!   end of stream is detected without a prior frame count
//! - **Deadlock-free process handling**: FFmpeg's diagnostic output is
//!   drained on a background thread while frames are read
//! - **Plugin protocol**: `start` / `frame` / `end` lifecycle for any
//!   per-frame analysis
//! - **Progress reporting**: frame count and throughput callbacks
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `rayon` | Row-parallel score accumulation |
//! | `full` | Enables all of the above |
//!
//! ## Requirements
//!
//! An `ffmpeg` executable. No FFmpeg libraries are linked.

pub mod analysis;
pub mod configuration;
pub mod cut_score;
pub mod error;
pub mod frame;
pub mod ppm;
pub mod progress;
pub mod transcoder;

pub use analysis::{
    AnalysisPlugin, AnalysisSummary, FrameStream, VideoAnalyzer, run, run_with_options,
};
pub use configuration::AnalysisOptions;
pub use cut_score::{
    CSV_HEADER, CsvSink, CutScorePlugin, INCOMPARABLE_SCORE, RecordSink, ScoreRecord, sad_score,
};
pub use error::CutScoreError;
pub use frame::VideoFrame;
pub use ppm::{FrameDecoder, PpmHeader};
pub use progress::{ProgressCallback, ProgressInfo};
pub use transcoder::{DiagnosticReport, Transcoder, TranscoderExit, TranscoderProcess};
