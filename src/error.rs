//! Error types for the `cutscore` crate.
//!
//! This module defines [`CutScoreError`], the unified error type returned by
//! all fallible operations in the crate. Stream-framing errors carry the index
//! of the frame being decoded so a failed run can be located in the source
//! video.

use std::{io::Error as IoError, path::PathBuf};

use image::ImageError;
use thiserror::Error;

/// The unified error type for all `cutscore` operations.
///
/// Every public method that can fail returns `Result<T, CutScoreError>`.
/// None of these conditions are transient, so nothing in the crate retries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CutScoreError {
    /// The transcoder executable could not be started.
    #[error("Failed to spawn transcoder {path}: {reason}")]
    ProcessSpawn {
        /// Executable that was passed to [`crate::Transcoder::new`].
        path: PathBuf,
        /// Underlying reason the spawn failed.
        reason: String,
    },

    /// A frame header did not follow the raw-pixel image format.
    #[error("Malformed header at frame {frame_index}: {reason}")]
    MalformedHeader {
        /// Index of the frame whose header was being parsed.
        frame_index: u32,
        /// What was wrong with the header.
        reason: String,
    },

    /// The stream ended before a frame's pixel payload was complete.
    #[error("Truncated frame {frame_index}: expected {expected} payload bytes, got {actual}")]
    TruncatedFrame {
        /// Index of the incomplete frame.
        frame_index: u32,
        /// Payload size announced by the header.
        expected: usize,
        /// Bytes actually available before end of stream.
        actual: usize,
    },

    /// The header advertised more than one byte per channel sample.
    #[error(
        "Unsupported sample depth at frame {frame_index}: max sample value {max_sample_value} exceeds 255"
    )]
    UnsupportedSampleDepth {
        /// Index of the offending frame.
        frame_index: u32,
        /// Maximum sample value found in the header.
        max_sample_value: u32,
    },

    /// Two frames that must be compared have different dimensions.
    #[error(
        "Dimension mismatch at frame {frame_index}: expected {}x{}, got {}x{}",
        expected.0, expected.1, actual.0, actual.1
    )]
    DimensionMismatch {
        /// Index of the frame that did not match its predecessor.
        frame_index: u32,
        /// `(width, height)` of the previous frame.
        expected: (u32, u32),
        /// `(width, height)` of the current frame.
        actual: (u32, u32),
    },

    /// A pixel coordinate lies outside the frame.
    #[error("Pixel ({x}, {y}) is out of bounds for a {width}x{height} frame")]
    OutOfBounds {
        /// Requested column.
        x: u32,
        /// Requested row.
        y: u32,
        /// Frame width.
        width: u32,
        /// Frame height.
        height: u32,
    },

    /// A raw sample buffer does not hold exactly `width * height * 3` bytes.
    #[error("Invalid frame data: {width}x{height} needs {expected} samples, got {actual}")]
    InvalidFrameData {
        /// Frame width.
        width: u32,
        /// Frame height.
        height: u32,
        /// Required number of samples.
        expected: usize,
        /// Number of samples supplied.
        actual: usize,
    },

    /// The transcoder's standard output has already been handed out.
    #[error("Transcoder output stream is no longer available")]
    StreamUnavailable,

    /// An analysis plugin reported a failure.
    #[error("Analysis plugin error: {0}")]
    PluginError(String),

    /// The byte source failed while a frame was being decoded.
    #[error("Stream read failed at frame {frame_index}: {source}")]
    StreamRead {
        /// Index of the frame being decoded.
        frame_index: u32,
        /// Underlying I/O failure.
        #[source]
        source: IoError,
    },

    /// An I/O error occurred outside frame decoding, such as writing output.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate during frame conversion or saving.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),
}

impl CutScoreError {
    /// Index of the frame at which the error occurred, if known.
    pub fn frame_index(&self) -> Option<u32> {
        match self {
            CutScoreError::MalformedHeader { frame_index, .. }
            | CutScoreError::TruncatedFrame { frame_index, .. }
            | CutScoreError::UnsupportedSampleDepth { frame_index, .. }
            | CutScoreError::DimensionMismatch { frame_index, .. }
            | CutScoreError::StreamRead { frame_index, .. } => Some(*frame_index),
            _ => None,
        }
    }
}
