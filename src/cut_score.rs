//! Sum-of-absolute-differences cut scoring.
//!
//! [`CutScorePlugin`] compares every frame with the one before it and emits a
//! [`ScoreRecord`] per frame. The score is the sum over all pixels of
//! `|R1-R2| + |G1-G2| + |B1-B2|`; identical frames score 0 and a hard cut
//! scores high. The first frame has nothing to compare against and gets
//! [`INCOMPARABLE_SCORE`]. Deciding where the cuts are is left to the
//! consumer of the records.
//!
//! Records go to a [`RecordSink`]: [`CsvSink`] writes the
//! `frame,score,processingTime` CSV format, and `Vec<ScoreRecord>` collects
//! them in memory.
//!
//! # Example
//!
//! ```
//! use cutscore::{CutScorePlugin, INCOMPARABLE_SCORE, ScoreRecord, VideoFrame, ppm};
//!
//! let mut bright = VideoFrame::new(2, 1);
//! bright.set(1, 0, 10, 10, 10)?;
//!
//! let mut stream = Vec::new();
//! ppm::write_frame(&mut stream, &bright)?;
//! ppm::write_frame(&mut stream, &VideoFrame::new(2, 1))?;
//!
//! let mut plugin = CutScorePlugin::new(Vec::<ScoreRecord>::new());
//! cutscore::run(stream.as_slice(), &mut plugin)?;
//!
//! let records = plugin.into_sink();
//! assert_eq!(records[0].score, INCOMPARABLE_SCORE);
//! assert_eq!(records[1].score, 30);
//! # Ok::<(), cutscore::CutScoreError>(())
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use crate::analysis::AnalysisPlugin;
use crate::error::CutScoreError;
use crate::frame::{CHANNELS, VideoFrame};

/// Score given to a frame with no predecessor.
pub const INCOMPARABLE_SCORE: u64 = u64::MAX;

/// Header line of the CSV output.
pub const CSV_HEADER: &str = "frame,score,processingTime";

/// The score of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreRecord {
    /// Zero-based frame index.
    pub frame_index: u32,
    /// Dissimilarity to the previous frame, or [`INCOMPARABLE_SCORE`].
    pub score: u64,
    /// Wall-clock time spent computing the score, in milliseconds.
    pub processing_time_ms: u64,
}

impl ScoreRecord {
    /// `true` if the frame had no predecessor to compare against.
    pub fn is_incomparable(&self) -> bool {
        self.score == INCOMPARABLE_SCORE
    }
}

/// Sum of absolute channel differences between two frames.
///
/// Returns `None` if the frames differ in width or height. The sum is
/// symmetric and zero for identical frames.
pub fn sad_score(a: &VideoFrame, b: &VideoFrame) -> Option<u64> {
    if !a.is_comparable(b) {
        return None;
    }
    let row_len = (a.width() as usize * CHANNELS).max(1);
    Some(sum_abs_diff(a.samples(), b.samples(), row_len))
}

#[cfg(not(feature = "rayon"))]
fn sum_abs_diff(a: &[u8], b: &[u8], _row_len: usize) -> u64 {
    row_abs_diff(a, b)
}

#[cfg(feature = "rayon")]
fn sum_abs_diff(a: &[u8], b: &[u8], row_len: usize) -> u64 {
    use rayon::prelude::*;

    a.par_chunks(row_len)
        .zip(b.par_chunks(row_len))
        .map(|(row_a, row_b)| row_abs_diff(row_a, row_b))
        .sum()
}

fn row_abs_diff(a: &[u8], b: &[u8]) -> u64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| u64::from(x.abs_diff(y)))
        .sum()
}

/// Destination for score records.
pub trait RecordSink {
    /// Called once before the first record.
    fn begin(&mut self) -> Result<(), CutScoreError> {
        Ok(())
    }

    /// Called once per record, in frame order.
    fn record(&mut self, record: &ScoreRecord) -> Result<(), CutScoreError>;

    /// Called once after the last record. Flush buffered output here.
    fn finish(&mut self) -> Result<(), CutScoreError> {
        Ok(())
    }
}

impl RecordSink for Vec<ScoreRecord> {
    fn record(&mut self, record: &ScoreRecord) -> Result<(), CutScoreError> {
        self.push(*record);
        Ok(())
    }
}

impl<S: RecordSink + ?Sized> RecordSink for &mut S {
    fn begin(&mut self) -> Result<(), CutScoreError> {
        (**self).begin()
    }

    fn record(&mut self, record: &ScoreRecord) -> Result<(), CutScoreError> {
        (**self).record(record)
    }

    fn finish(&mut self) -> Result<(), CutScoreError> {
        (**self).finish()
    }
}

/// Writes records as `frame,score,processingTime` CSV lines.
#[derive(Debug)]
pub struct CsvSink<W: Write> {
    writer: W,
}

impl CsvSink<BufWriter<File>> {
    /// Create (or truncate) the file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, CutScoreError> {
        let file = File::create(path.as_ref())?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> CsvSink<W> {
    /// Write CSV to `writer`.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Recover the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RecordSink for CsvSink<W> {
    fn begin(&mut self) -> Result<(), CutScoreError> {
        writeln!(self.writer, "{CSV_HEADER}")?;
        Ok(())
    }

    fn record(&mut self, record: &ScoreRecord) -> Result<(), CutScoreError> {
        writeln!(
            self.writer,
            "{},{},{}",
            record.frame_index, record.score, record.processing_time_ms
        )?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), CutScoreError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Scores each frame against its predecessor.
///
/// Holds at most one previous frame. On a dimension change the run fails
/// with [`CutScoreError::DimensionMismatch`]; records already emitted are
/// left as they are.
#[derive(Debug)]
pub struct CutScorePlugin<S> {
    sink: S,
    previous: Option<VideoFrame>,
}

impl<S: RecordSink> CutScorePlugin<S> {
    /// Send records to `sink`.
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            previous: None,
        }
    }

    /// The record sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Consume the plugin and return its sink.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Score `frame` against the held previous frame, then hold `frame`.
    ///
    /// The held frame is replaced even when scoring fails.
    pub fn score_frame(&mut self, index: u32, frame: VideoFrame) -> Result<ScoreRecord, CutScoreError> {
        let started = Instant::now();
        let score = match &self.previous {
            None => Ok(INCOMPARABLE_SCORE),
            Some(previous) => sad_score(previous, &frame).ok_or(CutScoreError::DimensionMismatch {
                frame_index: index,
                expected: previous.dimensions(),
                actual: frame.dimensions(),
            }),
        };
        let processing_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        self.previous = Some(frame);

        Ok(ScoreRecord {
            frame_index: index,
            score: score?,
            processing_time_ms,
        })
    }
}

impl<S: RecordSink> AnalysisPlugin for CutScorePlugin<S> {
    fn start(&mut self) -> Result<(), CutScoreError> {
        self.previous = None;
        self.sink.begin()
    }

    fn frame(&mut self, index: u32, frame: VideoFrame) -> Result<(), CutScoreError> {
        let record = self.score_frame(index, frame)?;
        log::trace!("Frame {index}: score {}", record.score);
        self.sink.record(&record)
    }

    fn end(&mut self) -> Result<(), CutScoreError> {
        self.previous = None;
        self.sink.finish()
    }
}
