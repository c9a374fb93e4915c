//! Frame analysis dispatch.
//!
//! An [`AnalysisPlugin`] receives a `start` call, one `frame` call per decoded
//! frame in stream order, and an `end` call. [`run`] drives a plugin from any
//! byte source carrying a PPM stream; [`VideoAnalyzer`] adds the transcoder
//! so a plugin can be run directly over a video file.
//!
//! # Example
//!
//! ```no_run
//! use cutscore::{CsvSink, CutScorePlugin, VideoAnalyzer};
//!
//! let mut plugin = CutScorePlugin::new(CsvSink::create("scores.csv")?);
//! let summary = VideoAnalyzer::new("ffmpeg")
//!     .with_time_limit(60)
//!     .analyze("input.mp4", &mut plugin)?;
//! println!("scored {} frame(s)", summary.frames);
//! # Ok::<(), cutscore::CutScoreError>(())
//! ```

use std::io::Read;
use std::iter::FusedIterator;
use std::path::{Path, PathBuf};
use std::process::ChildStdout;

use crate::configuration::AnalysisOptions;
use crate::error::CutScoreError;
use crate::frame::VideoFrame;
use crate::ppm::FrameDecoder;
use crate::progress::ProgressTracker;
use crate::transcoder::{Transcoder, TranscoderExit, TranscoderProcess};

/// A per-frame analysis.
///
/// Frames arrive with indices `0, 1, 2, ...` without gaps. Each frame is
/// handed over by value; the dispatcher keeps no copy.
///
/// Returning an error from any method aborts the run. `end` is only called
/// after the whole stream has been delivered successfully.
pub trait AnalysisPlugin {
    /// Called once before the first frame.
    fn start(&mut self) -> Result<(), CutScoreError> {
        Ok(())
    }

    /// Called once per decoded frame.
    fn frame(&mut self, index: u32, frame: VideoFrame) -> Result<(), CutScoreError>;

    /// Called once after the last frame, even if there were none.
    fn end(&mut self) -> Result<(), CutScoreError> {
        Ok(())
    }
}

impl<P: AnalysisPlugin + ?Sized> AnalysisPlugin for &mut P {
    fn start(&mut self) -> Result<(), CutScoreError> {
        (**self).start()
    }

    fn frame(&mut self, index: u32, frame: VideoFrame) -> Result<(), CutScoreError> {
        (**self).frame(index, frame)
    }

    fn end(&mut self) -> Result<(), CutScoreError> {
        (**self).end()
    }
}

/// Decode `source` and feed every frame to `plugin`.
///
/// Returns the number of frames delivered.
///
/// # Errors
///
/// Any decode error or plugin error. `plugin.end()` is not called in that
/// case.
pub fn run<R, P>(source: R, plugin: &mut P) -> Result<u32, CutScoreError>
where
    R: Read,
    P: AnalysisPlugin + ?Sized,
{
    run_with_options(source, plugin, &AnalysisOptions::default())
}

/// Like [`run`], with progress reporting.
pub fn run_with_options<R, P>(
    source: R,
    plugin: &mut P,
    options: &AnalysisOptions,
) -> Result<u32, CutScoreError>
where
    R: Read,
    P: AnalysisPlugin + ?Sized,
{
    let mut decoder = FrameDecoder::new(source);
    let mut tracker = ProgressTracker::new(options.progress_callback(), options.batch_size);

    plugin.start()?;

    let mut index: u32 = 0;
    while let Some(frame) = decoder.decode_next()? {
        plugin.frame(index, frame)?;
        tracker.advance(index);
        index += 1;
    }

    plugin.end()?;
    tracker.finish();

    Ok(index)
}

/// Outcome of [`VideoAnalyzer::analyze`].
#[derive(Debug, Clone)]
pub struct AnalysisSummary {
    /// Number of frames delivered to the plugin.
    pub frames: u32,
    /// How the transcoder exited.
    pub transcoder_exit: TranscoderExit,
}

/// Runs analysis plugins over video files through an FFmpeg child process.
#[derive(Debug, Clone)]
pub struct VideoAnalyzer {
    transcoder: Transcoder,
    options: AnalysisOptions,
}

impl VideoAnalyzer {
    /// Use the FFmpeg executable at `ffmpeg`.
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self::from_transcoder(Transcoder::new(ffmpeg))
    }

    /// Use a preconfigured [`Transcoder`].
    pub fn from_transcoder(transcoder: Transcoder) -> Self {
        Self {
            transcoder,
            options: AnalysisOptions::default(),
        }
    }

    /// Only analyse the first `seconds` of each video. `0` means unlimited.
    #[must_use]
    pub fn with_time_limit(mut self, seconds: u32) -> Self {
        self.transcoder = self.transcoder.time_limit(seconds);
        self
    }

    /// Set progress options.
    #[must_use]
    pub fn with_options(mut self, options: AnalysisOptions) -> Self {
        self.options = options;
        self
    }

    /// The transcoder configuration.
    pub fn transcoder(&self) -> &Transcoder {
        &self.transcoder
    }

    /// Transcode `input` and run `plugin` over every frame.
    ///
    /// The transcoder is shut down before this returns, on success and on
    /// every error path. A nonzero exit after a clean end of stream is logged
    /// and reported in the summary, not treated as an error.
    ///
    /// # Errors
    ///
    /// [`CutScoreError::ProcessSpawn`], any decode error, or any error the
    /// plugin returns.
    pub fn analyze<P>(
        &self,
        input: impl AsRef<Path>,
        plugin: &mut P,
    ) -> Result<AnalysisSummary, CutScoreError>
    where
        P: AnalysisPlugin + ?Sized,
    {
        let input = input.as_ref();
        log::info!("Analysing {}", input.display());

        let mut process = self.transcoder.launch(input)?;
        let result = process
            .take_stdout()
            .and_then(|stdout| run_with_options(stdout, plugin, &self.options));

        match result {
            Ok(frames) => {
                let exit = process.shutdown()?;
                warn_on_failed_exit(&exit, frames);
                Ok(AnalysisSummary {
                    frames,
                    transcoder_exit: exit,
                })
            }
            Err(error) => {
                abort_process(&mut process);
                Err(error)
            }
        }
    }

    /// Transcode `input` and return a lazy iterator over its frames.
    ///
    /// # Errors
    ///
    /// [`CutScoreError::ProcessSpawn`] if the transcoder cannot be started.
    pub fn frames(&self, input: impl AsRef<Path>) -> Result<FrameStream, CutScoreError> {
        let mut process = self.transcoder.launch(input)?;
        let stdout = process.take_stdout()?;
        Ok(FrameStream {
            decoder: FrameDecoder::new(stdout),
            process,
            finished: false,
        })
    }
}

/// A lazy iterator over the frames of a transcoded video.
///
/// Owns the transcoder process. When the stream ends the process is shut
/// down; dropping the iterator early kills it.
pub struct FrameStream {
    // Declared before `process` so the pipe closes before the child is reaped.
    decoder: FrameDecoder<ChildStdout>,
    process: TranscoderProcess,
    finished: bool,
}

impl FrameStream {
    /// Number of frames yielded so far.
    pub fn frames_decoded(&self) -> u32 {
        self.decoder.frames_decoded()
    }

    /// How the transcoder exited, once the stream has ended.
    pub fn transcoder_exit(&self) -> Option<&TranscoderExit> {
        self.process.exit()
    }
}

impl Iterator for FrameStream {
    type Item = Result<VideoFrame, CutScoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.decoder.decode_next() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.finished = true;
                match self.process.shutdown() {
                    Ok(exit) => {
                        warn_on_failed_exit(&exit, self.decoder.frames_decoded());
                        None
                    }
                    Err(error) => Some(Err(error)),
                }
            }
            Err(error) => {
                self.finished = true;
                abort_process(&mut self.process);
                Some(Err(error))
            }
        }
    }
}

impl FusedIterator for FrameStream {}

fn warn_on_failed_exit(exit: &TranscoderExit, frames: u32) {
    if exit.success() {
        return;
    }
    log::warn!(
        "Transcoder exited with {} after {frames} frame(s); last diagnostics:\n{}",
        exit.status,
        exit.diagnostics.tail.trim_end()
    );
}

/// Kill and reap after a failed run. Failures here are logged so the
/// original error reaches the caller.
fn abort_process(process: &mut TranscoderProcess) {
    if let Err(error) = process.kill() {
        log::warn!("Failed to kill transcoder {}: {error}", process.id());
    }
    if let Err(error) = process.shutdown() {
        log::warn!("Failed to reap transcoder {}: {error}", process.id());
    }
}
