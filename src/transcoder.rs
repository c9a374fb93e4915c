//! External transcoder process management.
//!
//! [`Transcoder`] builds the FFmpeg command line that decodes a video into a
//! pipe of raw PPM images and starts it as a child process. The returned
//! [`TranscoderProcess`] hands out the child's standard output for frame
//! decoding while a background thread drains its diagnostic stream.
//!
//! The drain has to run concurrently with frame decoding. FFmpeg logs
//! progress to stderr continuously; once the stderr pipe buffer fills the
//! child blocks, stops producing frames, and a parent blocked on stdout would
//! wait forever.
//!
//! # Example
//!
//! ```no_run
//! use cutscore::{FrameDecoder, Transcoder};
//!
//! let mut process = Transcoder::new("ffmpeg").time_limit(10).launch("input.mp4")?;
//! let frames = FrameDecoder::new(process.take_stdout()?).count();
//! let exit = process.shutdown()?;
//! println!("{frames} frame(s), transcoder exited with {}", exit.status);
//! # Ok::<(), cutscore::CutScoreError>(())
//! ```

use std::ffi::OsString;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};

use crate::error::CutScoreError;

/// Bytes read from the diagnostic stream per blocking read.
const DRAIN_CHUNK_SIZE: usize = 1024;

/// Trailing diagnostic output kept for error reports.
const DIAGNOSTIC_TAIL_LIMIT: usize = 4096;

/// Builder for the transcoder command line.
#[derive(Debug, Clone)]
pub struct Transcoder {
    executable: PathBuf,
    time_limit_seconds: Option<u32>,
}

impl Transcoder {
    /// Use the FFmpeg executable at `executable`.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            time_limit_seconds: None,
        }
    }

    /// Stop the transcoder after `seconds` of output. `0` means unlimited.
    #[must_use]
    pub fn time_limit(mut self, seconds: u32) -> Self {
        self.time_limit_seconds = (seconds > 0).then_some(seconds);
        self
    }

    /// Path of the transcoder executable.
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Configured output time limit, if any.
    pub fn time_limit_seconds(&self) -> Option<u32> {
        self.time_limit_seconds
    }

    /// Arguments passed to the executable for `input`.
    ///
    /// `[-t <seconds>] -i <input> -f image2pipe -vcodec ppm -`
    pub fn command_args(&self, input: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::with_capacity(9);
        if let Some(seconds) = self.time_limit_seconds {
            args.push("-t".into());
            args.push(seconds.to_string().into());
        }
        args.push("-i".into());
        args.push(input.as_os_str().to_owned());
        args.extend(
            ["-f", "image2pipe", "-vcodec", "ppm", "-"]
                .into_iter()
                .map(OsString::from),
        );
        args
    }

    /// Start the transcoder on `input`.
    ///
    /// # Errors
    ///
    /// [`CutScoreError::ProcessSpawn`] if the executable cannot be started,
    /// [`CutScoreError::IoError`] if the drain thread cannot be created.
    pub fn launch(&self, input: impl AsRef<Path>) -> Result<TranscoderProcess, CutScoreError> {
        let args = self.command_args(input.as_ref());
        log::debug!("Launching {} {:?}", self.executable.display(), args);

        let mut child = Command::new(&self.executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| CutScoreError::ProcessSpawn {
                path: self.executable.clone(),
                reason: error.to_string(),
            })?;

        let drain = match child.stderr.take().map(spawn_drain).transpose() {
            Ok(drain) => drain,
            Err(error) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(error.into());
            }
        };
        let stdout = child.stdout.take();

        Ok(TranscoderProcess {
            child,
            stdout,
            drain,
            exit: None,
        })
    }
}

/// What the drain thread saw on the diagnostic stream.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticReport {
    /// Total bytes read and discarded.
    pub bytes: u64,
    /// The last few KiB of output, lossily decoded as UTF-8.
    pub tail: String,
}

/// Final state of a transcoder process.
#[derive(Debug, Clone)]
pub struct TranscoderExit {
    /// Exit status reported by the operating system.
    pub status: ExitStatus,
    /// Diagnostic output summary.
    pub diagnostics: DiagnosticReport,
}

impl TranscoderExit {
    /// `true` if the transcoder exited with status zero.
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// A running transcoder.
///
/// Dropping the handle without calling [`shutdown`](Self::shutdown) kills
/// the child and waits for it.
pub struct TranscoderProcess {
    child: Child,
    stdout: Option<ChildStdout>,
    drain: Option<JoinHandle<DiagnosticReport>>,
    exit: Option<TranscoderExit>,
}

impl TranscoderProcess {
    /// Operating-system process id.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Take the child's standard output. Can only be called once.
    ///
    /// # Errors
    ///
    /// [`CutScoreError::StreamUnavailable`] on the second call.
    pub fn take_stdout(&mut self) -> Result<ChildStdout, CutScoreError> {
        self.stdout.take().ok_or(CutScoreError::StreamUnavailable)
    }

    /// Ask the operating system to terminate the child.
    ///
    /// A child that has already exited is not an error.
    pub fn kill(&mut self) -> Result<(), CutScoreError> {
        if self.exit.is_some() {
            return Ok(());
        }
        match self.child.kill() {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::InvalidInput => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    /// Wait for the child to exit and collect the drain thread.
    ///
    /// Our end of standard output is closed first, so a child still writing
    /// frames fails its next write and exits. Calling this again returns the
    /// recorded result.
    pub fn shutdown(&mut self) -> Result<TranscoderExit, CutScoreError> {
        if let Some(exit) = &self.exit {
            return Ok(exit.clone());
        }

        drop(self.stdout.take());
        let status = self.child.wait()?;
        let diagnostics = match self.drain.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                log::warn!("Transcoder diagnostic drain thread panicked");
                DiagnosticReport::default()
            }),
            None => DiagnosticReport::default(),
        };
        log::debug!(
            "Transcoder {} exited with {status} ({} diagnostic byte(s))",
            self.child.id(),
            diagnostics.bytes
        );

        let exit = TranscoderExit {
            status,
            diagnostics,
        };
        self.exit = Some(exit.clone());
        Ok(exit)
    }

    /// The recorded exit, once [`shutdown`](Self::shutdown) has succeeded.
    pub fn exit(&self) -> Option<&TranscoderExit> {
        self.exit.as_ref()
    }
}

impl Drop for TranscoderProcess {
    fn drop(&mut self) {
        if self.exit.is_some() {
            return;
        }
        if let Err(error) = self.kill() {
            log::warn!("Failed to kill transcoder {}: {error}", self.child.id());
        }
        if let Err(error) = self.shutdown() {
            log::warn!("Failed to reap transcoder {}: {error}", self.child.id());
        }
    }
}

fn spawn_drain(mut stream: ChildStderr) -> std::io::Result<JoinHandle<DiagnosticReport>> {
    thread::Builder::new()
        .name("transcoder-stderr".to_string())
        .spawn(move || drain(&mut stream))
}

/// Read `stream` to its end in fixed-size chunks, keeping only a short tail.
///
/// Read failures end the drain; they are logged and never reach the frame
/// pipeline.
fn drain<R: Read>(stream: &mut R) -> DiagnosticReport {
    let mut chunk = [0u8; DRAIN_CHUNK_SIZE];
    let mut bytes = 0u64;
    let mut tail: Vec<u8> = Vec::with_capacity(DIAGNOSTIC_TAIL_LIMIT + DRAIN_CHUNK_SIZE);

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => {
                bytes += read as u64;
                tail.extend_from_slice(&chunk[..read]);
                if tail.len() > DIAGNOSTIC_TAIL_LIMIT {
                    let excess = tail.len() - DIAGNOSTIC_TAIL_LIMIT;
                    tail.drain(..excess);
                }
            }
            Err(error) if error.kind() == ErrorKind::Interrupted => continue,
            Err(error) => {
                log::warn!("Stopped draining transcoder diagnostics: {error}");
                break;
            }
        }
    }

    DiagnosticReport {
        bytes,
        tail: String::from_utf8_lossy(&tail).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Error, ErrorKind, Read};

    use super::{DIAGNOSTIC_TAIL_LIMIT, drain};

    #[test]
    fn drain_keeps_only_the_tail() {
        let mut data = vec![b'a'; 10_000];
        data.extend_from_slice(b"last line\n");
        let report = drain(&mut data.as_slice());

        assert_eq!(report.bytes, 10_010);
        assert_eq!(report.tail.len(), DIAGNOSTIC_TAIL_LIMIT);
        assert!(report.tail.ends_with("last line\n"));
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(Error::new(ErrorKind::BrokenPipe, "gone"))
        }
    }

    #[test]
    fn drain_stops_quietly_on_read_error() {
        let report = drain(&mut FailingReader);
        assert_eq!(report.bytes, 0);
        assert!(report.tail.is_empty());
    }
}
