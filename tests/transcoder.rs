//! Transcoder process tests against a scripted stand-in for FFmpeg.
//!
//! The stand-in is a shell script that writes 256 KiB to stderr before any
//! frame, then echoes its arguments to stderr and copies the input file to
//! stdout. A sibling `<input>.exit` file sets its exit code and a sibling
//! `<input>.loop` file makes it repeat the input forever.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{OnceLock, mpsc};
use std::thread;
use std::time::Duration;

use cutscore::{
    CutScoreError, CutScorePlugin, ScoreRecord, Transcoder, VideoAnalyzer, VideoFrame, ppm,
};
use tempfile::TempDir;

const FAKE_FFMPEG: &str = r#"#!/bin/sh
input=""
prev=""
for arg in "$@"; do
    if [ "$prev" = "-i" ]; then input="$arg"; fi
    prev="$arg"
done
head -c 262144 /dev/zero | tr '\0' 'n' >&2
echo "args: $*" >&2
if [ -f "$input.loop" ]; then
    while :; do cat "$input" || exit 1; done
fi
cat "$input"
if [ -f "$input.exit" ]; then exit "$(cat "$input.exit")"; fi
exit 0
"#;

fn fake_ffmpeg() -> &'static Path {
    static SCRIPT: OnceLock<(TempDir, PathBuf)> = OnceLock::new();
    let (_, path) = SCRIPT.get_or_init(|| {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake-ffmpeg");
        fs::write(&path, FAKE_FFMPEG).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        (dir, path)
    });
    path
}

fn write_clip(dir: &Path, frames: &[VideoFrame]) -> PathBuf {
    let mut bytes = Vec::new();
    for frame in frames {
        ppm::write_frame(&mut bytes, frame).unwrap();
    }
    let path = dir.join("clip.ppm");
    fs::write(&path, bytes).unwrap();
    path
}

fn shaded(value: u8) -> VideoFrame {
    VideoFrame::from_raw(4, 4, vec![value; 4 * 4 * 3]).unwrap()
}

/// Run `f` on another thread and fail if it does not finish in time.
fn within_deadline<T, F>(f: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let _ = sender.send(f());
    });
    receiver
        .recv_timeout(Duration::from_secs(30))
        .expect("transcoder run did not finish; pipes may be deadlocked")
}

// ── Command line ───────────────────────────────────────────────────

#[test]
fn command_args_without_limit() {
    let args = Transcoder::new("ffmpeg").command_args(Path::new("in.mp4"));
    assert_eq!(
        args,
        ["-i", "in.mp4", "-f", "image2pipe", "-vcodec", "ppm", "-"]
    );
}

#[test]
fn command_args_with_limit() {
    let args = Transcoder::new("ffmpeg")
        .time_limit(7)
        .command_args(Path::new("in.mp4"));
    assert_eq!(
        args,
        ["-t", "7", "-i", "in.mp4", "-f", "image2pipe", "-vcodec", "ppm", "-"]
    );
}

#[test]
fn missing_executable_is_a_spawn_error() {
    // Make sure the shared script exists before any fork in this binary.
    fake_ffmpeg();

    let result = Transcoder::new("/nonexistent/cutscore-ffmpeg").launch("in.mp4");
    match result {
        Err(CutScoreError::ProcessSpawn { path, reason }) => {
            assert_eq!(path, Path::new("/nonexistent/cutscore-ffmpeg"));
            assert!(!reason.is_empty());
        }
        Err(other) => panic!("Expected ProcessSpawn, got: {other:?}"),
        Ok(_) => panic!("Expected ProcessSpawn, got a running process"),
    }
}

// ── Analysis through a child process ───────────────────────────────

#[test]
fn analyze_scores_frames_while_stderr_is_busy() {
    let dir = tempfile::tempdir().unwrap();
    let clip = write_clip(dir.path(), &[shaded(0), shaded(1), shaded(3)]);
    let executable = fake_ffmpeg().to_path_buf();

    let (summary, records) = within_deadline(move || {
        let mut plugin = CutScorePlugin::new(Vec::<ScoreRecord>::new());
        let summary = VideoAnalyzer::new(executable)
            .with_time_limit(2)
            .analyze(&clip, &mut plugin)
            .unwrap();
        (summary, plugin.into_sink())
    });

    assert_eq!(summary.frames, 3);
    assert!(summary.transcoder_exit.success());

    let scores: Vec<u64> = records.iter().map(|r| r.score).collect();
    assert_eq!(scores, vec![u64::MAX, 48, 96]);

    let diagnostics = &summary.transcoder_exit.diagnostics;
    assert!(diagnostics.bytes >= 262_144);
    assert!(diagnostics.tail.len() <= 4096);
    assert!(diagnostics.tail.contains("-t 2 -i "));
    assert!(diagnostics.tail.contains("-f image2pipe -vcodec ppm -"));
}

#[test]
fn nonzero_exit_after_clean_stream_is_reported_not_raised() {
    let dir = tempfile::tempdir().unwrap();
    let clip = write_clip(dir.path(), &[shaded(0), shaded(0)]);
    fs::write(dir.path().join("clip.ppm.exit"), "3").unwrap();
    let executable = fake_ffmpeg().to_path_buf();

    let summary = within_deadline(move || {
        let mut plugin = CutScorePlugin::new(Vec::<ScoreRecord>::new());
        VideoAnalyzer::new(executable)
            .analyze(&clip, &mut plugin)
            .unwrap()
    });

    assert_eq!(summary.frames, 2);
    assert!(!summary.transcoder_exit.success());
    assert_eq!(summary.transcoder_exit.status.code(), Some(3));
}

#[test]
fn malformed_stream_fails_the_analysis() {
    let dir = tempfile::tempdir().unwrap();
    let clip = dir.path().join("clip.ppm");
    fs::write(&clip, b"P6 0 4 255\n").unwrap();
    let executable = fake_ffmpeg().to_path_buf();

    let result = within_deadline(move || {
        let mut plugin = CutScorePlugin::new(Vec::<ScoreRecord>::new());
        VideoAnalyzer::new(executable).analyze(&clip, &mut plugin)
    });

    assert!(matches!(
        result,
        Err(CutScoreError::MalformedHeader { frame_index: 0, .. })
    ));
}

#[test]
fn empty_output_is_zero_frames() {
    let dir = tempfile::tempdir().unwrap();
    let clip = write_clip(dir.path(), &[]);
    let executable = fake_ffmpeg().to_path_buf();

    let summary = within_deadline(move || {
        let mut plugin = CutScorePlugin::new(Vec::<ScoreRecord>::new());
        let summary = VideoAnalyzer::new(executable)
            .analyze(&clip, &mut plugin)
            .unwrap();
        assert!(plugin.sink().is_empty());
        summary
    });

    assert_eq!(summary.frames, 0);
    assert!(summary.transcoder_exit.success());
}

// ── Frame streams ──────────────────────────────────────────────────

#[test]
fn frame_stream_yields_frames_then_reaps() {
    let dir = tempfile::tempdir().unwrap();
    let frames = vec![shaded(10), shaded(20)];
    let clip = write_clip(dir.path(), &frames);
    let executable = fake_ffmpeg().to_path_buf();

    let (decoded, exit_ok, count) = within_deadline(move || {
        let mut stream = VideoAnalyzer::new(executable).frames(&clip).unwrap();
        assert!(stream.transcoder_exit().is_none());

        let decoded: Vec<VideoFrame> = stream.by_ref().collect::<Result<_, _>>().unwrap();
        assert!(stream.next().is_none());

        let exit_ok = stream.transcoder_exit().map(|exit| exit.success());
        (decoded, exit_ok, stream.frames_decoded())
    });

    assert_eq!(decoded, frames);
    assert_eq!(exit_ok, Some(true));
    assert_eq!(count, 2);
}

#[test]
fn dropping_an_unfinished_stream_stops_the_transcoder() {
    let dir = tempfile::tempdir().unwrap();
    let clip = write_clip(dir.path(), &[shaded(5)]);
    fs::write(dir.path().join("clip.ppm.loop"), "").unwrap();
    let executable = fake_ffmpeg().to_path_buf();

    let taken = within_deadline(move || {
        let stream = VideoAnalyzer::new(executable).frames(&clip).unwrap();
        stream.take(3).filter(Result::is_ok).count()
    });

    assert_eq!(taken, 3);
}

// ── Process handle ─────────────────────────────────────────────────

#[test]
fn process_handle_shutdown_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let clip = write_clip(dir.path(), &[shaded(1)]);
    let executable = fake_ffmpeg().to_path_buf();

    within_deadline(move || {
        let mut process = Transcoder::new(executable).launch(&clip).unwrap();
        let stdout = process.take_stdout().unwrap();
        assert!(matches!(
            process.take_stdout(),
            Err(CutScoreError::StreamUnavailable)
        ));

        let frames = cutscore::FrameDecoder::new(stdout).count();
        assert_eq!(frames, 1);

        let first = process.shutdown().unwrap();
        let second = process.shutdown().unwrap();
        assert_eq!(first.status, second.status);
        assert_eq!(first.diagnostics.bytes, second.diagnostics.bytes);
        assert!(process.exit().is_some());

        // Killing an already reaped process is not an error.
        process.kill().unwrap();
    });
}
