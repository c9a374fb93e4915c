//! Cut score computation and record sink tests.

use cutscore::{
    AnalysisPlugin, CSV_HEADER, CsvSink, CutScoreError, CutScorePlugin, INCOMPARABLE_SCORE,
    RecordSink, ScoreRecord, VideoFrame, ppm, sad_score,
};

fn filled(width: u32, height: u32, value: u8) -> VideoFrame {
    VideoFrame::from_raw(width, height, vec![value; (width * height * 3) as usize]).unwrap()
}

fn encode(frames: &[VideoFrame]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for frame in frames {
        ppm::write_frame(&mut bytes, frame).unwrap();
    }
    bytes
}

// ── sad_score ──────────────────────────────────────────────────────

#[test]
fn identical_frames_score_zero() {
    let mut frame = VideoFrame::new(8, 4);
    frame.set(3, 2, 255, 1, 99).unwrap();
    assert_eq!(sad_score(&frame, &frame.clone()), Some(0));
}

#[test]
fn score_is_symmetric() {
    let mut a = VideoFrame::new(3, 3);
    let mut b = VideoFrame::new(3, 3);
    a.set(0, 0, 200, 10, 0).unwrap();
    b.set(0, 0, 50, 30, 0).unwrap();
    b.set(2, 2, 1, 1, 1).unwrap();

    assert_eq!(sad_score(&a, &b), sad_score(&b, &a));
    assert_eq!(sad_score(&a, &b), Some(150 + 20 + 3));
}

#[test]
fn score_sums_every_channel_of_every_pixel() {
    let black = filled(10, 10, 0);
    let white = filled(10, 10, 255);
    assert_eq!(sad_score(&black, &white), Some(10 * 10 * 3 * 255));
}

#[test]
fn large_frame_does_not_overflow() {
    let black = filled(1920, 1080, 0);
    let white = filled(1920, 1080, 255);
    assert_eq!(sad_score(&black, &white), Some(1920 * 1080 * 3 * 255));
}

#[test]
fn different_dimensions_are_incomparable() {
    assert_eq!(sad_score(&VideoFrame::new(2, 2), &VideoFrame::new(2, 3)), None);
    assert_eq!(sad_score(&VideoFrame::new(2, 2), &VideoFrame::new(3, 2)), None);
}

// ── CutScorePlugin ─────────────────────────────────────────────────

#[test]
fn first_frame_scores_the_sentinel_then_differences() {
    let mut second = VideoFrame::new(2, 1);
    second.set(1, 0, 10, 10, 10).unwrap();
    let bytes = encode(&[VideoFrame::new(2, 1), second]);

    let mut plugin = CutScorePlugin::new(Vec::<ScoreRecord>::new());
    let frames = cutscore::run(bytes.as_slice(), &mut plugin).unwrap();
    assert_eq!(frames, 2);

    let records = plugin.into_sink();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].frame_index, 0);
    assert_eq!(records[0].score, INCOMPARABLE_SCORE);
    assert!(records[0].is_incomparable());
    assert_eq!(records[1].frame_index, 1);
    assert_eq!(records[1].score, 30);
    assert!(!records[1].is_incomparable());
}

#[test]
fn each_frame_is_compared_with_its_direct_predecessor() {
    let bytes = encode(&[filled(1, 1, 0), filled(1, 1, 10), filled(1, 1, 10), filled(1, 1, 0)]);

    let mut plugin = CutScorePlugin::new(Vec::<ScoreRecord>::new());
    cutscore::run(bytes.as_slice(), &mut plugin).unwrap();

    let scores: Vec<u64> = plugin.sink().iter().map(|r| r.score).collect();
    assert_eq!(scores, vec![INCOMPARABLE_SCORE, 30, 0, 30]);
}

#[test]
fn dimension_change_fails_the_run() {
    let bytes = encode(&[VideoFrame::new(2, 2), VideoFrame::new(4, 1)]);

    let mut plugin = CutScorePlugin::new(Vec::<ScoreRecord>::new());
    let result = cutscore::run(bytes.as_slice(), &mut plugin);
    match result {
        Err(CutScoreError::DimensionMismatch {
            frame_index,
            expected,
            actual,
        }) => {
            assert_eq!(frame_index, 1);
            assert_eq!(expected, (2, 2));
            assert_eq!(actual, (4, 1));
        }
        other => panic!("Expected DimensionMismatch, got: {other:?}"),
    }
    // The record for the first frame was already emitted.
    assert_eq!(plugin.sink().len(), 1);
}

#[test]
fn score_frame_replaces_previous_even_on_mismatch() {
    let mut plugin = CutScorePlugin::new(Vec::<ScoreRecord>::new());
    plugin.score_frame(0, VideoFrame::new(2, 2)).unwrap();
    assert!(plugin.score_frame(1, VideoFrame::new(3, 3)).is_err());

    let record = plugin.score_frame(2, VideoFrame::new(3, 3)).unwrap();
    assert_eq!(record.score, 0);
}

#[test]
fn start_resets_the_previous_frame() {
    let mut plugin = CutScorePlugin::new(Vec::<ScoreRecord>::new());
    plugin.start().unwrap();
    plugin.frame(0, filled(1, 1, 0)).unwrap();
    plugin.end().unwrap();

    plugin.start().unwrap();
    plugin.frame(0, filled(1, 1, 255)).unwrap();
    plugin.end().unwrap();

    let records = plugin.into_sink();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(ScoreRecord::is_incomparable));
}

// ── CsvSink ────────────────────────────────────────────────────────

#[test]
fn csv_output_has_header_and_one_line_per_frame() {
    let bytes = encode(&[filled(2, 1, 0), filled(2, 1, 5)]);

    let mut plugin = CutScorePlugin::new(CsvSink::new(Vec::new()));
    cutscore::run(bytes.as_slice(), &mut plugin).unwrap();

    let csv = String::from_utf8(plugin.into_sink().into_inner()).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], CSV_HEADER);
    assert_eq!(lines[0], "frame,score,processingTime");

    let first: Vec<&str> = lines[1].split(',').collect();
    assert_eq!(first[0], "0");
    assert_eq!(first[1], u64::MAX.to_string());
    assert!(first[2].parse::<u64>().is_ok());

    let second: Vec<&str> = lines[2].split(',').collect();
    assert_eq!(second[0], "1");
    assert_eq!(second[1], "30");
}

#[test]
fn csv_for_empty_stream_is_header_only() {
    let mut plugin = CutScorePlugin::new(CsvSink::new(Vec::new()));
    cutscore::run(&b""[..], &mut plugin).unwrap();

    let csv = String::from_utf8(plugin.into_sink().into_inner()).unwrap();
    assert_eq!(csv, format!("{CSV_HEADER}\n"));
}

#[test]
fn csv_sink_creates_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scores.csv");

    let mut sink = CsvSink::create(&path).unwrap();
    sink.begin().unwrap();
    sink.record(&ScoreRecord {
        frame_index: 7,
        score: 42,
        processing_time_ms: 1,
    })
    .unwrap();
    sink.finish().unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents, "frame,score,processingTime\n7,42,1\n");
}

#[test]
fn sink_by_mutable_reference() {
    let mut records: Vec<ScoreRecord> = Vec::new();
    {
        let mut plugin = CutScorePlugin::new(&mut records);
        cutscore::run(encode(&[filled(1, 1, 1)]).as_slice(), &mut plugin).unwrap();
    }
    assert_eq!(records.len(), 1);
}
