//! Tests for session recording and loading

use gaptrack_core::config::TrackingConfig;
use gaptrack_core::error::RecordingError;
use gaptrack_core::pipeline::TrackingPipeline;
use gaptrack_core::recording::{list_recordings, recording_path, Recording, RecordingHeader, SessionRecorder};
use gaptrack_core::session::{DriverEntry, Roster, SessionMode};
use gaptrack_core::types::{DriverId, DriverPair, DriverSample, SampleBatch};
use pretty_assertions::assert_eq;
use std::fs;
use std::time::Duration;

fn pair() -> DriverPair {
    DriverPair::new(DriverId(1), DriverId(11)).unwrap()
}

/// A short session with a pit stop by #11 and slightly irregular timing
fn batches() -> Vec<SampleBatch> {
    let mut batches = Vec::new();
    for tick in 1..=20u64 {
        let t = Duration::from_millis(tick * 4_000 + tick * 37 % 300);
        let mut samples = vec![DriverSample::new(DriverId(1), t, 0.0)];
        let b_gap = 3.1 + 0.013 * tick as f64;
        match tick {
            9..=12 => {}
            13.. => samples.push(DriverSample::new(DriverId(11), t, b_gap + 20.7)),
            _ => samples.push(DriverSample::new(DriverId(11), t, b_gap)),
        }
        batches.push(SampleBatch::new(samples));
    }
    batches
}

fn record(path: &std::path::Path, finish: bool) -> (Vec<gaptrack_core::types::IntervalPoint>, Vec<gaptrack_core::types::Event>) {
    let config = TrackingConfig::default();
    let roster = Roster::new(vec![
        DriverEntry {
            number: DriverId(1),
            acronym: "VER".to_string(),
            full_name: Some("Max Verstappen".to_string()),
            team_name: None,
        },
        DriverEntry {
            number: DriverId(11),
            acronym: "PER".to_string(),
            full_name: None,
            team_name: None,
        },
    ]);
    let header = RecordingHeader::new("9472", SessionMode::Historical, pair()).with_roster(roster);
    let mut recorder = SessionRecorder::create(path, &header).unwrap();
    let mut pipeline = TrackingPipeline::new(pair(), &config);

    let mut points = Vec::new();
    let mut events = Vec::new();
    for batch in batches() {
        recorder.record_batch(&batch).unwrap();
        let output = pipeline.process(&batch);
        if let Some(point) = output.point {
            recorder.record_point(&point).unwrap();
            points.push(point);
        }
        for event in output.events {
            recorder.record_event(&event).unwrap();
            events.push(event);
        }
    }
    for event in pipeline.finish() {
        recorder.record_event(&event).unwrap();
        events.push(event);
    }
    if finish {
        recorder.finish().unwrap();
    }
    (points, events)
}

#[test]
fn test_record_then_replay_matches_recorded_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = recording_path(dir.path(), "mexico");
    let (points, events) = record(&path, true);

    let recording = Recording::load(&path).unwrap();
    assert!(recording.is_complete());
    assert_eq!(recording.header.session_id, "9472");
    assert_eq!(recording.header.roster.resolve("per"), Some(DriverId(11)));
    assert_eq!(recording.points, points);
    assert_eq!(recording.events, events);
    assert_eq!(recording.batches, batches());
    assert_eq!(
        recording.duration(),
        points[points.len() - 1].timestamp - points[0].timestamp
    );

    let (replayed_points, replayed_events) = recording.reprocess(&TrackingConfig::default());
    assert_eq!(replayed_points, points);
    assert_eq!(replayed_events, events);
    assert!(events.iter().any(|e| e.driver == Some(DriverId(11))));
}

#[test]
fn test_crash_mid_write_keeps_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crash.jsonl");
    let (points, _) = record(&path, false);

    // Simulate a write cut short
    let mut text = fs::read_to_string(&path).unwrap();
    text.push_str(r#"{"type":"point","timestamp":{"se"#);
    fs::write(&path, text).unwrap();

    let recording = Recording::load(&path).unwrap();
    assert!(!recording.is_complete());
    assert_eq!(recording.points, points);
}

#[test]
fn test_corrupt_record_reports_index_and_salvages() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corrupt.jsonl");
    record(&path, true);

    let text = fs::read_to_string(&path).unwrap();
    let mut lines: Vec<&str> = text.lines().collect();
    lines[5] = "{\"type\":\"batch\",\"samples\":[{\"driver\":";
    fs::write(&path, lines.join("\n") + "\n").unwrap();

    match Recording::load(&path) {
        Err(RecordingError::Corrupt { index, salvageable, .. }) => {
            assert_eq!(index, 5);
            assert_eq!(salvageable, 5);
        }
        other => panic!("expected corrupt recording, got {other:?}"),
    }

    let salvaged = Recording::load_salvaged(&path).unwrap();
    assert!(!salvaged.is_complete());
    let kept = salvaged.batches.len() + salvaged.points.len() + salvaged.events.len();
    assert_eq!(kept, 4);
}

#[test]
fn test_recordings_are_listed() {
    let dir = tempfile::tempdir().unwrap();
    record(&recording_path(dir.path(), "b_race"), true);
    record(&recording_path(dir.path(), "a_sprint"), true);

    assert_eq!(list_recordings(dir.path()).unwrap(), vec!["a_sprint", "b_race"]);
}
