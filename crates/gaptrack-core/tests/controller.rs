//! Tests for the tracking session controller
//!
//! All tests run on paused tokio time, so timer cadences and fetch timeouts
//! elapse instantly.

use async_trait::async_trait;
use gaptrack_core::config::TrackingConfig;
use gaptrack_core::controller::{StartRequest, StopCause, TrackingController, TrackingPhase};
use gaptrack_core::error::{SourceError, TrackingError};
use gaptrack_core::recording::{recording_path, Recording};
use gaptrack_core::session::{Roster, SessionMode};
use gaptrack_core::source::{DemoSource, Pull, SampleSource, SourceSession};
use gaptrack_core::types::{DriverId, DriverSample, EventKind, SampleBatch};
use pretty_assertions::assert_eq;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// One scripted response to a pull
enum Step {
    Samples(Vec<DriverSample>),
    Fail(SourceError),
    /// Never answers, so the fetch timeout fires
    Hang,
    End,
}

/// Source that plays back a fixed script, then stays idle
struct ScriptedSource {
    mode: SessionMode,
    roster: Roster,
    script: VecDeque<Step>,
    connect_error: Option<fn() -> TrackingError>,
}

impl ScriptedSource {
    fn new(script: Vec<Step>) -> Self {
        Self {
            mode: SessionMode::Live,
            roster: Roster::from_numbers([DriverId(1), DriverId(16), DriverId(55)]),
            script: script.into(),
            connect_error: None,
        }
    }
}

#[async_trait]
impl SampleSource for ScriptedSource {
    fn mode(&self) -> SessionMode {
        self.mode
    }

    async fn connect(&mut self) -> Result<SourceSession, TrackingError> {
        if let Some(error) = self.connect_error {
            return Err(error());
        }
        Ok(SourceSession {
            session_id: "scripted".to_string(),
            roster: self.roster.clone(),
            info: None,
        })
    }

    async fn pull(&mut self, _since: Option<Duration>) -> Result<Pull, SourceError> {
        match self.script.pop_front() {
            Some(Step::Samples(samples)) => Ok(Pull {
                batches: vec![SampleBatch::new(samples)],
                session_active: true,
            }),
            Some(Step::Fail(e)) => Err(e),
            Some(Step::Hang) => std::future::pending().await,
            Some(Step::End) => Ok(Pull::ended()),
            None => Ok(Pull::idle()),
        }
    }
}

fn both(secs: u64, a: f64, b: f64) -> Step {
    let t = Duration::from_secs(secs);
    Step::Samples(vec![
        DriverSample::new(DriverId(1), t, a),
        DriverSample::new(DriverId(16), t, b),
    ])
}

fn request(source: ScriptedSource) -> StartRequest {
    StartRequest::new(DriverId(1), DriverId(16), Box::new(source))
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent() {
    let mut controller = TrackingController::new();
    controller.stop().await;
    assert_eq!(controller.phase(), TrackingPhase::Idle);

    controller
        .start(request(ScriptedSource::new(vec![both(4, 0.0, 1.5)])))
        .await
        .unwrap();
    controller.stop().await;
    let first = controller.snapshot();
    controller.stop().await;

    assert_eq!(first.phase, TrackingPhase::Stopped);
    assert_eq!(first.stop_cause, Some(StopCause::Requested));
    assert_eq!(controller.snapshot(), first);
    assert!(!controller.pause());
}

#[tokio::test(start_paused = true)]
async fn test_three_timeouts_stop_tracking() {
    let mut controller = TrackingController::new();
    controller
        .start(request(ScriptedSource::new(vec![Step::Hang, Step::Hang, Step::Hang])))
        .await
        .unwrap();
    controller.wait().await;

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.phase, TrackingPhase::Stopped);
    let timeout = SourceError::Timeout(TrackingConfig::default().fetch_timeout());
    assert_eq!(
        snapshot.stop_cause,
        Some(StopCause::ConsecutiveFailures {
            count: 3,
            last_error: timeout.clone(),
        })
    );
    assert_eq!(snapshot.fetch.last_error, Some(timeout));
    assert!(snapshot.fetch.last_fetch_failed);
}

#[tokio::test(start_paused = true)]
async fn test_two_timeouts_then_success_keeps_tracking() {
    let mut controller = TrackingController::new();
    let mut updates = controller.subscribe();
    controller
        .start(request(ScriptedSource::new(vec![
            Step::Hang,
            Step::Hang,
            both(30, 0.0, 2.0),
        ])))
        .await
        .unwrap();
    assert_eq!(controller.phase(), TrackingPhase::Connecting);

    let tracking = updates
        .wait_for(|s| s.fetch.pulls >= 3)
        .await
        .unwrap()
        .clone();
    assert_eq!(tracking.phase, TrackingPhase::Tracking);
    assert_eq!(tracking.fetch.consecutive_failures, 0);
    assert!(!tracking.fetch.last_fetch_failed);
    assert!(matches!(tracking.fetch.last_error, Some(SourceError::Timeout(_))));
    assert_eq!(tracking.latest_point().map(|p| p.gap_seconds), Some(-2.0));

    controller.stop().await;
    assert_eq!(controller.snapshot().stop_cause, Some(StopCause::Requested));
}

#[tokio::test(start_paused = true)]
async fn test_transient_errors_reset_after_success() {
    let mut controller = TrackingController::new();
    let mut updates = controller.subscribe();
    let error = SourceError::Status {
        endpoint: "intervals".to_string(),
        status: 503,
    };
    controller
        .start(request(ScriptedSource::new(vec![
            both(4, 0.0, 2.0),
            Step::Fail(error.clone()),
            Step::Fail(error.clone()),
            both(16, 0.0, 2.1),
            Step::Fail(error.clone()),
            Step::Fail(error.clone()),
            both(28, 0.0, 2.2),
            Step::End,
        ])))
        .await
        .unwrap();
    controller.wait().await;

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.stop_cause, Some(StopCause::SessionEnded));
    assert_eq!(snapshot.points.len(), 3);
    assert_eq!(snapshot.fetch.pulls, 8);
    assert_eq!(snapshot.fetch.last_error, Some(error));
    assert!(updates.has_changed().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_same_driver_rejected_before_any_transition() {
    let mut controller = TrackingController::new();
    let result = controller
        .start(StartRequest::new(
            DriverId(16),
            DriverId(16),
            Box::new(ScriptedSource::new(vec![])),
        ))
        .await;
    assert!(matches!(result, Err(TrackingError::InvalidDriverPair(_))));
    assert_eq!(controller.snapshot().phase, TrackingPhase::Idle);

    // A running session is left alone
    controller
        .start(request(ScriptedSource::new(vec![both(4, 0.0, 1.0)])))
        .await
        .unwrap();
    let result = controller
        .start(StartRequest::new(
            DriverId(1),
            DriverId(1),
            Box::new(ScriptedSource::new(vec![])),
        ))
        .await;
    assert!(result.is_err());
    assert!(controller.phase().is_active());
    controller.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_unknown_driver_leaves_running_session_alone() {
    let script: Vec<Step> = (1..=5).map(|i| both(i * 4, 0.0, 1.0 + 0.1 * i as f64)).collect();
    let mut controller = TrackingController::new();
    let mut updates = controller.subscribe();
    controller
        .start(request(ScriptedSource::new(script)))
        .await
        .unwrap();
    let before = updates
        .wait_for(|s| s.points.len() == 5)
        .await
        .unwrap()
        .clone();

    let result = controller
        .start(StartRequest::new(
            DriverId(1),
            DriverId(99),
            Box::new(ScriptedSource::new(vec![])),
        ))
        .await;
    assert!(matches!(result, Err(TrackingError::InvalidDriverPair(_))));

    let after = controller.snapshot();
    assert!(controller.is_running());
    assert_eq!(after.phase, TrackingPhase::Tracking);
    assert_eq!(after.session_id, "scripted");
    assert_eq!(after.points, before.points);
    assert_eq!(after.stop_cause, None);
    assert!(after.start_error.unwrap().contains("#99"));

    controller.stop().await;
    let stopped = controller.snapshot();
    assert_eq!(stopped.stop_cause, Some(StopCause::Requested));
    assert_eq!(stopped.points.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_driver_is_rejected() {
    let mut controller = TrackingController::new();
    let result = controller
        .start(StartRequest::new(
            DriverId(1),
            DriverId(99),
            Box::new(ScriptedSource::new(vec![])),
        ))
        .await;

    assert!(matches!(result, Err(TrackingError::InvalidDriverPair(_))));
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.phase, TrackingPhase::Idle);
    assert!(snapshot.start_error.unwrap().contains("#99"));
}

#[tokio::test(start_paused = true)]
async fn test_no_active_session_stops() {
    let mut source = ScriptedSource::new(vec![]);
    source.connect_error = Some(|| TrackingError::NoActiveSession);

    let mut controller = TrackingController::new();
    let result = controller.start(request(source)).await;
    assert!(matches!(result, Err(TrackingError::NoActiveSession)));

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.phase, TrackingPhase::Stopped);
    assert_eq!(snapshot.stop_cause, Some(StopCause::NoActiveSession));
}

#[tokio::test(start_paused = true)]
async fn test_pause_and_resume() {
    let mut script: Vec<Step> = (1..=30).map(|i| both(i * 4, 0.0, 3.0)).collect();
    script.push(Step::End);

    let mut controller = TrackingController::new();
    let mut updates = controller.subscribe();
    controller
        .start(request(ScriptedSource::new(script)))
        .await
        .unwrap();
    updates
        .wait_for(|s| s.phase == TrackingPhase::Tracking)
        .await
        .unwrap();

    assert!(controller.pause());
    let paused = updates
        .wait_for(|s| s.phase == TrackingPhase::Paused)
        .await
        .unwrap()
        .clone();

    // No pulls while paused
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(controller.snapshot().fetch.pulls, paused.fetch.pulls);

    assert!(controller.resume());
    controller.wait().await;
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.stop_cause, Some(StopCause::SessionEnded));
    assert_eq!(snapshot.points.len(), 30);
}

#[tokio::test(start_paused = true)]
async fn test_snapshots_share_history() {
    let mut script: Vec<Step> = (1..=6).map(|i| both(i * 4, 0.0, 2.0)).collect();
    script.push(Step::End);

    let mut controller = TrackingController::new();
    let mut updates = controller.subscribe();
    controller
        .start(request(ScriptedSource::new(script)))
        .await
        .unwrap();
    let early = updates
        .wait_for(|s| s.points.len() == 2)
        .await
        .unwrap()
        .clone();
    controller.wait().await;

    // A held snapshot keeps its own view while the loop moves on
    assert_eq!(early.points.len(), 2);
    let first = controller.snapshot();
    let second = controller.snapshot();
    assert_eq!(first.points.len(), 6);
    assert!(Arc::ptr_eq(&first.points, &second.points));
    assert!(Arc::ptr_eq(&first.events, &second.events));
}

#[tokio::test(start_paused = true)]
async fn test_new_session_replaces_running_one() {
    let mut controller = TrackingController::new();
    controller
        .start(request(ScriptedSource::new(vec![both(4, 0.0, 1.0)])))
        .await
        .unwrap();

    let mut second = ScriptedSource::new(vec![both(4, 0.0, 5.0), Step::End]);
    second.roster = Roster::default();
    controller
        .start(StartRequest::new(DriverId(1), DriverId(55), Box::new(second)))
        .await
        .unwrap();
    controller.wait().await;

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.stop_cause, Some(StopCause::SessionEnded));
    assert_eq!(snapshot.pair.map(|p| p.b()), Some(DriverId(55)));
    assert!(snapshot.points.is_empty(), "#55 never reported");
}

#[tokio::test(start_paused = true)]
async fn test_recorded_demo_replays_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = recording_path(dir.path(), "demo");
    let source = DemoSource::new(11).with_duration(Duration::from_secs(15 * 60));

    let mut controller = TrackingController::new();
    controller
        .start(StartRequest::new(DriverId(1), DriverId(16), Box::new(source)).record_to(&path))
        .await
        .unwrap();
    controller.wait().await;
    let live = controller.snapshot();
    assert_eq!(live.stop_cause, Some(StopCause::SessionEnded));
    assert!(live
        .events
        .iter()
        .any(|e| e.kind == EventKind::PitStop && e.driver == Some(DriverId(16))));

    let recording = Recording::load(&path).unwrap();
    assert!(recording.is_complete());
    assert_eq!(recording.points, *live.points);
    assert_eq!(recording.events, *live.events);

    let replay = recording.into_replay(50.0);
    controller
        .start(StartRequest::new(DriverId(1), DriverId(16), Box::new(replay)))
        .await
        .unwrap();
    assert_eq!(controller.phase(), TrackingPhase::Tracking);
    controller.wait().await;

    let replayed = controller.snapshot();
    assert_eq!(replayed.mode, Some(SessionMode::Recorded));
    assert_eq!(replayed.stop_cause, Some(StopCause::ReplayFinished));
    assert_eq!(replayed.points, live.points);
    assert_eq!(replayed.events, live.events);
}
