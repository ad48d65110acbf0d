//! Tracking session controller
//!
//! Owns the timer-driven loop that pulls samples from a [`SampleSource`],
//! runs them through the [`TrackingPipeline`] and appends the results to
//! the session (and its recording). The loop task is the only writer;
//! readers get [`TrackingSnapshot`]s through a watch channel. Snapshots
//! share the point and event history, so taking one never copies it while
//! the channel is locked.
//!
//! ```text
//! Idle -> Connecting -> Tracking <-> Paused
//!             |            |
//!             +-> Stopped <+
//! ```

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::TrackingConfig;
use crate::error::{RecordingError, SourceError, TrackingError};
use crate::pipeline::TrackingPipeline;
use crate::recording::{RecordingHeader, SessionRecorder};
use crate::session::{trend_of, Roster, Session, SessionMode, Trend};
use crate::source::SampleSource;
use crate::types::{DriverId, DriverPair, Event, IntervalPoint, SampleBatch};

/// Controller lifecycle phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrackingPhase {
    #[default]
    Idle,
    Connecting,
    Tracking,
    Paused,
    Stopped,
}

impl TrackingPhase {
    /// Whether a session loop is alive in this phase
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TrackingPhase::Connecting | TrackingPhase::Tracking | TrackingPhase::Paused
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            TrackingPhase::Idle => "idle",
            TrackingPhase::Connecting => "connecting",
            TrackingPhase::Tracking => "tracking",
            TrackingPhase::Paused => "paused",
            TrackingPhase::Stopped => "stopped",
        }
    }
}

/// Why a session stopped
#[derive(Debug, Clone, PartialEq)]
pub enum StopCause {
    /// `stop()` was called, or a new session replaced this one
    Requested,
    /// The live or historical session has no more data
    SessionEnded,
    /// All recorded batches were replayed
    ReplayFinished,
    /// Too many pulls failed in a row
    ConsecutiveFailures { count: u32, last_error: SourceError },
    /// Nothing was running upstream at start
    NoActiveSession,
    /// The source could not be attached
    ConnectFailed(String),
    /// The recording file could not be created
    RecordingFailed(String),
}

impl fmt::Display for StopCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopCause::Requested => write!(f, "stopped by request"),
            StopCause::SessionEnded => write!(f, "session ended"),
            StopCause::ReplayFinished => write!(f, "replay finished"),
            StopCause::ConsecutiveFailures { count, last_error } => {
                write!(f, "{} consecutive fetch failures (last: {})", count, last_error)
            }
            StopCause::NoActiveSession => write!(f, "no active session"),
            StopCause::ConnectFailed(reason) => write!(f, "connect failed: {}", reason),
            StopCause::RecordingFailed(reason) => write!(f, "recording failed: {}", reason),
        }
    }
}

/// Outcome of the most recent pulls
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchStatus {
    pub last_fetch_failed: bool,
    /// Most recent failure, kept after later successes
    pub last_error: Option<SourceError>,
    pub consecutive_failures: u32,
    /// Pulls attempted so far
    pub pulls: u64,
}

/// Read-only view of the controller state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackingSnapshot {
    pub phase: TrackingPhase,
    pub session_id: String,
    pub mode: Option<SessionMode>,
    pub pair: Option<DriverPair>,
    pub roster: Roster,
    /// Shared with the loop; replaced, never mutated in place, on publish
    pub points: Arc<Vec<IntervalPoint>>,
    pub events: Arc<Vec<Event>>,
    pub fetch: FetchStatus,
    pub stop_cause: Option<StopCause>,
    /// Why the last start request was turned down, if it was
    pub start_error: Option<String>,
    /// Set when writing the recording failed; tracking continues without it
    pub recording_error: Option<String>,
    pub recording_path: Option<PathBuf>,
}

impl TrackingSnapshot {
    pub fn latest_point(&self) -> Option<&IntervalPoint> {
        self.points.last()
    }

    pub fn trend(&self) -> Trend {
        trend_of(&self.points)
    }

    /// Display label of a driver, using the roster when possible
    pub fn driver_label(&self, driver: DriverId) -> String {
        self.roster.label(driver)
    }
}

/// Everything needed to start tracking
pub struct StartRequest {
    pub drivers: (DriverId, DriverId),
    pub source: Box<dyn SampleSource>,
    pub config: TrackingConfig,
    /// Record the session to this file
    pub record_to: Option<PathBuf>,
}

impl StartRequest {
    pub fn new(a: DriverId, b: DriverId, source: Box<dyn SampleSource>) -> Self {
        Self {
            drivers: (a, b),
            source,
            config: TrackingConfig::default(),
            record_to: None,
        }
    }

    pub fn with_config(mut self, config: TrackingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn record_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.record_to = Some(path.into());
        self
    }
}

struct ActiveSession {
    cancel: CancellationToken,
    paused: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Drives one tracking session at a time
pub struct TrackingController {
    state: Arc<watch::Sender<TrackingSnapshot>>,
    active: Option<ActiveSession>,
}

impl Default for TrackingController {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackingController {
    pub fn new() -> Self {
        let (state, _) = watch::channel(TrackingSnapshot::default());
        Self {
            state: Arc::new(state),
            active: None,
        }
    }

    /// Current state; the point and event history is shared, not copied
    pub fn snapshot(&self) -> TrackingSnapshot {
        self.state.borrow().clone()
    }

    pub fn phase(&self) -> TrackingPhase {
        self.state.borrow().phase
    }

    /// Receiver notified on every published change
    pub fn subscribe(&self) -> watch::Receiver<TrackingSnapshot> {
        self.state.subscribe()
    }

    /// Start tracking, replacing any running session.
    ///
    /// An invalid configuration, a pair naming the same driver twice or a
    /// driver missing from the session roster is rejected before the
    /// running session is touched. Once the new source is attached the
    /// running session is stopped and its recording closed.
    pub async fn start(&mut self, request: StartRequest) -> Result<(), TrackingError> {
        let StartRequest {
            drivers: (a, b),
            mut source,
            config,
            record_to,
        } = request;

        config.validate()?;
        let pair = DriverPair::new(a, b)?;

        let mode = source.mode();
        let running = self.is_running();
        let previous = self.snapshot();
        info!("Connecting {} source for {}", mode.label(), pair);
        if !running {
            self.state.send_replace(TrackingSnapshot {
                phase: TrackingPhase::Connecting,
                mode: Some(mode),
                pair: Some(pair),
                ..TrackingSnapshot::default()
            });
        }

        let fetch_timeout = config.fetch_timeout();
        let connected = match tokio::time::timeout(fetch_timeout, source.connect()).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout(fetch_timeout).into()),
        };
        let connected = match connected {
            Ok(connected) => connected,
            Err(e) => {
                let cause = match e {
                    TrackingError::NoActiveSession => StopCause::NoActiveSession,
                    ref other => StopCause::ConnectFailed(other.to_string()),
                };
                warn!("Connect failed: {}", e);
                self.stop().await;
                self.state.send_replace(TrackingSnapshot {
                    phase: TrackingPhase::Stopped,
                    mode: Some(mode),
                    pair: Some(pair),
                    stop_cause: Some(cause),
                    ..TrackingSnapshot::default()
                });
                return Err(e);
            }
        };

        if let Some(missing) = connected.missing_driver(pair) {
            let e = TrackingError::InvalidDriverPair(format!(
                "driver {} is not in session {}",
                missing, connected.session_id
            ));
            warn!("{}", e);
            let reason = e.to_string();
            if running {
                self.state.send_modify(|s| s.start_error = Some(reason));
            } else {
                self.state.send_replace(TrackingSnapshot {
                    start_error: Some(reason),
                    ..previous
                });
            }
            return Err(e);
        }

        self.stop().await;
        self.state.send_replace(TrackingSnapshot {
            phase: TrackingPhase::Connecting,
            mode: Some(mode),
            pair: Some(pair),
            ..TrackingSnapshot::default()
        });

        let recorder = match record_to {
            Some(path) => {
                let header = RecordingHeader::new(connected.session_id.clone(), mode, pair)
                    .with_roster(connected.roster.clone());
                match SessionRecorder::create(&path, &header) {
                    Ok(recorder) => Some(recorder),
                    Err(e) => {
                        error!("Could not create recording {}: {}", path.display(), e);
                        self.state.send_modify(|s| {
                            s.phase = TrackingPhase::Stopped;
                            s.stop_cause = Some(StopCause::RecordingFailed(e.to_string()));
                        });
                        return Err(e.into());
                    }
                }
            }
            None => None,
        };

        // Replays have nothing to wait for
        let phase = if mode == SessionMode::Recorded {
            TrackingPhase::Tracking
        } else {
            TrackingPhase::Connecting
        };
        self.state.send_modify(|s| {
            s.phase = phase;
            s.session_id = connected.session_id.clone();
            s.roster = connected.roster.clone();
            s.recording_path = recorder.as_ref().map(|r| r.path().to_path_buf());
        });
        info!("Session {} attached ({})", connected.session_id, phase.label());

        let cancel = CancellationToken::new();
        let (paused_tx, paused_rx) = watch::channel(false);
        let session_loop = SessionLoop {
            state: Arc::clone(&self.state),
            cancel: cancel.clone(),
            paused: paused_rx,
            source,
            pipeline: TrackingPipeline::new(pair, &config),
            session: Session::new(connected.session_id, mode, pair),
            recorder,
            config,
            phase,
            attached: mode == SessionMode::Recorded,
            since: None,
            fetch: FetchStatus::default(),
            recording_error: None,
            stop_cause: None,
            points: Arc::default(),
            events: Arc::default(),
        };
        self.active = Some(ActiveSession {
            cancel,
            paused: paused_tx,
            task: tokio::spawn(session_loop.run()),
        });
        Ok(())
    }

    /// Whether a session loop is still alive
    pub fn is_running(&self) -> bool {
        self.active.as_ref().is_some_and(|active| !active.task.is_finished())
    }

    /// Suspend pulling; returns false when nothing is running
    pub fn pause(&self) -> bool {
        self.set_paused(true)
    }

    /// Resume pulling after [`pause`](Self::pause)
    pub fn resume(&self) -> bool {
        self.set_paused(false)
    }

    fn set_paused(&self, paused: bool) -> bool {
        match &self.active {
            Some(active) if self.is_running() => {
                active.paused.send_replace(paused);
                true
            }
            _ => false,
        }
    }

    /// Stop the running session and wait for its loop to finish.
    ///
    /// Safe to call in any phase and any number of times.
    pub async fn stop(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        active.cancel.cancel();
        if let Err(e) = active.task.await {
            error!("Tracking loop ended abnormally: {}", e);
            self.state.send_modify(|s| {
                if s.phase != TrackingPhase::Stopped {
                    s.phase = TrackingPhase::Stopped;
                    s.stop_cause = Some(StopCause::Requested);
                }
            });
        }
    }

    /// Wait until the running session stops on its own
    pub async fn wait(&mut self) {
        if let Some(active) = self.active.as_mut() {
            if let Err(e) = (&mut active.task).await {
                error!("Tracking loop ended abnormally: {}", e);
            }
            self.active = None;
        }
    }
}

impl Drop for TrackingController {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
        }
    }
}

/// State owned by the spawned session task
struct SessionLoop {
    state: Arc<watch::Sender<TrackingSnapshot>>,
    cancel: CancellationToken,
    paused: watch::Receiver<bool>,
    source: Box<dyn SampleSource>,
    pipeline: TrackingPipeline,
    session: Session,
    recorder: Option<SessionRecorder>,
    config: TrackingConfig,
    phase: TrackingPhase,
    /// A pull has succeeded (always true for replays)
    attached: bool,
    since: Option<Duration>,
    fetch: FetchStatus,
    recording_error: Option<String>,
    stop_cause: Option<StopCause>,
    /// Published history; only cloned when a reader still holds the old one
    points: Arc<Vec<IntervalPoint>>,
    events: Arc<Vec<Event>>,
}

impl SessionLoop {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let cause = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break StopCause::Requested,
                changed = self.paused.changed() => {
                    if changed.is_err() {
                        break StopCause::Requested;
                    }
                    let paused = *self.paused.borrow_and_update();
                    self.set_paused(paused);
                }
                _ = ticker.tick() => {
                    if self.phase == TrackingPhase::Paused {
                        continue;
                    }
                    if let Some(cause) = self.cycle().await {
                        break cause;
                    }
                }
            }
        };
        self.finish(cause);
    }

    fn set_paused(&mut self, paused: bool) {
        let phase = match (paused, self.attached) {
            (true, _) => TrackingPhase::Paused,
            (false, true) => TrackingPhase::Tracking,
            (false, false) => TrackingPhase::Connecting,
        };
        if phase != self.phase {
            info!("Session {} {}", self.session.session_id(), phase.label());
            self.phase = phase;
            self.publish();
        }
    }

    /// One pull and everything it produced; returns a cause to stop
    async fn cycle(&mut self) -> Option<StopCause> {
        let timeout = self.config.fetch_timeout();
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Some(StopCause::Requested),
            result = tokio::time::timeout(timeout, self.source.pull(self.since)) => {
                result.unwrap_or(Err(SourceError::Timeout(timeout)))
            }
        };
        self.fetch.pulls += 1;

        let pull = match result {
            Ok(pull) => pull,
            Err(e) => {
                self.fetch.last_fetch_failed = true;
                self.fetch.last_error = Some(e.clone());
                self.fetch.consecutive_failures += 1;
                let count = self.fetch.consecutive_failures;
                warn!(
                    "Fetch failed ({}/{}): {}",
                    count, self.config.max_consecutive_failures, e
                );
                if count >= self.config.max_consecutive_failures {
                    return Some(StopCause::ConsecutiveFailures {
                        count,
                        last_error: e,
                    });
                }
                self.publish();
                return None;
            }
        };

        self.fetch.last_fetch_failed = false;
        self.fetch.consecutive_failures = 0;
        if !self.attached {
            self.attached = true;
            self.phase = TrackingPhase::Tracking;
            info!("Session {} tracking", self.session.session_id());
        }

        debug!(
            "Pulled {} samples in {} batches",
            pull.sample_count(),
            pull.batches.len()
        );
        for batch in &pull.batches {
            self.process(batch);
        }
        self.publish();

        if pull.session_active {
            return None;
        }
        Some(match self.session.mode() {
            SessionMode::Recorded => StopCause::ReplayFinished,
            _ => StopCause::SessionEnded,
        })
    }

    fn process(&mut self, batch: &SampleBatch) {
        if let Some(latest) = batch.latest() {
            self.since = Some(self.since.map_or(latest, |since| since.max(latest)));
        }
        self.record(|r| r.record_batch(batch));

        let output = self.pipeline.process(batch);
        if let Some(point) = output.point {
            if self.session.push_point(point.clone()) {
                self.record(|r| r.record_point(&point));
            }
        }
        for event in output.events {
            self.append_event(event);
        }
    }

    fn append_event(&mut self, event: Event) {
        info!("{}", event);
        if self.session.push_event(event.clone()) {
            self.record(|r| r.record_event(&event));
        } else {
            warn!("Dropped event outside the point timeline: {}", event);
        }
    }

    /// Write to the recording; on failure keep tracking without it
    fn record(&mut self, write: impl FnOnce(&mut SessionRecorder) -> Result<(), RecordingError>) {
        let Some(recorder) = self.recorder.as_mut() else {
            return;
        };
        if let Err(e) = write(recorder) {
            error!("Recording stopped: {}", e);
            self.recording_error = Some(e.to_string());
            self.recorder = None;
        }
    }

    fn finish(mut self, cause: StopCause) {
        for event in self.pipeline.finish() {
            self.append_event(event);
        }
        if let Some(mut recorder) = self.recorder.take() {
            if let Err(e) = recorder.finish() {
                error!("Could not finish recording: {}", e);
                self.recording_error = Some(e.to_string());
            }
        }

        info!(
            "Session {} stopped: {} ({} points, {} events)",
            self.session.session_id(),
            cause,
            self.session.points().len(),
            self.session.events().len()
        );
        self.phase = TrackingPhase::Stopped;
        self.stop_cause = Some(cause);
        self.publish();
    }

    fn publish(&mut self) {
        let new_points = &self.session.points()[self.points.len()..];
        if !new_points.is_empty() {
            Arc::make_mut(&mut self.points).extend_from_slice(new_points);
        }
        let new_events = &self.session.events()[self.events.len()..];
        if !new_events.is_empty() {
            Arc::make_mut(&mut self.events).extend_from_slice(new_events);
        }

        let points = Arc::clone(&self.points);
        let events = Arc::clone(&self.events);
        self.state.send_modify(|s| {
            s.phase = self.phase;
            s.points = points;
            s.events = events;
            s.fetch = self.fetch.clone();
            s.recording_error = self.recording_error.clone();
            s.stop_cause = self.stop_cause.clone();
        });
    }
}
