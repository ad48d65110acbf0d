//! Sample sources
//!
//! A [`SampleSource`] hides where timing samples come from: the live feed,
//! a finished session fetched in one go, or a stored recording replayed
//! against the wall clock. The controller treats all of them alike.

mod demo;
mod historical;
mod live;
pub mod openf1;
mod replay;

pub use demo::DemoSource;
pub use historical::HistoricalSource;
pub use live::LiveSource;
pub use openf1::OpenF1Client;
pub use replay::ReplaySource;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{SourceError, TrackingError};
use crate::session::{Roster, SessionInfo, SessionMode};
use crate::types::{DriverId, DriverPair, DriverSample, SampleBatch};

/// What a source reports once connected
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSession {
    /// Identifier of the upstream session (or recording)
    pub session_id: String,
    /// Drivers known to the session
    pub roster: Roster,
    /// Upstream metadata, when the source has it
    pub info: Option<SessionInfo>,
}

impl SourceSession {
    /// First driver of the pair absent from a non-empty roster
    pub fn missing_driver(&self, pair: DriverPair) -> Option<DriverId> {
        if self.roster.is_empty() {
            return None;
        }
        [pair.a(), pair.b()]
            .into_iter()
            .find(|driver| !self.roster.contains(*driver))
    }
}

/// Result of one pull
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pull {
    /// New samples, one batch per normalizer tick; empty when nothing new
    pub batches: Vec<SampleBatch>,
    /// False once the session is over or the data is exhausted
    pub session_active: bool,
}

impl Pull {
    /// Nothing new, session still running
    pub fn idle() -> Self {
        Self {
            batches: Vec::new(),
            session_active: true,
        }
    }

    /// No more data will come
    pub fn ended() -> Self {
        Self {
            batches: Vec::new(),
            session_active: false,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.batches.iter().map(SampleBatch::len).sum()
    }
}

/// Producer of timestamped raw samples for one session
#[async_trait]
pub trait SampleSource: Send {
    /// Kind of data this source produces
    fn mode(&self) -> SessionMode;

    /// Attach to the session and learn which drivers it has.
    ///
    /// Fails with [`TrackingError::NoActiveSession`] when a live source finds
    /// nothing running.
    async fn connect(&mut self) -> Result<SourceSession, TrackingError>;

    /// Samples newer than `since` (session-relative).
    ///
    /// An empty pull is not an error; fetch failures are.
    async fn pull(&mut self, since: Option<Duration>) -> Result<Pull, SourceError>;
}

/// Filters for listing finished sessions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionFilter {
    /// Season; `None` means the current and previous season
    pub year: Option<i32>,
    /// Session type such as "Race" or "Qualifying"
    pub session_type: Option<String>,
    /// Maximum number of sessions returned (newest first)
    pub limit: Option<usize>,
}

/// Upstream timing API capability
#[async_trait]
pub trait TimingApi: Send + Sync {
    /// The session currently running, if any
    async fn get_active_session(&self) -> Result<Option<SessionInfo>, SourceError>;

    /// Look up one session by key
    async fn get_session(&self, session_key: u32) -> Result<Option<SessionInfo>, SourceError>;

    /// Sessions matching the filter, newest first
    async fn list_historical_sessions(
        &self,
        filter: &SessionFilter,
    ) -> Result<Vec<SessionInfo>, SourceError>;

    /// Drivers taking part in a session
    async fn get_drivers(&self, session_key: u32) -> Result<Roster, SourceError>;

    /// Samples of all drivers newer than `since`, in timestamp order
    async fn get_samples(
        &self,
        session: &SessionInfo,
        since: Option<Duration>,
    ) -> Result<Vec<DriverSample>, SourceError>;
}

/// Split a sample set into one batch per `cadence` of session time.
///
/// Used to feed a complete historical session through the normalizer with
/// the same tick spacing a live run would have. Input order does not matter.
pub fn batch_by_cadence(mut samples: Vec<DriverSample>, cadence: Duration) -> Vec<SampleBatch> {
    samples.sort_by_key(|s| s.timestamp);
    let cadence_ns = cadence.as_nanos().max(1);

    let mut batches: Vec<SampleBatch> = Vec::new();
    let mut current_slot = None;
    for sample in samples {
        let slot = sample.timestamp.as_nanos() / cadence_ns;
        match batches.last_mut() {
            Some(batch) if current_slot == Some(slot) => batch.samples.push(sample),
            _ => {
                current_slot = Some(slot);
                batches.push(SampleBatch::new(vec![sample]));
            }
        }
    }
    batches
}
