//! Historical session source

use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use super::{batch_by_cadence, Pull, SampleSource, SourceSession, TimingApi};
use crate::error::{SourceError, TrackingError};
use crate::session::{SessionInfo, SessionMode};

/// Fetches a finished session in one call.
///
/// The full sample set is cut into batches of `cadence` session time so the
/// normalizer ticks as it would have live; everything is delivered on the
/// first pull, after which the source reports the session as ended.
pub struct HistoricalSource<A> {
    api: A,
    session_key: u32,
    cadence: Duration,
    session: Option<SessionInfo>,
    delivered: bool,
}

impl<A: TimingApi> HistoricalSource<A> {
    pub fn new(api: A, session_key: u32, cadence: Duration) -> Self {
        Self {
            api,
            session_key,
            cadence,
            session: None,
            delivered: false,
        }
    }
}

#[async_trait]
impl<A: TimingApi> SampleSource for HistoricalSource<A> {
    fn mode(&self) -> SessionMode {
        SessionMode::Historical
    }

    async fn connect(&mut self) -> Result<SourceSession, TrackingError> {
        let info = self
            .api
            .get_session(self.session_key)
            .await?
            .ok_or(TrackingError::SessionNotFound(self.session_key))?;
        let roster = self.api.get_drivers(info.session_key).await?;

        self.session = Some(info.clone());
        self.delivered = false;
        Ok(SourceSession {
            session_id: info.session_key.to_string(),
            roster,
            info: Some(info),
        })
    }

    async fn pull(&mut self, _since: Option<Duration>) -> Result<Pull, SourceError> {
        let session = match &self.session {
            Some(session) if !self.delivered => session,
            _ => return Ok(Pull::ended()),
        };

        let samples = self.api.get_samples(session, None).await?;
        let batches = batch_by_cadence(samples, self.cadence);
        info!(
            "Loaded historical session {}: {} ticks",
            session.session_key,
            batches.len()
        );

        self.delivered = true;
        Ok(Pull {
            batches,
            session_active: false,
        })
    }
}
