//! Live timing source

use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, info};

use super::{Pull, SampleSource, SourceSession, TimingApi};
use crate::error::{SourceError, TrackingError};
use crate::session::{SessionInfo, SessionMode};
use crate::types::SampleBatch;

/// Polls the upstream API for samples of the session currently running
pub struct LiveSource<A> {
    api: A,
    session: Option<SessionInfo>,
}

impl<A: TimingApi> LiveSource<A> {
    pub fn new(api: A) -> Self {
        Self { api, session: None }
    }

    pub fn session(&self) -> Option<&SessionInfo> {
        self.session.as_ref()
    }
}

#[async_trait]
impl<A: TimingApi> SampleSource for LiveSource<A> {
    fn mode(&self) -> SessionMode {
        SessionMode::Live
    }

    async fn connect(&mut self) -> Result<SourceSession, TrackingError> {
        let info = self
            .api
            .get_active_session()
            .await?
            .ok_or(TrackingError::NoActiveSession)?;
        let roster = self.api.get_drivers(info.session_key).await?;
        info!(
            "Connected to live session {} with {} drivers",
            info.display_name(),
            roster.drivers().len()
        );

        self.session = Some(info.clone());
        Ok(SourceSession {
            session_id: info.session_key.to_string(),
            roster,
            info: Some(info),
        })
    }

    async fn pull(&mut self, since: Option<Duration>) -> Result<Pull, SourceError> {
        let Some(session) = &self.session else {
            return Ok(Pull::ended());
        };

        let samples = self.api.get_samples(session, since).await?;
        if !samples.is_empty() {
            debug!("Pulled {} live samples", samples.len());
            return Ok(Pull {
                batches: vec![SampleBatch::new(samples)],
                session_active: true,
            });
        }

        // Quiet feed: the session is over once its scheduled end has passed
        if session.is_running(Utc::now()) {
            Ok(Pull::idle())
        } else {
            info!("Live session {} has ended", session.session_key);
            Ok(Pull::ended())
        }
    }
}
