//! Recorded session replay

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::{Pull, SampleSource, SourceSession};
use crate::error::{SourceError, TrackingError};
use crate::recording::{Recording, RecordingHeader};
use crate::session::{Roster, SessionMode};
use crate::types::SampleBatch;

/// Replays the sample batches of a [`Recording`] against the wall clock.
///
/// Each pull releases every batch whose session time lies within the
/// elapsed wall-clock time since replay start multiplied by `speed`.
/// Batches are released exactly as recorded, so the pipeline sees the same
/// tick sequence as the recorded run.
pub struct ReplaySource {
    header: RecordingHeader,
    batches: Vec<SampleBatch>,
    speed: f64,
    cursor: usize,
    started: Option<Instant>,
}

impl ReplaySource {
    pub fn new(recording: Recording, speed: f64) -> Self {
        Self {
            header: recording.header,
            batches: recording.batches,
            speed,
            cursor: 0,
            started: None,
        }
    }

    /// Batches not yet released
    pub fn remaining(&self) -> usize {
        self.batches.len() - self.cursor
    }

    /// Session time of the first recorded batch
    fn origin(&self) -> Duration {
        self.batches
            .first()
            .and_then(SampleBatch::latest)
            .unwrap_or_default()
    }
}

#[async_trait]
impl SampleSource for ReplaySource {
    fn mode(&self) -> SessionMode {
        SessionMode::Recorded
    }

    async fn connect(&mut self) -> Result<SourceSession, TrackingError> {
        self.cursor = 0;
        self.started = Some(Instant::now());

        let roster = if self.header.roster.is_empty() {
            let pair = self.header.driver_pair;
            Roster::from_numbers([pair.a(), pair.b()])
        } else {
            self.header.roster.clone()
        };
        Ok(SourceSession {
            session_id: self.header.session_id.clone(),
            roster,
            info: None,
        })
    }

    async fn pull(&mut self, _since: Option<Duration>) -> Result<Pull, SourceError> {
        let started = *self.started.get_or_insert_with(Instant::now);
        let window_end = self.origin() + started.elapsed().mul_f64(self.speed);

        let due = self.batches[self.cursor..]
            .iter()
            .take_while(|b| b.latest().map_or(true, |t| t <= window_end))
            .count();
        let batches = self.batches[self.cursor..self.cursor + due].to_vec();
        self.cursor += due;

        debug!(
            "Replay released {} batches up to {:?} ({} left)",
            due,
            window_end,
            self.remaining()
        );
        Ok(Pull {
            batches,
            session_active: self.cursor < self.batches.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DriverId, DriverPair, DriverSample};

    /// Ten batches, one every 4s of session time from 4s to 40s
    fn replay(speed: f64) -> ReplaySource {
        let pair = DriverPair::new(DriverId(1), DriverId(16)).unwrap();
        let mut recording = Recording::new(RecordingHeader::new("9158", SessionMode::Live, pair));
        recording.batches = (1..=10u64)
            .map(|i| {
                let t = Duration::from_secs(i * 4);
                SampleBatch::new(vec![
                    DriverSample::new(DriverId(1), t, 0.0),
                    DriverSample::new(DriverId(16), t, 1.5),
                ])
            })
            .collect();
        recording.into_replay(speed)
    }

    fn released(pull: &Pull) -> Vec<u64> {
        pull.batches
            .iter()
            .filter_map(SampleBatch::latest)
            .map(|t| t.as_secs())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_real_time_pacing() {
        let mut source = replay(1.0);
        source.connect().await.unwrap();

        // The first batch is due at once
        let pull = source.pull(None).await.unwrap();
        assert_eq!(released(&pull), vec![4]);
        assert!(pull.session_active);

        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(released(&source.pull(None).await.unwrap()), vec![8, 12]);

        tokio::time::advance(Duration::from_millis(3_900)).await;
        assert!(source.pull(None).await.unwrap().batches.is_empty());

        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(released(&source.pull(None).await.unwrap()), vec![16]);
        assert_eq!(source.remaining(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_accelerated_pacing() {
        let mut source = replay(4.0);
        source.connect().await.unwrap();
        assert_eq!(released(&source.pull(None).await.unwrap()), vec![4]);

        // 4s of wall time covers 16s of session time
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(released(&source.pull(None).await.unwrap()), vec![8, 12, 16, 20]);

        tokio::time::advance(Duration::from_secs(5)).await;
        let last = source.pull(None).await.unwrap();
        assert_eq!(released(&last), vec![24, 28, 32, 36, 40]);
        assert!(!last.session_active);
        assert_eq!(source.remaining(), 0);
    }
}
