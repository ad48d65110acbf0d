//! Interval normalizer
//!
//! Aligns the two drivers' independently sampled feeds onto one gap series.
//! The two feeds never update in lockstep, so each tick uses the most recent
//! sample of each driver (last observation carried forward).

use std::time::Duration;
use tracing::trace;

use crate::types::{DriverPair, DriverSample, IntervalPoint, SampleBatch};

/// Turns raw per-driver samples into [`IntervalPoint`]s
#[derive(Debug, Clone)]
pub struct IntervalNormalizer {
    pair: DriverPair,
    /// Sample age beyond which a point is flagged stale
    stale_after: Duration,
    /// Latest sample per side
    latest: [Option<DriverSample>; 2],
    /// Last emitted point
    previous: Option<IntervalPoint>,
}

impl IntervalNormalizer {
    pub fn new(pair: DriverPair, stale_after: Duration) -> Self {
        Self {
            pair,
            stale_after,
            latest: [None, None],
            previous: None,
        }
    }

    pub fn pair(&self) -> DriverPair {
        self.pair
    }

    /// Latest raw sample timestamp seen from either driver
    pub fn latest_timestamp(&self) -> Option<Duration> {
        self.latest.iter().flatten().map(|s| s.timestamp).max()
    }

    /// Absorb samples, keeping the newest per tracked driver.
    ///
    /// Samples for other drivers and samples older than what is already held
    /// are ignored. Returns the number of samples taken.
    pub fn ingest(&mut self, samples: &[DriverSample]) -> usize {
        let mut taken = 0;
        for sample in samples {
            let Some(side) = self.pair.side_of(sample.driver) else {
                continue;
            };
            if !sample.gap_to_leader.is_finite() {
                trace!("Dropping non-finite gap for {}", sample.driver);
                continue;
            }
            let slot = &mut self.latest[side.index()];
            if slot
                .as_ref()
                .is_some_and(|held| held.timestamp > sample.timestamp)
            {
                trace!(
                    "Ignoring out-of-order sample for {} at {:?}",
                    sample.driver,
                    sample.timestamp
                );
                continue;
            }
            *slot = Some(sample.clone());
            taken += 1;
        }
        taken
    }

    /// Emit the point for the current tick, if there is a new one.
    ///
    /// Nothing is emitted until both drivers have been seen, or when no
    /// sample newer than the previous point has arrived.
    pub fn tick(&mut self) -> Option<IntervalPoint> {
        let (a, b) = match &self.latest {
            [Some(a), Some(b)] => (a, b),
            _ => return None,
        };

        let timestamp = a.timestamp.max(b.timestamp);
        if let Some(previous) = &self.previous {
            if timestamp <= previous.timestamp {
                return None;
            }
        }

        let gap_seconds = a.gap_to_leader - b.gap_to_leader;
        let closing_rate = self.previous.as_ref().map(|previous| {
            let elapsed = (timestamp - previous.timestamp).as_secs_f64();
            (gap_seconds - previous.gap_seconds) / elapsed
        });
        let stale = timestamp - a.timestamp > self.stale_after
            || timestamp - b.timestamp > self.stale_after;

        let point = IntervalPoint {
            timestamp,
            gap_seconds,
            closing_rate,
            stale,
            a_sampled_at: a.timestamp,
            b_sampled_at: b.timestamp,
        };
        self.previous = Some(point.clone());
        Some(point)
    }

    /// Ingest one batch and tick
    pub fn process(&mut self, batch: &SampleBatch) -> Option<IntervalPoint> {
        self.ingest(&batch.samples);
        self.tick()
    }
}
