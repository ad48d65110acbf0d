//! Demo Mode - Simulated timing feed for offline use
//!
//! Generates a plausible interval feed for three drivers without any network
//! access. The leader sits at zero gap, one chaser slowly reels in the car
//! ahead, and that car makes a pit stop partway through, dropping out of
//! the feed while in the pit lane.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

use super::{Pull, SampleSource, SourceSession};
use crate::error::{SourceError, TrackingError};
use crate::session::{DriverEntry, Roster, SessionMode};
use crate::types::{DriverId, DriverSample, SampleBatch};

/// Time a stopping car spends out of the timing feed
const PIT_LANE: Duration = Duration::from_secs(24);

/// Gap lost to the leader by a pit stop (seconds)
const PIT_LOSS_SECS: f64 = 21.0;

/// Random per-sample gap noise (seconds)
const GAP_NOISE_SECS: f64 = 0.05;

/// Maximum feed delay of a sample behind the simulated clock (ms)
const MAX_JITTER_MS: u64 = 400;

#[derive(Debug, Clone, Copy, PartialEq)]
enum PitState {
    /// On track, reporting normally
    Racing,
    /// In the pit lane, no timing until `until`
    InPitLane { until: Duration },
    /// Stop completed
    Done,
}

struct DemoDriver {
    entry: DriverEntry,
    /// Current gap to the leader
    gap: f64,
    /// Gap drift relative to the leader, seconds per second
    pace: f64,
    pit_at: Option<Duration>,
    pit: PitState,
}

impl DemoDriver {
    fn new(number: u32, acronym: &str, gap: f64, pace: f64, pit_at: Option<Duration>) -> Self {
        Self {
            entry: DriverEntry {
                number: DriverId(number),
                acronym: acronym.to_string(),
                full_name: None,
                team_name: None,
            },
            gap,
            pace,
            pit_at,
            pit: PitState::Racing,
        }
    }

    /// Advance the pit state machine; returns whether the car is in the feed
    fn update_pit_state(&mut self, clock: Duration) -> bool {
        match self.pit {
            PitState::Racing => {
                if self.pit_at.is_some_and(|at| clock >= at) {
                    self.pit = PitState::InPitLane {
                        until: clock + PIT_LANE,
                    };
                    return false;
                }
                true
            }
            PitState::InPitLane { until } => {
                if clock >= until {
                    self.gap += PIT_LOSS_SECS;
                    self.pit = PitState::Done;
                    true
                } else {
                    false
                }
            }
            PitState::Done => true,
        }
    }
}

/// Simulated three-car timing feed.
///
/// Each pull advances the simulated clock by one step, independent of wall
/// time, so a demo runs as fast as it is polled. The same seed always
/// produces the same feed.
pub struct DemoSource {
    rng: StdRng,
    step: Duration,
    duration: Duration,
    clock: Duration,
    drivers: Vec<DemoDriver>,
}

impl DemoSource {
    /// Create a twenty minute demo feed
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            step: Duration::from_secs(4),
            duration: Duration::from_secs(20 * 60),
            clock: Duration::ZERO,
            drivers: vec![
                DemoDriver::new(1, "VER", 0.0, 0.0, None),
                DemoDriver::new(16, "LEC", 4.0, 0.02, Some(Duration::from_secs(10 * 60))),
                DemoDriver::new(44, "HAM", 9.0, -0.06, None),
            ],
        }
    }

    /// Simulated time advanced per pull
    pub fn with_step(mut self, step: Duration) -> Self {
        self.step = step.max(Duration::from_millis(MAX_JITTER_MS + 1));
        self
    }

    /// Total simulated session length
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Drivers in the simulated feed
    pub fn roster(&self) -> Roster {
        Roster::new(self.drivers.iter().map(|d| d.entry.clone()).collect())
    }
}

#[async_trait]
impl SampleSource for DemoSource {
    fn mode(&self) -> SessionMode {
        SessionMode::Live
    }

    async fn connect(&mut self) -> Result<SourceSession, TrackingError> {
        Ok(SourceSession {
            session_id: "demo".to_string(),
            roster: self.roster(),
            info: None,
        })
    }

    async fn pull(&mut self, _since: Option<Duration>) -> Result<Pull, SourceError> {
        if self.clock >= self.duration {
            return Ok(Pull::ended());
        }
        self.clock += self.step;

        let step_secs = self.step.as_secs_f64();
        let mut samples = Vec::with_capacity(self.drivers.len());
        for driver in &mut self.drivers {
            if !driver.update_pit_state(self.clock) {
                continue;
            }
            if driver.gap > 0.0 {
                let noise = self.rng.gen_range(-GAP_NOISE_SECS..GAP_NOISE_SECS);
                driver.gap = (driver.gap + driver.pace * step_secs + noise).max(0.1);
            }
            let jitter = Duration::from_millis(self.rng.gen_range(0..MAX_JITTER_MS));
            samples.push(DriverSample::new(
                driver.entry.number,
                self.clock - jitter,
                driver.gap,
            ));
        }

        Ok(Pull {
            batches: vec![SampleBatch::new(samples)],
            session_active: self.clock < self.duration,
        })
    }
}
