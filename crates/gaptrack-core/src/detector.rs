//! Event detection
//!
//! Classifies discontinuities in the interval series without any ground
//! truth pit or timing-loop signal:
//!
//! - **Pit stop**: the gap steps by more than the pit threshold within a few
//!   ticks, and exactly one driver reappeared in the feed across the step
//!   after being silent for longer than the staleness threshold.
//! - **Unknown anomaly**: the same step with no single driver to blame.
//! - **Gap opening / closing**: the closing rate keeps one sign at a
//!   meaningful magnitude for a minimum number of consecutive ticks. A
//!   negative rate (A gaining on B) is closing, even through an overtake.
//!
//! The detector only looks at the points it is given, so the same series
//! always yields the same events, live or replayed.

use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

use crate::config::TrackingConfig;
use crate::types::{DriverId, DriverPair, Event, EventKind, IntervalPoint, Side};

/// Thresholds used by the detector
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    /// Minimum |gap step| in seconds for a pit stop or anomaly
    pub pit_stop_threshold: f64,
    /// Maximum number of ticks a step may be spread over
    pub pit_window_ticks: usize,
    /// Consecutive qualifying ticks for a trend event
    pub trend_min_ticks: usize,
    /// Minimum |closing rate| in seconds per second for a qualifying tick
    pub trend_min_rate: f64,
    /// Feed silence that marks a driver as having left the timing loop
    pub stale_after: Duration,
}

impl From<&TrackingConfig> for DetectorConfig {
    fn from(config: &TrackingConfig) -> Self {
        Self {
            pit_stop_threshold: config.pit_stop_threshold_secs,
            pit_window_ticks: config.pit_window_ticks,
            trend_min_ticks: config.trend_min_ticks,
            trend_min_rate: config.trend_min_rate,
            stale_after: config.stale_after(),
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::from(&TrackingConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Closing,
    Opening,
}

/// Trend episode state
#[derive(Debug, Clone, Copy, PartialEq)]
enum TrendState {
    /// No sustained movement in progress
    Idle,
    /// Gap moving one way since `start_time`
    Running {
        direction: Direction,
        start_time: Duration,
        /// Gap just before the first qualifying tick
        start_gap: f64,
        end_time: Duration,
        end_gap: f64,
        ticks: usize,
    },
}

/// Per-session event detector
#[derive(Debug, Clone)]
pub struct EventDetector {
    pair: DriverPair,
    config: DetectorConfig,
    /// Last points, newest at the back, used as step bases
    recent: VecDeque<IntervalPoint>,
    /// End of the last step; later steps may not reach back past it
    step_barrier: Option<Duration>,
    trend: TrendState,
}

impl EventDetector {
    pub fn new(pair: DriverPair, config: DetectorConfig) -> Self {
        Self {
            pair,
            recent: VecDeque::with_capacity(config.pit_window_ticks + 1),
            config,
            step_barrier: None,
            trend: TrendState::Idle,
        }
    }

    /// Feed the next point, returning any events it completes
    pub fn observe(&mut self, point: &IntervalPoint) -> Vec<Event> {
        if let Some(last) = self.recent.back() {
            if point.timestamp <= last.timestamp {
                debug!("Skipping point at {:?}: not after previous", point.timestamp);
                return Vec::new();
            }
        }

        let mut events = Vec::new();
        if let Some(step) = self.find_step(point) {
            events.extend(self.close_trend());
            events.push(step);
            self.step_barrier = Some(point.timestamp);
        } else {
            events.extend(self.update_trend(point));
        }

        self.recent.push_back(point.clone());
        while self.recent.len() > self.config.pit_window_ticks {
            self.recent.pop_front();
        }
        events
    }

    /// Close any trend still open at the end of the series
    pub fn finish(&mut self) -> Option<Event> {
        self.close_trend()
    }

    fn find_step(&self, point: &IntervalPoint) -> Option<Event> {
        let window = self.config.pit_window_ticks.min(self.recent.len());
        for back in 1..=window {
            let base = &self.recent[self.recent.len() - back];
            if self.step_barrier.is_some_and(|barrier| base.timestamp < barrier) {
                break;
            }
            let delta = point.gap_seconds - base.gap_seconds;
            if delta.abs() > self.config.pit_stop_threshold {
                let driver = self.attribute(base, point);
                let kind = if driver.is_some() {
                    EventKind::PitStop
                } else {
                    EventKind::UnknownAnomaly
                };
                return Some(Event {
                    kind,
                    driver,
                    start_time: base.timestamp,
                    end_time: point.timestamp,
                    magnitude: delta,
                });
            }
        }
        None
    }

    /// The driver that came back into the feed after a long silence.
    ///
    /// A driver whose carried-forward sample did not change cannot have moved
    /// the gap, so only drivers with a fresh sample across the step count.
    fn attribute(&self, base: &IntervalPoint, point: &IntervalPoint) -> Option<DriverId> {
        let silent: Vec<Side> = Side::BOTH
            .into_iter()
            .filter(|&side| {
                let before = base.sampled_at(side);
                let after = point.sampled_at(side);
                after > before && after - before >= self.config.stale_after
            })
            .collect();

        match silent.as_slice() {
            [side] => Some(self.pair.driver(*side)),
            _ => None,
        }
    }

    fn update_trend(&mut self, point: &IntervalPoint) -> Option<Event> {
        let previous_gap = self.recent.back()?.gap_seconds;
        // A falling gap is A gaining on B, wherever the gap crosses zero
        let direction = match point.closing_rate {
            Some(rate) if !point.stale && rate.abs() >= self.config.trend_min_rate => {
                Some(if rate < 0.0 {
                    Direction::Closing
                } else {
                    Direction::Opening
                })
            }
            _ => None,
        };

        match (self.trend, direction) {
            (
                TrendState::Running {
                    direction: running,
                    start_time,
                    start_gap,
                    ticks,
                    ..
                },
                Some(direction),
            ) if running == direction => {
                self.trend = TrendState::Running {
                    direction,
                    start_time,
                    start_gap,
                    end_time: point.timestamp,
                    end_gap: point.gap_seconds,
                    ticks: ticks + 1,
                };
                None
            }
            (_, Some(direction)) => {
                let closed = self.close_trend();
                self.trend = TrendState::Running {
                    direction,
                    start_time: point.timestamp,
                    start_gap: previous_gap,
                    end_time: point.timestamp,
                    end_gap: point.gap_seconds,
                    ticks: 1,
                };
                closed
            }
            (_, None) => self.close_trend(),
        }
    }

    fn close_trend(&mut self) -> Option<Event> {
        let state = std::mem::replace(&mut self.trend, TrendState::Idle);
        match state {
            TrendState::Running {
                direction,
                start_time,
                start_gap,
                end_time,
                end_gap,
                ticks,
            } if ticks >= self.config.trend_min_ticks => Some(Event {
                kind: match direction {
                    Direction::Closing => EventKind::GapClosing,
                    Direction::Opening => EventKind::GapOpening,
                },
                driver: None,
                start_time,
                end_time,
                magnitude: end_gap - start_gap,
            }),
            _ => None,
        }
    }
}

/// Run a fresh detector over a complete series
pub fn detect_events(pair: DriverPair, config: DetectorConfig, points: &[IntervalPoint]) -> Vec<Event> {
    let mut detector = EventDetector::new(pair, config);
    let mut events: Vec<Event> = points.iter().flat_map(|p| detector.observe(p)).collect();
    events.extend(detector.finish());
    events
}
