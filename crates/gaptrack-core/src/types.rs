//! Core timing types
//!
//! Raw per-driver samples, the normalized interval series and the events
//! detected on it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::TrackingError;

/// Gap below which a following car is within DRS activation range (seconds)
pub const DRS_RANGE_SECS: f64 = 1.0;

/// Car/driver number as published by the timing feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverId(pub u32);

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u32> for DriverId {
    fn from(number: u32) -> Self {
        DriverId(number)
    }
}

/// The two drivers whose interval is tracked.
///
/// The gap sign convention follows the pair order: a positive gap means
/// driver `a` is behind driver `b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverPair {
    a: DriverId,
    b: DriverId,
}

impl DriverPair {
    /// Create a pair, rejecting a driver paired with itself
    pub fn new(a: DriverId, b: DriverId) -> Result<Self, TrackingError> {
        if a == b {
            return Err(TrackingError::InvalidDriverPair(format!(
                "cannot track {} against itself",
                a
            )));
        }
        Ok(Self { a, b })
    }

    /// Reference driver
    pub fn a(&self) -> DriverId {
        self.a
    }

    /// Comparison driver
    pub fn b(&self) -> DriverId {
        self.b
    }

    /// Which side of the pair a driver is on
    pub fn side_of(&self, driver: DriverId) -> Option<Side> {
        if driver == self.a {
            Some(Side::A)
        } else if driver == self.b {
            Some(Side::B)
        } else {
            None
        }
    }

    /// Driver on the given side
    pub fn driver(&self, side: Side) -> DriverId {
        match side {
            Side::A => self.a,
            Side::B => self.b,
        }
    }
}

impl fmt::Display for DriverPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} vs {}", self.a, self.b)
    }
}

/// Side of a driver pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::A, Side::B];

    pub(crate) fn index(self) -> usize {
        match self {
            Side::A => 0,
            Side::B => 1,
        }
    }
}

/// One raw observation from the timing feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverSample {
    /// Driver the observation belongs to
    pub driver: DriverId,
    /// Session-relative time of the observation
    pub timestamp: Duration,
    /// Gap to the race leader in seconds
    pub gap_to_leader: f64,
    /// Lap the driver was on, when the feed reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lap_number: Option<u32>,
}

impl DriverSample {
    pub fn new(driver: DriverId, timestamp: Duration, gap_to_leader: f64) -> Self {
        Self {
            driver,
            timestamp,
            gap_to_leader,
            lap_number: None,
        }
    }

    pub fn with_lap(mut self, lap: u32) -> Self {
        self.lap_number = Some(lap);
        self
    }
}

/// Samples delivered together in one source pull.
///
/// A batch is the unit the normalizer ticks on, and the unit stored in
/// recordings so a replay sees exactly what the live run saw.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleBatch {
    pub samples: Vec<DriverSample>,
}

impl SampleBatch {
    pub fn new(samples: Vec<DriverSample>) -> Self {
        Self { samples }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Latest sample timestamp in the batch
    pub fn latest(&self) -> Option<Duration> {
        self.samples.iter().map(|s| s.timestamp).max()
    }
}

/// One tick of the normalized gap series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalPoint {
    /// Session-relative tick time (latest raw sample seen from either driver)
    pub timestamp: Duration,
    /// `a.gap_to_leader - b.gap_to_leader`; positive when `a` is behind
    pub gap_seconds: f64,
    /// Change of the gap in seconds per second, absent on the first point
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closing_rate: Option<f64>,
    /// At least one driver's sample was older than the staleness threshold
    #[serde(default)]
    pub stale: bool,
    /// Timestamp of the sample used for driver `a`
    pub a_sampled_at: Duration,
    /// Timestamp of the sample used for driver `b`
    pub b_sampled_at: Duration,
}

impl IntervalPoint {
    /// Timestamp of the raw sample carried forward for one side
    pub fn sampled_at(&self, side: Side) -> Duration {
        match side {
            Side::A => self.a_sampled_at,
            Side::B => self.b_sampled_at,
        }
    }

    /// Age of the raw sample carried forward for one side
    pub fn sample_age(&self, side: Side) -> Duration {
        self.timestamp.saturating_sub(self.sampled_at(side))
    }

    /// Whether the two cars are within DRS range of each other
    pub fn in_drs_range(&self) -> bool {
        self.gap_seconds.abs() <= DRS_RANGE_SECS
    }
}

/// Classification of a gap discontinuity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    PitStop,
    GapOpening,
    GapClosing,
    UnknownAnomaly,
}

impl EventKind {
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::PitStop => "pit stop",
            EventKind::GapOpening => "gap opening",
            EventKind::GapClosing => "gap closing",
            EventKind::UnknownAnomaly => "unknown anomaly",
        }
    }
}

/// A detected event on the interval series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    /// Driver whose behaviour caused the event, when attributable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<DriverId>,
    pub start_time: Duration,
    pub end_time: Duration,
    /// Signed gap change across the event in seconds
    pub magnitude: f64,
}

impl Event {
    pub fn duration(&self) -> Duration {
        self.end_time.saturating_sub(self.start_time)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {:.1}s..{:.1}s ({:+.3}s)",
            self.kind.label(),
            self.start_time.as_secs_f64(),
            self.end_time.as_secs_f64(),
            self.magnitude
        )?;
        if let Some(driver) = self.driver {
            write!(f, " by {}", driver)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_rejects_same_driver() {
        assert!(DriverPair::new(DriverId(1), DriverId(1)).is_err());
        let pair = DriverPair::new(DriverId(1), DriverId(16)).unwrap();
        assert_eq!(pair.side_of(DriverId(16)), Some(Side::B));
        assert_eq!(pair.side_of(DriverId(44)), None);
    }

    #[test]
    fn test_event_kind_wire_names() {
        let json = serde_json::to_string(&EventKind::PitStop).unwrap();
        assert_eq!(json, "\"PIT_STOP\"");
        let kind: EventKind = serde_json::from_str("\"UNKNOWN_ANOMALY\"").unwrap();
        assert_eq!(kind, EventKind::UnknownAnomaly);
    }

    #[test]
    fn test_drs_range() {
        let mut point = IntervalPoint {
            timestamp: Duration::from_secs(10),
            gap_seconds: -0.8,
            closing_rate: None,
            stale: false,
            a_sampled_at: Duration::from_secs(10),
            b_sampled_at: Duration::from_secs(9),
        };
        assert!(point.in_drs_range());
        point.gap_seconds = 1.4;
        assert!(!point.in_drs_range());
        assert_eq!(point.sample_age(Side::B), Duration::from_secs(1));
    }
}
