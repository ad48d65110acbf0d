//! Tracking sessions
//!
//! A [`Session`] owns the interval series and event list of one tracked
//! pair. Upstream session metadata ([`SessionInfo`]) and the driver
//! [`Roster`] describe what the timing feed knows about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{DriverId, DriverPair, Event, IntervalPoint};

/// Mean per-tick change (seconds) separating a trend from a stable gap
const TREND_BAND_SECS: f64 = 0.1;

/// Number of recent gap changes averaged for the trend summary
const TREND_WINDOW: usize = 3;

/// Where a session's samples come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Live,
    Historical,
    Recorded,
}

impl SessionMode {
    pub fn label(&self) -> &'static str {
        match self {
            SessionMode::Live => "live",
            SessionMode::Historical => "historical",
            SessionMode::Recorded => "recorded",
        }
    }
}

/// Direction the gap has been moving over the last few ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Closing,
    Extending,
    Stable,
    Unknown,
}

/// A tracked race/practice/qualifying instance
#[derive(Debug, Clone)]
pub struct Session {
    session_id: String,
    mode: SessionMode,
    pair: DriverPair,
    points: Vec<IntervalPoint>,
    events: Vec<Event>,
}

impl Session {
    pub fn new(session_id: impl Into<String>, mode: SessionMode, pair: DriverPair) -> Self {
        Self {
            session_id: session_id.into(),
            mode,
            pair,
            points: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn pair(&self) -> DriverPair {
        self.pair
    }

    pub fn points(&self) -> &[IntervalPoint] {
        &self.points
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn latest_point(&self) -> Option<&IntervalPoint> {
        self.points.last()
    }

    /// Append a point; refused unless strictly after the previous one
    pub fn push_point(&mut self, point: IntervalPoint) -> bool {
        if let Some(last) = self.points.last() {
            if point.timestamp <= last.timestamp {
                return false;
            }
        }
        self.points.push(point);
        true
    }

    /// Append an event; refused unless it lies within the point timeline
    pub fn push_event(&mut self, event: Event) -> bool {
        let (first, last) = match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => (first.timestamp, last.timestamp),
            _ => return false,
        };
        if event.start_time < first || event.end_time > last || event.start_time > event.end_time {
            return false;
        }
        self.events.push(event);
        true
    }

    pub fn trend(&self) -> Trend {
        trend_of(&self.points)
    }
}

/// Summarize the recent direction of the gap.
///
/// Averages the signed gap change over the last three ticks; a mean fall
/// beyond 0.1s per tick is closing, a mean rise beyond it is extending.
pub fn trend_of(points: &[IntervalPoint]) -> Trend {
    if points.len() < TREND_WINDOW + 1 {
        return Trend::Unknown;
    }
    let recent = &points[points.len() - (TREND_WINDOW + 1)..];
    let mean = recent
        .windows(2)
        .map(|w| w[1].gap_seconds - w[0].gap_seconds)
        .sum::<f64>()
        / TREND_WINDOW as f64;

    if mean < -TREND_BAND_SECS {
        Trend::Closing
    } else if mean > TREND_BAND_SECS {
        Trend::Extending
    } else {
        Trend::Stable
    }
}

/// Upstream description of a timing session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_key: u32,
    pub session_name: String,
    #[serde(default)]
    pub session_type: Option<String>,
    pub date_start: DateTime<Utc>,
    #[serde(default)]
    pub date_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub country_name: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
}

impl SessionInfo {
    /// Whether the session is running at `now`
    pub fn is_running(&self, now: DateTime<Utc>) -> bool {
        now >= self.date_start && self.date_end.map_or(true, |end| now <= end)
    }

    /// Session-relative offset of an absolute feed timestamp
    pub fn offset_of(&self, at: DateTime<Utc>) -> std::time::Duration {
        (at - self.date_start).to_std().unwrap_or_default()
    }

    /// Absolute time of a session-relative offset
    pub fn absolute(&self, offset: std::time::Duration) -> DateTime<Utc> {
        match chrono::Duration::from_std(offset) {
            Ok(delta) => self.date_start + delta,
            Err(_) => self.date_start,
        }
    }

    pub fn display_name(&self) -> String {
        let date = self.date_start.format("%Y-%m-%d");
        match &self.location {
            Some(location) => format!("{} - {} {} (#{})", date, location, self.session_name, self.session_key),
            None => format!("{} - {} (#{})", date, self.session_name, self.session_key),
        }
    }
}

/// A driver known to a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverEntry {
    pub number: DriverId,
    pub acronym: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub team_name: Option<String>,
}

/// Drivers taking part in a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster {
    drivers: Vec<DriverEntry>,
}

impl Roster {
    pub fn new(mut drivers: Vec<DriverEntry>) -> Self {
        drivers.sort_by_key(|d| d.number);
        drivers.dedup_by_key(|d| d.number);
        Self { drivers }
    }

    /// Roster containing only bare driver numbers
    pub fn from_numbers(numbers: impl IntoIterator<Item = DriverId>) -> Self {
        Self::new(
            numbers
                .into_iter()
                .map(|number| DriverEntry {
                    number,
                    acronym: number.0.to_string(),
                    full_name: None,
                    team_name: None,
                })
                .collect(),
        )
    }

    pub fn drivers(&self) -> &[DriverEntry] {
        &self.drivers
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    pub fn contains(&self, driver: DriverId) -> bool {
        self.drivers.iter().any(|d| d.number == driver)
    }

    pub fn get(&self, driver: DriverId) -> Option<&DriverEntry> {
        self.drivers.iter().find(|d| d.number == driver)
    }

    /// Resolve a driver by number ("44") or acronym ("HAM", any case)
    pub fn resolve(&self, name: &str) -> Option<DriverId> {
        let name = name.trim();
        if let Ok(number) = name.parse::<u32>() {
            return self.contains(DriverId(number)).then_some(DriverId(number));
        }
        self.drivers
            .iter()
            .find(|d| d.acronym.eq_ignore_ascii_case(name))
            .map(|d| d.number)
    }

    /// Short label for a driver, falling back to its number
    pub fn label(&self, driver: DriverId) -> String {
        self.get(driver)
            .map(|d| d.acronym.clone())
            .unwrap_or_else(|| driver.to_string())
    }
}
