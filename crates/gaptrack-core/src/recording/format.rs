//! Recording file format
//!
//! A recording is a JSON Lines file. The first line is the header, then one
//! record per line in the order things happened, and finally a footer once
//! the recording was finished cleanly:
//!
//! ```text
//! {"type":"header","version":1,"session_id":"9158","mode":"live",...}
//! {"type":"batch","samples":[...]}
//! {"type":"point","timestamp":{...},"gap_seconds":2.5,...}
//! {"type":"event","kind":"PIT_STOP",...}
//! {"type":"footer","points":812,"events":4,"finished_at":"..."}
//! ```
//!
//! Readers ignore unknown fields and unknown record types, so later versions
//! may add either without breaking older readers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::Path;

use crate::session::{Roster, SessionMode};
use crate::types::{DriverPair, Event, IntervalPoint, SampleBatch};

/// Current recording format version
pub const FORMAT_VERSION: u32 = 1;

/// File extension used for recordings
pub const RECORDING_EXTENSION: &str = "jsonl";

/// Recording header, always the first record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingHeader {
    /// Format version; mandatory
    pub version: u32,
    pub session_id: String,
    pub mode: SessionMode,
    pub driver_pair: DriverPair,
    pub created_at: DateTime<Utc>,
    /// Drivers known to the session when recording started
    #[serde(default)]
    pub roster: Roster,
}

impl RecordingHeader {
    pub fn new(session_id: impl Into<String>, mode: SessionMode, driver_pair: DriverPair) -> Self {
        Self {
            version: FORMAT_VERSION,
            session_id: session_id.into(),
            mode,
            driver_pair,
            created_at: Utc::now(),
            roster: Roster::default(),
        }
    }

    pub fn with_roster(mut self, roster: Roster) -> Self {
        self.roster = roster;
        self
    }
}

/// Written when a recording is finished cleanly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingFooter {
    pub points: usize,
    pub events: usize,
    pub finished_at: DateTime<Utc>,
}

/// One line of a recording file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Record {
    Header(RecordingHeader),
    Batch(SampleBatch),
    Point(IntervalPoint),
    Event(Event),
    Footer(RecordingFooter),
    /// Record type added by a later format version
    #[serde(other)]
    Unknown,
}

/// Write a record as one line
pub fn write_record<W: Write>(writer: &mut W, record: &Record) -> io::Result<()> {
    serde_json::to_writer(&mut *writer, record)?;
    writeln!(writer)
}

/// Whether a path looks like a recording file
pub fn is_recording_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(RECORDING_EXTENSION))
}
