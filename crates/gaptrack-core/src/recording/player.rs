//! Recording loader
//!
//! Reads a recording back into memory and hands it to a [`ReplaySource`].

use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use super::format::{Record, FORMAT_VERSION};
use super::Recording;
use crate::error::RecordingError;
use crate::source::ReplaySource;

impl Recording {
    /// Load a recording, failing on the first corrupt record
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RecordingError> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::parse(&text)
    }

    /// Load a recording, keeping everything before the first corrupt record
    pub fn load_salvaged<P: AsRef<Path>>(path: P) -> Result<Self, RecordingError> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::parse_salvaged(&text)
    }

    /// Parse recording text, failing on the first corrupt record
    pub fn parse(text: &str) -> Result<Self, RecordingError> {
        let mut reader = Reader::default();
        reader.read(text)?;
        reader.into_recording()
    }

    /// Parse recording text, keeping everything before the first corrupt record
    pub fn parse_salvaged(text: &str) -> Result<Self, RecordingError> {
        let mut reader = Reader::default();
        if let Err(e) = reader.read(text) {
            if reader.recording.is_none() {
                return Err(e);
            }
            warn!("Salvaging recording: {}", e);
        }
        reader.into_recording()
    }

    /// Turn the recording into a source replaying it at `speed`
    pub fn into_replay(self, speed: f64) -> ReplaySource {
        ReplaySource::new(self, speed)
    }
}

#[derive(Default)]
struct Reader {
    recording: Option<Recording>,
    records: usize,
}

impl Reader {
    fn read(&mut self, text: &str) -> Result<(), RecordingError> {
        let terminated = text.ends_with('\n');
        let lines: Vec<&str> = text.lines().collect();

        for (n, line) in lines.iter().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record = match serde_json::from_str::<Record>(line) {
                Ok(record) => record,
                // A partial last line is a write cut short, not corruption
                Err(e) if n + 1 == lines.len() && !terminated => {
                    warn!("Dropping unterminated final record: {}", e);
                    return Ok(());
                }
                Err(e) => return Err(self.corrupt(e.to_string())),
            };
            self.accept(record)?;
        }
        Ok(())
    }

    fn accept(&mut self, record: Record) -> Result<(), RecordingError> {
        let Some(recording) = self.recording.as_mut() else {
            return match record {
                Record::Header(header) => {
                    if header.version > FORMAT_VERSION {
                        warn!(
                            "Recording format version {} is newer than {}; reading known records only",
                            header.version, FORMAT_VERSION
                        );
                    }
                    self.recording = Some(Recording::new(header));
                    self.records += 1;
                    Ok(())
                }
                _ => Err(self.corrupt("first record is not a header")),
            };
        };

        if recording.footer.is_some() {
            return Err(self.corrupt("record after footer"));
        }

        match record {
            Record::Header(_) => return Err(self.corrupt("duplicate header")),
            Record::Batch(batch) => recording.batches.push(batch),
            Record::Point(point) => {
                if recording
                    .points
                    .last()
                    .is_some_and(|last| point.timestamp <= last.timestamp)
                {
                    return Err(self.corrupt("point timestamps not increasing"));
                }
                recording.points.push(point);
            }
            Record::Event(event) => recording.events.push(event),
            Record::Footer(footer) => {
                if footer.points != recording.points.len() || footer.events != recording.events.len() {
                    warn!(
                        "Footer counts ({} points, {} events) differ from contents ({} points, {} events)",
                        footer.points,
                        footer.events,
                        recording.points.len(),
                        recording.events.len()
                    );
                }
                recording.footer = Some(footer);
            }
            Record::Unknown => debug!("Skipping unknown record {}", self.records),
        }
        self.records += 1;
        Ok(())
    }

    fn corrupt(&self, reason: impl Into<String>) -> RecordingError {
        RecordingError::Corrupt {
            index: self.records,
            salvageable: self.records,
            reason: reason.into(),
        }
    }

    fn into_recording(self) -> Result<Recording, RecordingError> {
        self.recording.ok_or(RecordingError::Empty)
    }
}
