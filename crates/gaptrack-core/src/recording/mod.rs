//! Session recording
//!
//! Records tracked sessions to disk as they happen and loads them back for
//! replay through the same pipeline.

mod format;
mod player;
mod recorder;

pub use format::{
    is_recording_path, write_record, Record, RecordingFooter, RecordingHeader, FORMAT_VERSION,
    RECORDING_EXTENSION,
};
pub use recorder::SessionRecorder;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::TrackingConfig;
use crate::pipeline::TrackingPipeline;
use crate::types::{Event, IntervalPoint, SampleBatch};

/// Default directory for recordings
pub const DEFAULT_RECORDINGS_DIR: &str = "recorded_sessions";

/// A loaded recording
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub header: RecordingHeader,
    /// Raw sample batches, one per tick, in arrival order
    pub batches: Vec<SampleBatch>,
    pub points: Vec<IntervalPoint>,
    pub events: Vec<Event>,
    /// Present only if the recording was finished cleanly
    pub footer: Option<RecordingFooter>,
}

impl Recording {
    pub fn new(header: RecordingHeader) -> Self {
        Self {
            header,
            batches: Vec::new(),
            points: Vec::new(),
            events: Vec::new(),
            footer: None,
        }
    }

    /// Whether the recording was finished cleanly
    pub fn is_complete(&self) -> bool {
        self.footer.is_some()
    }

    /// Session time spanned by the recorded points
    pub fn duration(&self) -> std::time::Duration {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => std::time::Duration::ZERO,
        }
    }

    /// Re-run the recorded batches through a fresh pipeline
    pub fn reprocess(&self, config: &TrackingConfig) -> (Vec<IntervalPoint>, Vec<Event>) {
        TrackingPipeline::run(self.header.driver_pair, config, &self.batches)
    }
}

/// Path of a named recording inside a directory
pub fn recording_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.{}", name, RECORDING_EXTENSION))
}

/// Names of the recordings in a directory, sorted
pub fn list_recordings(dir: &Path) -> io::Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut names = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && is_recording_path(&path) {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}
