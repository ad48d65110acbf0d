//! Session recorder
//!
//! Streams a tracked session to disk. Every record is flushed as it is
//! written, so a crash loses at most the line being written.

use chrono::Utc;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::format::{write_record, Record, RecordingFooter, RecordingHeader};
use crate::error::RecordingError;
use crate::types::{Event, IntervalPoint, SampleBatch};

/// Streaming recording writer
pub struct SessionRecorder {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    points: usize,
    events: usize,
    batches: usize,
}

impl SessionRecorder {
    /// Create the file (and parent directories) and write the header
    pub fn create<P: AsRef<Path>>(path: P, header: &RecordingHeader) -> Result<Self, RecordingError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = File::create(&path)?;
        let mut recorder = Self {
            path,
            writer: Some(BufWriter::new(file)),
            points: 0,
            events: 0,
            batches: 0,
        };
        recorder.write(&Record::Header(header.clone()))?;
        info!("Recording session {} to {}", header.session_id, recorder.path.display());
        Ok(recorder)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of points written so far
    pub fn point_count(&self) -> usize {
        self.points
    }

    /// Number of events written so far
    pub fn event_count(&self) -> usize {
        self.events
    }

    pub fn is_finished(&self) -> bool {
        self.writer.is_none()
    }

    pub fn record_batch(&mut self, batch: &SampleBatch) -> Result<(), RecordingError> {
        self.write(&Record::Batch(batch.clone()))?;
        self.batches += 1;
        Ok(())
    }

    pub fn record_point(&mut self, point: &IntervalPoint) -> Result<(), RecordingError> {
        self.write(&Record::Point(point.clone()))?;
        self.points += 1;
        Ok(())
    }

    pub fn record_event(&mut self, event: &Event) -> Result<(), RecordingError> {
        self.write(&Record::Event(event.clone()))?;
        self.events += 1;
        Ok(())
    }

    /// Write the footer and close the file
    pub fn finish(&mut self) -> Result<PathBuf, RecordingError> {
        let footer = RecordingFooter {
            points: self.points,
            events: self.events,
            finished_at: Utc::now(),
        };
        self.write(&Record::Footer(footer))?;

        if let Some(writer) = self.writer.take() {
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }
        info!(
            "Finished recording {} ({} batches, {} points, {} events)",
            self.path.display(),
            self.batches,
            self.points,
            self.events
        );
        Ok(self.path.clone())
    }

    fn write(&mut self, record: &Record) -> Result<(), RecordingError> {
        let writer = self.writer.as_mut().ok_or(RecordingError::Finished)?;
        write_record(writer, record)?;
        writer.flush()?;
        Ok(())
    }
}

impl Drop for SessionRecorder {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            debug!("Recorder for {} dropped without finishing", self.path.display());
            let _ = writer.flush();
        }
    }
}
