//! Tracking errors

use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors from a sample source or the upstream timing API.
///
/// These are transient from the controller's point of view: a failed pull
/// is reported and retried on the next cycle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Upstream returned HTTP {status} for '{endpoint}'")]
    Status { endpoint: String, status: u16 },

    #[error("Failed to parse upstream response: {0}")]
    Parse(String),
}

/// Errors reading or writing a session recording
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Recording is empty")]
    Empty,

    #[error("Record {index} is corrupt ({reason}); {salvageable} records before it are readable")]
    Corrupt {
        index: usize,
        salvageable: usize,
        reason: String,
    },

    #[error("Recording already finished")]
    Finished,
}

/// Errors that end a start request or a tracking session
#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("No active session upstream")]
    NoActiveSession,

    #[error("Session {0} not found upstream")]
    SessionNotFound(u32),

    #[error("Invalid driver pair: {0}")]
    InvalidDriverPair(String),

    #[error("Recording error: {0}")]
    Recording(#[from] RecordingError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}
