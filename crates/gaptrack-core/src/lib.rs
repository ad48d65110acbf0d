//! # Gaptrack Core Library
//!
//! Interval tracking and event detection for a pair of drivers.
//!
//! This library provides:
//! - Sample sources for the live timing feed, finished sessions and
//!   recordings (plus an offline demo feed)
//! - Interval normalization (last observation carried forward)
//! - Detection of pit stops, anomalies and sustained gap trends
//! - Streaming session recording and replay
//! - A timer-driven session controller with snapshot reads
//!
//! ## Example
//!
//! ```rust,ignore
//! use gaptrack_core::prelude::*;
//!
//! let mut controller = TrackingController::new();
//! let request = StartRequest::new(DriverId(1), DriverId(16), Box::new(DemoSource::new(7)));
//! controller.start(request).await?;
//!
//! let snapshot = controller.snapshot();
//! if let Some(point) = snapshot.latest_point() {
//!     println!("gap {:.3}s", point.gap_seconds);
//! }
//! ```

pub mod config;
pub mod controller;
pub mod detector;
pub mod error;
pub mod normalizer;
pub mod pipeline;
pub mod recording;
pub mod session;
pub mod source;
pub mod types;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{ApiConfig, TrackingConfig};
    pub use crate::controller::{
        FetchStatus, StartRequest, StopCause, TrackingController, TrackingPhase, TrackingSnapshot,
    };
    pub use crate::detector::{DetectorConfig, EventDetector};
    pub use crate::error::{RecordingError, SourceError, TrackingError};
    pub use crate::normalizer::IntervalNormalizer;
    pub use crate::pipeline::TrackingPipeline;
    pub use crate::recording::{Recording, SessionRecorder};
    pub use crate::session::{Roster, Session, SessionInfo, SessionMode, Trend};
    pub use crate::source::{
        DemoSource, HistoricalSource, LiveSource, OpenF1Client, ReplaySource, SampleSource,
        TimingApi,
    };
    pub use crate::types::{DriverId, DriverPair, DriverSample, Event, EventKind, IntervalPoint, SampleBatch};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
