//! Configuration file loading
//!
//! The optional TOML file mirrors the library settings:
//!
//! ```toml
//! recordings_dir = "recorded_sessions"
//!
//! [tracking]
//! poll_interval_ms = 4000
//! pit_stop_threshold_secs = 15.0
//!
//! [api]
//! base_url = "https://api.openf1.org/v1"
//! ```

use anyhow::{Context, Result};
use gaptrack_core::config::{ApiConfig, TrackingConfig};
use gaptrack_core::recording::DEFAULT_RECORDINGS_DIR;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Application configuration (loaded from a TOML file)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub tracking: TrackingConfig,
    pub api: ApiConfig,
    pub recordings_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tracking: TrackingConfig::default(),
            api: ApiConfig::default(),
            recordings_dir: PathBuf::from(DEFAULT_RECORDINGS_DIR),
        }
    }
}

/// Per-run overrides from the command line
#[derive(Debug, Clone, Default, clap::Args)]
pub struct TuningArgs {
    /// Polling cadence in milliseconds
    #[arg(long, value_name = "MS")]
    pub poll_interval_ms: Option<u64>,

    /// Gap step in seconds counted as a pit stop
    #[arg(long, value_name = "SECS")]
    pub pit_threshold: Option<f64>,

    /// Consecutive ticks needed for a gap trend
    #[arg(long, value_name = "TICKS")]
    pub trend_ticks: Option<usize>,

    /// Minimum closing rate (s/s) for a trend tick
    #[arg(long, value_name = "RATE")]
    pub trend_rate: Option<f64>,

    /// Sample age in milliseconds after which a driver is stale
    #[arg(long, value_name = "MS")]
    pub stale_after_ms: Option<u64>,

    /// Failed fetches in a row before giving up
    #[arg(long, value_name = "COUNT")]
    pub max_failures: Option<u32>,
}

impl TuningArgs {
    /// Apply the overrides on top of the file configuration
    pub fn apply(&self, mut config: TrackingConfig) -> Result<TrackingConfig> {
        if let Some(value) = self.poll_interval_ms {
            config.poll_interval_ms = value;
        }
        if let Some(value) = self.pit_threshold {
            config.pit_stop_threshold_secs = value;
        }
        if let Some(value) = self.trend_ticks {
            config.trend_min_ticks = value;
        }
        if let Some(value) = self.trend_rate {
            config.trend_min_rate = value;
        }
        if let Some(value) = self.stale_after_ms {
            config.stale_after_ms = value;
        }
        if let Some(value) = self.max_failures {
            config.max_consecutive_failures = value;
        }
        config.validate().context("Invalid tracking settings")?;
        Ok(config)
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config
        .tracking
        .validate()
        .with_context(|| format!("Invalid [tracking] settings in {:?}", path))?;
    Ok(config)
}

/// Load the given file, or the defaults when none was given
pub fn load_or_default(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => load_config(path),
        None => Ok(AppConfig::default()),
    }
}
