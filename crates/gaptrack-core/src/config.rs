//! Tracking configuration
//!
//! All thresholds are heuristics tuned against real race data; every field
//! has a default and can be overridden per session start.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default polling cadence in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 4000;

/// Default timeout for a single source pull in milliseconds
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;

/// Default OpenF1 API base URL
pub const DEFAULT_API_URL: &str = "https://api.openf1.org/v1";

/// Configuration validation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("{field} must be a finite number, got {value}")]
    NotFinite { field: &'static str, value: f64 },
}

/// Per-session tracking configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Controller polling cadence (one normalizer tick per poll)
    pub poll_interval_ms: u64,
    /// Timeout for one source pull
    pub fetch_timeout_ms: u64,
    /// Gap step (seconds) treated as a pit stop or anomaly
    pub pit_stop_threshold_secs: f64,
    /// Maximum number of ticks a step may span
    pub pit_window_ticks: usize,
    /// Consecutive ticks needed for a gap opening/closing event
    pub trend_min_ticks: usize,
    /// Minimum |closing rate| (seconds per second) counted towards a trend
    pub trend_min_rate: f64,
    /// Sample age after which a driver is considered out of the feed
    pub stale_after_ms: u64,
    /// Failed pulls in a row before tracking stops
    pub max_consecutive_failures: u32,
    /// Replay speed factor (1.0 = real time)
    pub replay_speed: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            pit_stop_threshold_secs: 15.0,
            pit_window_ticks: 2,
            trend_min_ticks: 5,
            trend_min_rate: 0.05,
            stale_after_ms: 10_000,
            max_consecutive_failures: 3,
            replay_speed: 1.0,
        }
    }
}

impl TrackingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }

    /// Check that every value is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        let counts = [
            ("poll_interval_ms", self.poll_interval_ms),
            ("fetch_timeout_ms", self.fetch_timeout_ms),
            ("pit_window_ticks", self.pit_window_ticks as u64),
            ("trend_min_ticks", self.trend_min_ticks as u64),
            ("max_consecutive_failures", self.max_consecutive_failures as u64),
        ];
        for (field, value) in counts {
            if value == 0 {
                return Err(ConfigError::NotPositive { field });
            }
        }

        let reals = [
            ("pit_stop_threshold_secs", self.pit_stop_threshold_secs),
            ("trend_min_rate", self.trend_min_rate),
            ("replay_speed", self.replay_speed),
        ];
        for (field, value) in reals {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite { field, value });
            }
            if value <= 0.0 {
                return Err(ConfigError::NotPositive { field });
            }
        }
        Ok(())
    }
}

/// Upstream timing API settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// HTTP request timeout
    pub timeout_ms: u64,
    /// Attempts per request before giving up
    pub retry_attempts: u32,
    /// Delay before the first retry; doubled for each further attempt
    pub retry_backoff_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            timeout_ms: 30_000,
            retry_attempts: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Backoff before retry number `attempt` (0-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(1u64 << attempt.min(16)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(TrackingConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: TrackingConfig =
            serde_json::from_str(r#"{ "pit_stop_threshold_secs": 18.5 }"#).unwrap();
        assert_eq!(config.pit_stop_threshold_secs, 18.5);
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let config = TrackingConfig {
            replay_speed: 0.0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::NotPositive {
                field: "replay_speed"
            })
        );

        let config = TrackingConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TrackingConfig {
            trend_min_rate: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotFinite { field: "trend_min_rate", .. })
        ));
    }

    #[test]
    fn test_backoff_doubles() {
        let api = ApiConfig::default();
        assert_eq!(api.backoff(0), Duration::from_millis(500));
        assert_eq!(api.backoff(2), Duration::from_millis(2000));
    }
}
