//! OpenF1 timing API client
//!
//! Implements [`TimingApi`] over the public OpenF1 REST API
//! (<https://openf1.org>). Interval records carry each driver's gap to the
//! race leader; those become [`DriverSample`]s with session-relative
//! timestamps.
//!
//! ## Usage
//!
//! ```ignore
//! let api = OpenF1Client::new(ApiConfig::default())?;
//! if let Some(session) = api.get_active_session().await? {
//!     let roster = api.get_drivers(session.session_key).await?;
//!     let samples = api.get_samples(&session, None).await?;
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{SessionFilter, TimingApi};
use crate::config::ApiConfig;
use crate::error::SourceError;
use crate::session::{DriverEntry, Roster, SessionInfo};
use crate::types::{DriverId, DriverSample};

/// Sessions returned when no limit is given
const DEFAULT_SESSION_LIMIT: usize = 20;

/// Driver record from `/drivers`
#[derive(Debug, Deserialize)]
struct ApiDriver {
    driver_number: u32,
    #[serde(default)]
    name_acronym: Option<String>,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    team_name: Option<String>,
}

/// Interval record from `/intervals`
#[derive(Debug, Deserialize)]
struct ApiInterval {
    date: DateTime<Utc>,
    driver_number: u32,
    /// Seconds, a string such as "+1 LAP", or null
    #[serde(default)]
    gap_to_leader: Option<serde_json::Value>,
    #[serde(default)]
    interval: Option<serde_json::Value>,
}

impl ApiInterval {
    /// Numeric gap to the leader; the leader itself reports no gap at all
    fn gap_seconds(&self) -> Option<f64> {
        match (&self.gap_to_leader, &self.interval) {
            (Some(value), _) if !value.is_null() => numeric(value),
            (_, None) => Some(0.0),
            (_, Some(interval)) if interval.is_null() => Some(0.0),
            _ => None,
        }
    }
}

fn numeric(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().trim_start_matches('+').parse().ok(),
        _ => None,
    }
}

/// Convert interval records to samples relative to the session start.
///
/// Records without a numeric gap (lapped cars report "+1 LAP") are skipped.
fn samples_from_intervals(session: &SessionInfo, records: Vec<ApiInterval>) -> Vec<DriverSample> {
    let mut samples: Vec<DriverSample> = records
        .into_iter()
        .filter_map(|record| {
            let Some(gap) = record.gap_seconds() else {
                debug!(
                    "Skipping non-numeric gap for #{}: {:?}",
                    record.driver_number, record.gap_to_leader
                );
                return None;
            };
            Some(DriverSample::new(
                DriverId(record.driver_number),
                session.offset_of(record.date),
                gap,
            ))
        })
        .collect();
    samples.sort_by_key(|s| s.timestamp);
    samples
}

/// OpenF1 REST client
pub struct OpenF1Client {
    client: reqwest::Client,
    config: ApiConfig,
}

impl OpenF1Client {
    /// Build a client with the configured timeout and user agent
    pub fn new(config: ApiConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("gaptrack/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout())
            .build()
            .map_err(|e| SourceError::Network(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self { client, config })
    }

    /// GET an endpoint, retrying transient failures with exponential backoff
    async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T, SourceError> {
        let attempts = self.config.retry_attempts.max(1);
        let mut attempt = 0;
        loop {
            match self.request_once(endpoint, params).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt + 1 < attempts && is_transient(&e) => {
                    warn!(
                        "Request to '{}' failed (attempt {}/{}): {}",
                        endpoint,
                        attempt + 1,
                        attempts,
                        e
                    );
                    tokio::time::sleep(self.config.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn request_once<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T, SourceError> {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        response.json::<T>().await.map_err(|e| {
            if e.is_decode() {
                SourceError::Parse(e.to_string())
            } else {
                self.transport_error(e)
            }
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> SourceError {
        if e.is_timeout() {
            SourceError::Timeout(self.config.timeout())
        } else {
            SourceError::Network(e.to_string())
        }
    }
}

fn is_transient(error: &SourceError) -> bool {
    match error {
        SourceError::Timeout(_) | SourceError::Network(_) => true,
        SourceError::Status { status, .. } => *status >= 500 || *status == 429,
        SourceError::Parse(_) => false,
    }
}

#[async_trait]
impl TimingApi for OpenF1Client {
    async fn get_active_session(&self) -> Result<Option<SessionInfo>, SourceError> {
        let sessions: Vec<SessionInfo> = self
            .request("sessions", &[("session_key", "latest".to_string())])
            .await?;
        let now = Utc::now();
        Ok(sessions.into_iter().find(|s| s.is_running(now)))
    }

    async fn get_session(&self, session_key: u32) -> Result<Option<SessionInfo>, SourceError> {
        let sessions: Vec<SessionInfo> = self
            .request("sessions", &[("session_key", session_key.to_string())])
            .await?;
        Ok(sessions.into_iter().next())
    }

    async fn list_historical_sessions(
        &self,
        filter: &SessionFilter,
    ) -> Result<Vec<SessionInfo>, SourceError> {
        let years = match filter.year {
            Some(year) => vec![year],
            None => {
                let current = Utc::now().year();
                vec![current, current - 1]
            }
        };

        let mut sessions = Vec::new();
        for year in years {
            let mut params = vec![("year", year.to_string())];
            if let Some(session_type) = &filter.session_type {
                params.push(("session_type", session_type.clone()));
            }
            let batch: Vec<SessionInfo> = self.request("sessions", &params).await?;
            sessions.extend(batch);
        }

        sessions.sort_by(|a, b| b.date_start.cmp(&a.date_start));
        sessions.truncate(filter.limit.unwrap_or(DEFAULT_SESSION_LIMIT));
        Ok(sessions)
    }

    async fn get_drivers(&self, session_key: u32) -> Result<Roster, SourceError> {
        let drivers: Vec<ApiDriver> = self
            .request("drivers", &[("session_key", session_key.to_string())])
            .await?;
        Ok(Roster::new(
            drivers
                .into_iter()
                .map(|d| DriverEntry {
                    number: DriverId(d.driver_number),
                    acronym: d
                        .name_acronym
                        .unwrap_or_else(|| d.driver_number.to_string()),
                    full_name: d.full_name,
                    team_name: d.team_name,
                })
                .collect(),
        ))
    }

    async fn get_samples(
        &self,
        session: &SessionInfo,
        since: Option<Duration>,
    ) -> Result<Vec<DriverSample>, SourceError> {
        let mut params = vec![("session_key", session.session_key.to_string())];
        if let Some(since) = since {
            let after = session
                .absolute(since)
                .to_rfc3339_opts(SecondsFormat::Millis, true);
            params.push(("date>", after));
        }
        let records: Vec<ApiInterval> = self.request("intervals", &params).await?;
        Ok(samples_from_intervals(session, records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SessionInfo {
        SessionInfo {
            session_key: 9158,
            session_name: "Race".into(),
            session_type: Some("Race".into()),
            date_start: "2023-09-17T12:00:00Z".parse().unwrap(),
            date_end: None,
            location: None,
            country_name: None,
            year: Some(2023),
        }
    }

    #[test]
    fn test_interval_records_to_samples() {
        let json = r#"[
            {"date": "2023-09-17T12:00:08.000000+00:00", "driver_number": 16, "gap_to_leader": 3.25, "interval": 1.1, "session_key": 9158},
            {"date": "2023-09-17T12:00:04.500000+00:00", "driver_number": 1, "gap_to_leader": null, "interval": null},
            {"date": "2023-09-17T12:00:05+00:00", "driver_number": 2, "gap_to_leader": "+1 LAP", "interval": "+1 LAP"},
            {"date": "2023-09-17T12:00:06+00:00", "driver_number": 44, "gap_to_leader": "+12.5", "interval": 0.4}
        ]"#;
        let records: Vec<ApiInterval> = serde_json::from_str(json).unwrap();
        let samples = samples_from_intervals(&session(), records);

        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].driver, DriverId(1));
        assert_eq!(samples[0].timestamp, Duration::from_millis(4500));
        assert_eq!(samples[0].gap_to_leader, 0.0);
        assert_eq!(samples[1].gap_to_leader, 12.5);
        assert_eq!(samples[2].driver, DriverId(16));
        assert_eq!(samples[2].gap_to_leader, 3.25);
    }

    #[test]
    fn test_session_records_parse() {
        let json = r#"[{
            "session_key": 9158, "session_name": "Race", "session_type": "Race",
            "date_start": "2023-09-17T12:00:00+00:00", "date_end": "2023-09-17T14:00:00+00:00",
            "location": "Marina Bay", "country_name": "Singapore", "year": 2023,
            "meeting_key": 1219, "circuit_short_name": "Singapore"
        }]"#;
        let sessions: Vec<SessionInfo> = serde_json::from_str(json).unwrap();
        assert_eq!(sessions[0].session_key, 9158);
        assert_eq!(sessions[0].location.as_deref(), Some("Marina Bay"));
    }

    #[test]
    fn test_client_builds_from_config() {
        let config = ApiConfig {
            timeout_ms: 1_500,
            ..ApiConfig::default()
        };
        let client = OpenF1Client::new(config).unwrap();
        assert_eq!(client.config.timeout(), Duration::from_millis(1_500));
    }

    #[test]
    fn test_transient_errors() {
        assert!(is_transient(&SourceError::Network("reset".into())));
        assert!(is_transient(&SourceError::Status {
            endpoint: "intervals".into(),
            status: 503
        }));
        assert!(!is_transient(&SourceError::Status {
            endpoint: "intervals".into(),
            status: 404
        }));
        assert!(!is_transient(&SourceError::Parse("eof".into())));
    }
}
