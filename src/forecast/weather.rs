//! Current-weather lookup (Open-Meteo)
//!
//! The forecast path never fails on weather: any upstream problem yields the
//! documented fallback observation, tagged so callers can tell it apart.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{WeatherConfig, WeatherProvider};
use crate::domain::{region, WeatherObservation};

// Used when the upstream response omits a field
const MISSING_TEMPERATURE: f64 = 25.0;
const MISSING_HUMIDITY: f64 = 60.0;
const MISSING_WIND_SPEED: f64 = 10.0;
const MISSING_RAINFALL: f64 = 0.0;

/// Where an observation came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WeatherOrigin {
    Live,
    Static,
    Fallback { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub observation: WeatherObservation,
    /// "District, State"
    pub location: String,
    pub coordinates: Option<(f64, f64)>,
    pub last_updated: DateTime<FixedOffset>,
    pub origin: WeatherOrigin,
}

impl WeatherReport {
    pub fn new(
        state: &str,
        district: &str,
        observation: WeatherObservation,
        origin: WeatherOrigin,
    ) -> Self {
        Self {
            observation,
            location: format!("{}, {}", district, state),
            coordinates: region::coordinates(state, district),
            last_updated: Utc::now().fixed_offset(),
            origin,
        }
    }

    pub fn fallback(state: &str, district: &str, reason: impl Into<String>) -> Self {
        Self::new(
            state,
            district,
            WeatherObservation::fallback(),
            WeatherOrigin::Fallback {
                reason: reason.into(),
            },
        )
    }

    /// Replace the lookup time with the time the upstream observation was taken
    pub fn observed_at(mut self, timestamp: DateTime<FixedOffset>) -> Self {
        self.last_updated = timestamp;
        self
    }

    pub fn is_live(&self) -> bool {
        self.origin == WeatherOrigin::Live
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Current conditions for a roster location. Never fails; any problem
    /// yields the fallback observation.
    async fn current(&self, state: &str, district: &str) -> WeatherReport;
}

/// A successful upstream lookup
#[derive(Debug, Clone, PartialEq)]
pub struct LiveWeather {
    pub observation: WeatherObservation,
    /// Upstream observation time, when the response carried a parseable one
    pub observed_at: Option<DateTime<FixedOffset>>,
}

/// Open-Meteo forecast API client
pub struct OpenMeteoClient {
    client: ClientWithMiddleware,
    base_url: String,
    timezone: String,
}

impl OpenMeteoClient {
    pub fn new(cfg: &WeatherConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("Failed to build weather HTTP client")?;

        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(Duration::from_millis(100), Duration::from_secs(5))
            .build_with_max_retries(cfg.max_retries);
        let client = ClientBuilder::new(http)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            timezone: cfg.timezone.clone(),
        })
    }

    /// Fetch current conditions, surfacing upstream errors
    pub async fn fetch(&self, latitude: f64, longitude: f64) -> Result<LiveWeather> {
        let url = format!("{}/forecast", self.base_url);
        debug!(%url, latitude, longitude, "fetching current weather");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                (
                    "current",
                    "temperature_2m,relative_humidity_2m,wind_speed_10m,precipitation".to_string(),
                ),
                ("timezone", self.timezone.clone()),
            ])
            .send()
            .await
            .context("Failed to send request to weather API")?;

        if !response.status().is_success() {
            anyhow::bail!("weather API error: {}", response.status());
        }

        let body: OpenMeteoResponse = response
            .json()
            .await
            .context("Failed to parse weather response")?;

        Ok(body.into_live())
    }
}

#[async_trait]
impl WeatherSource for OpenMeteoClient {
    async fn current(&self, state: &str, district: &str) -> WeatherReport {
        let Some((latitude, longitude)) = region::coordinates(state, district) else {
            debug!(state, district, "no coordinates for location, using fallback weather");
            return WeatherReport::fallback(state, district, "unknown location");
        };

        match self.fetch(latitude, longitude).await {
            Ok(live) => {
                let report = WeatherReport::new(state, district, live.observation, WeatherOrigin::Live);
                match live.observed_at {
                    Some(ts) => report.observed_at(ts),
                    None => report,
                }
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                warn!(error = %reason, state, district, "weather lookup failed, using fallback");
                WeatherReport::fallback(state, district, reason)
            }
        }
    }
}

/// Fixed observation for offline runs and tests
pub struct StaticWeatherSource {
    observation: WeatherObservation,
}

impl StaticWeatherSource {
    pub fn new(observation: WeatherObservation) -> Self {
        Self { observation }
    }
}

impl Default for StaticWeatherSource {
    fn default() -> Self {
        Self::new(WeatherObservation::fallback())
    }
}

#[async_trait]
impl WeatherSource for StaticWeatherSource {
    async fn current(&self, state: &str, district: &str) -> WeatherReport {
        WeatherReport::new(state, district, self.observation, WeatherOrigin::Static)
    }
}

/// Build the configured weather source
pub fn from_config(cfg: &WeatherConfig) -> Result<Arc<dyn WeatherSource>> {
    Ok(match cfg.provider {
        WeatherProvider::OpenMeteo => Arc::new(OpenMeteoClient::new(cfg)?),
        WeatherProvider::Static => Arc::new(StaticWeatherSource::default()),
    })
}

#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    /// Offset of the requested timezone; `current.time` is local to it
    utc_offset_seconds: Option<i32>,
    current: OpenMeteoCurrent,
}

impl OpenMeteoResponse {
    fn into_live(self) -> LiveWeather {
        let observed_at = self
            .current
            .time
            .as_deref()
            .and_then(|t| parse_local_time(t, self.utc_offset_seconds.unwrap_or(0)));
        if observed_at.is_none() {
            debug!(time = ?self.current.time, "no usable observation time in weather response");
        }
        LiveWeather {
            observation: self.current.into_observation(),
            observed_at,
        }
    }
}

/// Open-Meteo reports ISO8601 local time without an offset, e.g. "2024-06-04T08:15"
fn parse_local_time(raw: &str, utc_offset_seconds: i32) -> Option<DateTime<FixedOffset>> {
    let offset = FixedOffset::east_opt(utc_offset_seconds)?;
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()?;
    naive.and_local_timezone(offset).single()
}

#[derive(Debug, Deserialize)]
struct OpenMeteoCurrent {
    time: Option<String>,
    temperature_2m: Option<f64>,
    relative_humidity_2m: Option<f64>,
    wind_speed_10m: Option<f64>,
    precipitation: Option<f64>,
}

impl OpenMeteoCurrent {
    fn into_observation(self) -> WeatherObservation {
        WeatherObservation {
            temperature: self.temperature_2m.unwrap_or(MISSING_TEMPERATURE),
            humidity: self.relative_humidity_2m.unwrap_or(MISSING_HUMIDITY),
            wind_speed: self.wind_speed_10m.unwrap_or(MISSING_WIND_SPEED),
            rainfall: self.precipitation.unwrap_or(MISSING_RAINFALL),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> WeatherConfig {
        WeatherConfig {
            provider: WeatherProvider::OpenMeteo,
            base_url: base_url.to_string(),
            timeout_secs: 2,
            max_retries: 0,
            timezone: "Asia/Kolkata".to_string(),
        }
    }

    #[tokio::test]
    async fn test_live_observation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forecast"))
            .and(query_param("timezone", "Asia/Kolkata"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "utc_offset_seconds": 19800,
                "current": {
                    "time": "2024-06-04T08:15",
                    "temperature_2m": 34.5,
                    "relative_humidity_2m": 48.0,
                    "wind_speed_10m": 7.2,
                    "precipitation": 0.4
                }
            })))
            .mount(&server)
            .await;

        let client = OpenMeteoClient::new(&config(&server.uri())).unwrap();
        let report = client.current("Delhi", "New Delhi").await;

        assert!(report.is_live());
        assert_eq!(report.location, "New Delhi, Delhi");
        assert!(report.coordinates.is_some());
        assert_eq!(report.observation, WeatherObservation::new(34.5, 48.0, 7.2, 0.4));

        let observed = FixedOffset::east_opt(19800)
            .unwrap()
            .with_ymd_and_hms(2024, 6, 4, 8, 15, 0)
            .unwrap();
        assert_eq!(report.last_updated, observed);
        assert_eq!(report.last_updated.offset().local_minus_utc(), 19800);
    }

    #[tokio::test]
    async fn test_missing_fields_use_defaults() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "current": { "temperature_2m": 30.0 }
            })))
            .mount(&server)
            .await;

        let before = Utc::now().fixed_offset();
        let client = OpenMeteoClient::new(&config(&server.uri())).unwrap();
        let report = client.current("Maharashtra", "Mumbai").await;

        assert_eq!(report.observation, WeatherObservation::new(30.0, 60.0, 10.0, 0.0));
        // no upstream time, so the lookup time is reported
        assert!(report.last_updated >= before);
    }

    #[test]
    fn test_parse_local_time() {
        let ist = FixedOffset::east_opt(19800).unwrap();
        assert_eq!(
            parse_local_time("2024-06-04T08:15", 19800),
            Some(ist.with_ymd_and_hms(2024, 6, 4, 8, 15, 0).unwrap())
        );
        assert_eq!(
            parse_local_time("2024-06-04T08:15:30", 0),
            Some(Utc.with_ymd_and_hms(2024, 6, 4, 8, 15, 30).unwrap().fixed_offset())
        );
        assert_eq!(parse_local_time("yesterday", 19800), None);
    }

    #[tokio::test]
    async fn test_upstream_error_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = OpenMeteoClient::new(&config(&server.uri())).unwrap();
        let report = client.current("Kerala", "Kochi").await;
        // no coordinates, so no request is made
        assert_eq!(report.observation, WeatherObservation::fallback());
        assert!(matches!(report.origin, WeatherOrigin::Fallback { .. }));

        let report = client.current("Delhi", "New Delhi").await;
        assert_eq!(report.observation, WeatherObservation::fallback());
        assert!(matches!(report.origin, WeatherOrigin::Fallback { .. }));
    }

    #[tokio::test]
    async fn test_malformed_body_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = OpenMeteoClient::new(&config(&server.uri())).unwrap();
        let report = client.current("Gujarat", "Surat").await;
        assert!(matches!(report.origin, WeatherOrigin::Fallback { .. }));
    }

    #[tokio::test]
    async fn test_static_source() {
        let weather = WeatherObservation::new(20.0, 40.0, 3.0, 1.0);
        let report = StaticWeatherSource::new(weather)
            .current("Punjab", "Amritsar")
            .await;
        assert_eq!(report.observation, weather);
        assert_eq!(report.origin, WeatherOrigin::Static);
    }
}
