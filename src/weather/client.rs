//! Client for the Open-Meteo historical weather archive.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::fetch::HttpClient;
use crate::weather::error::WeatherError;
use crate::weather::limiter::RateLimiter;

pub const ARCHIVE_URL: &str = "https://archive-api.open-meteo.com/v1/archive";

/// Daily metrics requested for every (location, date) key.
const DAILY_METRICS: &str = "temperature_2m_max,temperature_2m_min,precipitation_sum,rain_sum,snowfall_sum,windspeed_10m_max";

const TIMEZONE: &str = "America/New_York";
const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_secs(2);

/// One day of archive weather for a location. Absent metrics stay `None`;
/// that is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyWeather {
    pub temp_max: Option<f64>,
    pub temp_min: Option<f64>,
    pub precipitation: Option<f64>,
    pub rain: Option<f64>,
    pub snow: Option<f64>,
    pub windspeed_max: Option<f64>,
}

impl DailyWeather {
    /// Field values in output-column order.
    pub fn values(&self) -> [Option<f64>; 6] {
        [
            self.temp_max,
            self.temp_min,
            self.precipitation,
            self.rain,
            self.snow,
            self.windspeed_max,
        ]
    }
}

#[derive(Debug, Default, Deserialize)]
struct ArchiveResponse {
    #[serde(default)]
    daily: DailyArrays,
}

/// The archive returns one array per metric; a single-day query yields
/// exactly one element each (possibly null).
#[derive(Debug, Default, Deserialize)]
struct DailyArrays {
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_sum: Vec<Option<f64>>,
    #[serde(default)]
    rain_sum: Vec<Option<f64>>,
    #[serde(default)]
    snowfall_sum: Vec<Option<f64>>,
    #[serde(default)]
    windspeed_10m_max: Vec<Option<f64>>,
}

impl DailyArrays {
    fn into_daily(self) -> DailyWeather {
        fn first(values: Vec<Option<f64>>) -> Option<f64> {
            values.into_iter().next().flatten()
        }

        DailyWeather {
            temp_max: first(self.temperature_2m_max),
            temp_min: first(self.temperature_2m_min),
            precipitation: first(self.precipitation_sum),
            rain: first(self.rain_sum),
            snow: first(self.snowfall_sum),
            windspeed_max: first(self.windspeed_10m_max),
        }
    }
}

/// Archive fetcher with retry and shared rate limiting.
pub struct ArchiveClient<C> {
    http: C,
    limiter: Arc<RateLimiter>,
}

impl<C: HttpClient> ArchiveClient<C> {
    pub fn new(http: C, limiter: Arc<RateLimiter>) -> Self {
        Self { http, limiter }
    }

    /// Fetches one day of weather for a location.
    ///
    /// 429s, timeouts, and connection errors are retried up to 3 total
    /// attempts with linear backoff; any other non-200 status fails the key
    /// immediately. Exhausted retries are downgraded to a permanent failure.
    pub async fn fetch_daily(
        &self,
        lat: f64,
        lon: f64,
        date: &str,
    ) -> Result<DailyWeather, WeatherError> {
        let url = format!(
            "{ARCHIVE_URL}?latitude={lat}&longitude={lon}&start_date={date}&end_date={date}&daily={DAILY_METRICS}&timezone={TIMEZONE}"
        );

        let mut last_reason = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            self.limiter.acquire().await;

            match self.attempt(&url).await {
                Ok(weather) => return Ok(weather),
                Err(WeatherError::Transient(reason)) => {
                    warn!(attempt, lat, lon, date, reason, "transient fetch failure");
                    last_reason = reason;
                }
                Err(e) => return Err(e),
            }

            if attempt < MAX_ATTEMPTS {
                tokio::time::sleep(RETRY_BASE_DELAY * attempt).await;
            }
        }

        Err(WeatherError::Permanent(format!(
            "gave up after {MAX_ATTEMPTS} attempts: {last_reason}"
        )))
    }

    async fn attempt(&self, url: &str) -> Result<DailyWeather, WeatherError> {
        let parsed = url
            .parse()
            .map_err(|e| WeatherError::Permanent(format!("invalid archive URL: {e}")))?;
        let req = reqwest::Request::new(reqwest::Method::GET, parsed);

        match self.http.execute(req).await {
            Ok(resp) if resp.status() == StatusCode::OK => {
                let body: ArchiveResponse = resp
                    .json()
                    .await
                    .map_err(|e| WeatherError::Permanent(format!("bad archive body: {e}")))?;
                Ok(body.daily.into_daily())
            }
            Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => Err(
                WeatherError::Transient("archive API rate limited (429)".to_string()),
            ),
            Ok(resp) => Err(WeatherError::Permanent(format!(
                "archive API returned status {}",
                resp.status()
            ))),
            Err(e) if e.is_timeout() || e.is_connect() => {
                Err(WeatherError::Transient(e.to_string()))
            }
            Err(e) => Err(WeatherError::Permanent(e.to_string())),
        }
    }
}
