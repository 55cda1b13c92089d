/// Open-Meteo forecast API client.
///
/// Handles URL construction, response parsing and the blocking HTTP call for
/// the daily precipitation series served by:
///   https://api.open-meteo.com/v1/forecast
///
/// One request returns `past_days` of observed precipitation followed by
/// `forecast_days` of forecast, oldest first:
///
///   daily.time[]               : "YYYY-MM-DD"
///   daily.precipitation_sum[]  : mm, `null` when the model has no value
///
/// See `fixtures.rs` for annotated examples. Response validation and caching
/// are pluggable and both default to off.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::{debug, warn};
use serde::Deserialize;

use crate::model::GeoPoint;

pub const OPEN_METEO_BASE_URL: &str = "https://api.open-meteo.com/v1/forecast";
pub const DEFAULT_TIMEZONE: &str = "Europe/Rome";
pub const USER_AGENT: &str = "Georisk-Sentinel/1.0";

/// Hard ceiling on a single request; slow upstreams fall back instead.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(10);

/// Default lifetime of cached responses.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("coordinates out of range: {0}")]
    InvalidCoordinates(GeoPoint),

    #[error("HTTP transport error: {0}")]
    Transport(String),

    #[error("weather API returned HTTP {0}")]
    HttpStatus(u16),

    #[error("malformed weather response: {0}")]
    MalformedResponse(String),

    #[error("weather provider is offline")]
    Offline,
}

impl From<reqwest::Error> for WeatherError {
    fn from(e: reqwest::Error) -> Self {
        WeatherError::Transport(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Provider seam
// ---------------------------------------------------------------------------

/// Source of daily precipitation totals for a point.
///
/// Returns `past_days + forecast_days` entries (oldest first) on success;
/// `None` entries are days the upstream could not fill.
pub trait PrecipitationProvider: Send + Sync {
    fn daily_precipitation(
        &self,
        point: GeoPoint,
        past_days: u32,
        forecast_days: u32,
    ) -> Result<Vec<Option<f64>>, WeatherError>;
}

/// Provider that never answers. Used for `--offline` runs and tests so every
/// point takes the weather fallback without touching the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineProvider;

impl PrecipitationProvider for OfflineProvider {
    fn daily_precipitation(
        &self,
        _point: GeoPoint,
        _past_days: u32,
        _forecast_days: u32,
    ) -> Result<Vec<Option<f64>>, WeatherError> {
        Err(WeatherError::Offline)
    }
}

// ---------------------------------------------------------------------------
// Response validation
// ---------------------------------------------------------------------------

/// Structural check applied to a decoded response before it is used.
pub trait ResponseValidator: Send + Sync {
    fn validate(&self, body: &serde_json::Value) -> Result<(), WeatherError>;
}

/// Accepts anything that decodes as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoValidation;

impl ResponseValidator for NoValidation {
    fn validate(&self, _body: &serde_json::Value) -> Result<(), WeatherError> {
        Ok(())
    }
}

/// Requires numeric `latitude`/`longitude`, and `daily.time` and
/// `daily.precipitation_sum` arrays of equal length with every precipitation
/// entry a number or `null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DailySchemaValidator;

impl ResponseValidator for DailySchemaValidator {
    fn validate(&self, body: &serde_json::Value) -> Result<(), WeatherError> {
        for key in ["latitude", "longitude"] {
            if !body.get(key).is_some_and(|v| v.is_number()) {
                return Err(WeatherError::MalformedResponse(format!("missing numeric '{}'", key)));
            }
        }
        let daily = body
            .get("daily")
            .ok_or_else(|| WeatherError::MalformedResponse("missing 'daily'".to_string()))?;
        let times = daily
            .get("time")
            .and_then(|v| v.as_array())
            .ok_or_else(|| WeatherError::MalformedResponse("'daily.time' is not an array".to_string()))?;
        let precip = daily
            .get("precipitation_sum")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                WeatherError::MalformedResponse("'daily.precipitation_sum' is not an array".to_string())
            })?;

        if times.len() != precip.len() {
            return Err(WeatherError::MalformedResponse(format!(
                "{} dates but {} precipitation values",
                times.len(),
                precip.len()
            )));
        }
        if let Some(bad) = precip.iter().find(|v| !(v.is_number() || v.is_null())) {
            return Err(WeatherError::MalformedResponse(format!(
                "non-numeric precipitation value {}",
                bad
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Response caching
// ---------------------------------------------------------------------------

/// Cache of raw response bodies keyed by request URL.
pub trait ResponseCache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&self, key: &str, body: &str);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl ResponseCache for NoCache {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }

    fn put(&self, _key: &str, _body: &str) {}
}

/// In-process cache with a fixed time-to-live.
#[derive(Debug)]
pub struct MemoryCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, String)>>,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResponseCache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().ok()?;
        if let Some((stored_at, body)) = entries.get(key) {
            if stored_at.elapsed() < self.ttl {
                return Some(body.clone());
            }
            entries.remove(key);
        }
        None
    }

    fn put(&self, key: &str, body: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            let ttl = self.ttl;
            entries.retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
            entries.insert(key.to_string(), (Instant::now(), body.to_string()));
        }
    }
}

// ---------------------------------------------------------------------------
// Serde structures
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ForecastResponse {
    daily: DailyBlock,
}

#[derive(Deserialize)]
struct DailyBlock {
    #[allow(dead_code)]
    time: Vec<String>,
    precipitation_sum: Vec<Option<f64>>,
}

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

/// Builds a forecast URL requesting daily precipitation sums for `point`.
pub fn build_forecast_url(
    base_url: &str,
    point: GeoPoint,
    past_days: u32,
    forecast_days: u32,
    timezone: &str,
) -> String {
    format!(
        "{}?latitude={}&longitude={}&daily=precipitation_sum&past_days={}&forecast_days={}&timezone={}",
        base_url,
        point.latitude,
        point.longitude,
        past_days,
        forecast_days,
        urlencoding::encode(timezone)
    )
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Parses a forecast response body into the daily precipitation series.
///
/// # Errors
/// - `WeatherError::MalformedResponse` on invalid JSON, missing keys, or a
///   validator rejection.
pub fn parse_daily_precipitation(
    json: &str,
    validator: &dyn ResponseValidator,
) -> Result<Vec<Option<f64>>, WeatherError> {
    let body: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| WeatherError::MalformedResponse(format!("JSON decoding failed: {}", e)))?;
    validator.validate(&body)?;

    let response: ForecastResponse = serde_json::from_value(body)
        .map_err(|e| WeatherError::MalformedResponse(format!("unexpected structure: {}", e)))?;
    Ok(response.daily.precipitation_sum)
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// Blocking Open-Meteo client. One attempt per request, no retry.
pub struct OpenMeteoClient {
    http: reqwest::blocking::Client,
    base_url: String,
    timezone: String,
    validator: Box<dyn ResponseValidator>,
    cache: Box<dyn ResponseCache>,
}

impl OpenMeteoClient {
    /// Creates a client with the given timeout (capped at `MAX_TIMEOUT`),
    /// no validation and no caching.
    pub fn new(timeout: Duration) -> Result<Self, WeatherError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout.min(MAX_TIMEOUT))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            base_url: OPEN_METEO_BASE_URL.to_string(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            validator: Box::new(NoValidation),
            cache: Box::new(NoCache),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    pub fn with_timezone(mut self, timezone: &str) -> Self {
        self.timezone = timezone.to_string();
        self
    }

    pub fn with_validator(mut self, validator: Box<dyn ResponseValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_cache(mut self, cache: Box<dyn ResponseCache>) -> Self {
        self.cache = cache;
        self
    }

    fn fetch(&self, url: &str) -> Result<String, WeatherError> {
        let response = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .send()?;

        if !response.status().is_success() {
            return Err(WeatherError::HttpStatus(response.status().as_u16()));
        }
        Ok(response.text()?)
    }
}

impl PrecipitationProvider for OpenMeteoClient {
    fn daily_precipitation(
        &self,
        point: GeoPoint,
        past_days: u32,
        forecast_days: u32,
    ) -> Result<Vec<Option<f64>>, WeatherError> {
        if !point.is_valid() {
            return Err(WeatherError::InvalidCoordinates(point));
        }
        let url = build_forecast_url(&self.base_url, point, past_days, forecast_days, &self.timezone);

        if let Some(body) = self.cache.get(&url) {
            match parse_daily_precipitation(&body, self.validator.as_ref()) {
                Ok(series) => {
                    debug!("Weather cache hit for {}", point);
                    return Ok(series);
                }
                Err(e) => warn!("Discarding unusable cached weather response: {}", e),
            }
        }

        let body = self.fetch(&url)?;
        let series = parse_daily_precipitation(&body, self.validator.as_ref())?;
        self.cache.put(&url, &body);
        Ok(series)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
