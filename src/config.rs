/// Service configuration loader: parses georisk.toml.
///
/// Keeps paths, feature-extraction settings, model hyperparameters, the
/// prediction grid, alert breakpoints/colors and the reference localities out
/// of code. Every key has a default, so a partial (or empty) file is valid.
///
/// The file path comes from `--config`, then `GEORISK_CONFIG`, then
/// `georisk.toml` in the working directory.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::alert::{AlertThresholds, AlertTier};
use crate::enrich::ColorMap;
use crate::ingest::open_meteo::{MAX_TIMEOUT, OPEN_METEO_BASE_URL};
use crate::model::{ReferenceLocality, StudyArea};
use crate::risk_model::{Hyperparameters, TrainingOptions};
use crate::training::NegativeSampling;

pub const DEFAULT_CONFIG_PATH: &str = "georisk.toml";
pub const CONFIG_ENV_VAR: &str = "GEORISK_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// GeoTIFF DEM; terrain uses latitude fallbacks when absent.
    pub dem: Option<PathBuf>,
    /// JSON event feed; the built-in demonstration inventory is used when absent.
    pub events: Option<PathBuf>,
    pub model_artifact: PathBuf,
    pub predictions_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            dem: None,
            events: None,
            model_artifact: PathBuf::from("models/georisk_model.json"),
            predictions_dir: PathBuf::from("data/predictions"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    pub terrain_buffer_radius_m: f64,
    pub weather_past_days: u32,
    pub weather_forecast_days: u32,
    /// Capped at 10 seconds.
    pub weather_timeout_secs: u64,
    pub weather_base_url: String,
    pub timezone: String,
    /// 0 disables the response cache.
    pub weather_cache_ttl_secs: u64,
    pub validate_weather_responses: bool,
    pub workers: usize,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            terrain_buffer_radius_m: 500.0,
            weather_past_days: 7,
            weather_forecast_days: 3,
            weather_timeout_secs: 10,
            weather_base_url: OPEN_METEO_BASE_URL.to_string(),
            timezone: "Europe/Rome".to_string(),
            weather_cache_ttl_secs: 3600,
            validate_weather_responses: true,
            workers: 4,
        }
    }
}

impl FeaturesConfig {
    pub fn weather_timeout(&self) -> Duration {
        Duration::from_secs(self.weather_timeout_secs).min(MAX_TIMEOUT)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub test_size: f64,
    pub random_state: u64,
    pub n_estimators: usize,
    pub max_depth: u32,
    pub learning_rate: f64,
    pub negative_ratio: f64,
    pub negative_max_age_days: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            random_state: 42,
            n_estimators: 100,
            max_depth: 5,
            learning_rate: 0.1,
            negative_ratio: 1.0,
            negative_max_age_days: 3650,
        }
    }
}

impl ModelConfig {
    pub fn training_options(&self) -> TrainingOptions {
        TrainingOptions {
            test_fraction: self.test_size,
            random_seed: self.random_state,
            hyperparameters: Hyperparameters {
                n_estimators: self.n_estimators,
                max_depth: self.max_depth,
                learning_rate: self.learning_rate,
                ..Hyperparameters::default()
            },
        }
    }

    /// Negatives are seeded from `random_state` so reruns draw the same set.
    pub fn negative_sampling(&self) -> NegativeSampling {
        NegativeSampling {
            ratio: self.negative_ratio,
            max_age_days: self.negative_max_age_days,
            seed: Some(self.random_state),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    pub grid_resolution_deg: f64,
    /// Grid points scoring below this are dropped before classification.
    pub min_risk_score_threshold: f64,
    pub bounds: StudyArea,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            grid_resolution_deg: 0.1,
            min_risk_score_threshold: 0.0,
            bounds: StudyArea::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub yellow: f64,
    pub orange: f64,
    pub red: f64,
    /// Tier name (case-insensitive) → hex color.
    pub colors: HashMap<String, String>,
    pub default_color: String,
}

impl Default for AlertConfig {
    fn default() -> Self {
        let colors = [
            ("RED", "#ff4757"),
            ("ORANGE", "#ff9f43"),
            ("YELLOW", "#ffd32c"),
            ("GREEN", "#26de81"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self {
            yellow: 30.0,
            orange: 50.0,
            red: 70.0,
            colors,
            default_color: "#26de81".to_string(),
        }
    }
}

impl AlertConfig {
    pub fn thresholds(&self) -> Result<AlertThresholds, ConfigError> {
        AlertThresholds::new(self.yellow, self.orange, self.red).map_err(ConfigError::Invalid)
    }

    pub fn color_map(&self) -> Result<ColorMap, ConfigError> {
        let mut colors = HashMap::new();
        for (name, hex) in &self.colors {
            let tier: AlertTier = name.parse().map_err(ConfigError::Invalid)?;
            colors.insert(tier, hex.clone());
        }
        Ok(ColorMap::new(colors, self.default_color.clone()))
    }
}

// ---------------------------------------------------------------------------
// Root
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GeoriskConfig {
    pub paths: PathsConfig,
    pub features: FeaturesConfig,
    pub model: ModelConfig,
    pub prediction: PredictionConfig,
    pub alert: AlertConfig,
    #[serde(rename = "locality")]
    pub localities: Vec<ReferenceLocality>,
}

impl GeoriskConfig {
    /// Checks cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.alert.thresholds()?;
        self.alert.color_map()?;

        let test_size = self.model.test_size;
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "model.test_size must be in (0, 1), got {}",
                test_size
            )));
        }
        if !(self.prediction.grid_resolution_deg > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "prediction.grid_resolution_deg must be positive, got {}",
                self.prediction.grid_resolution_deg
            )));
        }
        if !self.prediction.bounds.is_valid() {
            return Err(ConfigError::Invalid(format!(
                "prediction.bounds is empty or out of range: {:?}",
                self.prediction.bounds
            )));
        }
        if self.features.weather_past_days < 1 {
            return Err(ConfigError::Invalid(
                "features.weather_past_days must be at least 1".to_string(),
            ));
        }
        if self.features.weather_timeout_secs < 1 {
            return Err(ConfigError::Invalid(
                "features.weather_timeout_secs must be at least 1".to_string(),
            ));
        }
        if !(self.features.terrain_buffer_radius_m > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "features.terrain_buffer_radius_m must be positive, got {}",
                self.features.terrain_buffer_radius_m
            )));
        }
        Ok(())
    }
}

/// Parses and validates a configuration document.
pub fn parse_config(contents: &str) -> Result<GeoriskConfig, ConfigError> {
    let config: GeoriskConfig = toml::from_str(contents)?;
    config.validate()?;
    Ok(config)
}

/// Loads and validates the configuration file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<GeoriskConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&contents)
}

/// Resolves the configuration path: explicit argument, then the
/// `GEORISK_CONFIG` environment variable, then `georisk.toml`.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    std::env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}
