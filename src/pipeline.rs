/// Pipeline orchestration: events → training → grid prediction →
/// classification → enrichment.
///
/// Thin sequencing over the library components, configured entirely from a
/// `GeoriskConfig`. The binary drives it; tests drive it with injected
/// feature builders.

use chrono::{NaiveDate, Utc};
use log::{info, warn};
use std::error::Error;
use std::sync::Arc;

use crate::alert::AlertClassifier;
use crate::config::GeoriskConfig;
use crate::enrich::SpatialEnricher;
use crate::features::FeatureBuilder;
use crate::features::terrain::TerrainSampler;
use crate::features::weather::WeatherSampler;
use crate::ingest::events::{demo_events, load_events};
use crate::ingest::open_meteo::{
    DailySchemaValidator, MemoryCache, NoCache, NoValidation, OfflineProvider, OpenMeteoClient,
    PrecipitationProvider, ResponseCache, ResponseValidator,
};
use crate::model::{ClassifiedPoint, GeoPoint, HistoricalEvent, PredictionRecord};
use crate::risk_model::{RiskModel, TrainingMetrics};
use crate::training::TrainingSetAssembler;

pub struct Pipeline {
    config: GeoriskConfig,
    builder: FeatureBuilder,
    model: RiskModel,
    classifier: AlertClassifier,
    enricher: SpatialEnricher,
}

impl Pipeline {
    /// Builds samplers, classifier and enricher from `config`. With
    /// `offline` set no weather requests are made.
    pub fn from_config(config: GeoriskConfig, offline: bool) -> Result<Self, Box<dyn Error>> {
        let terrain = TerrainSampler::from_path(
            config.paths.dem.as_deref(),
            config.features.terrain_buffer_radius_m,
        );

        let provider: Arc<dyn PrecipitationProvider> = if offline {
            info!("Offline mode: weather features use fallbacks");
            Arc::new(OfflineProvider)
        } else {
            Arc::new(weather_client(&config)?)
        };
        let weather = WeatherSampler::new(
            provider,
            config.features.weather_past_days,
            config.features.weather_forecast_days,
        );

        let builder = FeatureBuilder::new(terrain, weather).with_workers(config.features.workers);
        Self::with_builder(config, builder)
    }

    /// Same as `from_config` but with a caller-supplied feature builder.
    pub fn with_builder(config: GeoriskConfig, builder: FeatureBuilder) -> Result<Self, Box<dyn Error>> {
        config.validate()?;
        let classifier = AlertClassifier::new(config.alert.thresholds()?);
        let enricher = SpatialEnricher::new(config.localities.clone(), config.alert.color_map()?);

        Ok(Self {
            model: RiskModel::new(builder.clone()),
            builder,
            config,
            classifier,
            enricher,
        })
    }

    pub fn config(&self) -> &GeoriskConfig {
        &self.config
    }

    pub fn model(&self) -> &RiskModel {
        &self.model
    }

    /// Events from `[paths].events`, or the demonstration inventory.
    pub fn load_events(&self) -> Result<Vec<HistoricalEvent>, Box<dyn Error>> {
        match &self.config.paths.events {
            Some(path) => {
                let events = load_events(path)?;
                info!("Loaded {} events from {}", events.len(), path.display());
                Ok(events)
            }
            None => {
                info!("No events file configured; using demonstration events");
                Ok(demo_events())
            }
        }
    }

    /// Trains on `events` and saves the artifact to `[paths].model_artifact`.
    pub fn train(&mut self, events: &[HistoricalEvent]) -> Result<TrainingMetrics, Box<dyn Error>> {
        let assembler = TrainingSetAssembler::new(self.builder.clone(), self.config.model.negative_sampling());
        let set = assembler.assemble(events, &self.config.prediction.bounds)?;
        let metrics = self.model.train(&set, &self.config.model.training_options())?;
        self.model.save(&self.config.paths.model_artifact)?;
        Ok(metrics)
    }

    /// Loads the saved model, training a fresh one when it is missing or
    /// unreadable, or when `force_retrain` is set. Returns metrics only
    /// when training ran.
    pub fn train_or_load(&mut self, force_retrain: bool) -> Result<Option<TrainingMetrics>, Box<dyn Error>> {
        let artifact = self.config.paths.model_artifact.clone();
        if !force_retrain && artifact.exists() {
            match self.model.load(&artifact) {
                Ok(()) => return Ok(None),
                Err(e) => warn!("Could not load {}: {}; retraining", artifact.display(), e),
            }
        }

        let events = self.load_events()?;
        self.train(&events).map(Some)
    }

    /// Scores, classifies and enriches arbitrary points, with no threshold.
    pub fn predict_points(&self, points: &[GeoPoint], date: NaiveDate) -> Result<Vec<PredictionRecord>, Box<dyn Error>> {
        let scored = self.model.predict_on(points, date)?;
        let classified: Vec<ClassifiedPoint> = scored
            .into_iter()
            .map(|s| ClassifiedPoint {
                point: s.point,
                risk_score: s.risk_score,
                tier: self.classifier.classify(s.risk_score),
            })
            .collect();
        Ok(self.enricher.enrich(&classified, Utc::now()))
    }

    /// Scores the configured grid over `[prediction].bounds` and keeps points
    /// at or above `min_risk_score_threshold`.
    pub fn predict_grid(&self, date: NaiveDate) -> Result<Vec<PredictionRecord>, Box<dyn Error>> {
        let prediction = &self.config.prediction;
        let grid = prediction.bounds.grid(prediction.grid_resolution_deg);
        info!(
            "Scoring {} grid points at {}° resolution",
            grid.len(),
            prediction.grid_resolution_deg
        );

        let scored = self.model.predict_on(&grid, date)?;
        let kept: Vec<ClassifiedPoint> = scored
            .into_iter()
            .filter(|s| s.risk_score >= prediction.min_risk_score_threshold)
            .map(|s| ClassifiedPoint {
                point: s.point,
                risk_score: s.risk_score,
                tier: self.classifier.classify(s.risk_score),
            })
            .collect();
        info!("{} points at or above threshold {}", kept.len(), prediction.min_risk_score_threshold);

        Ok(self.enricher.enrich(&kept, Utc::now()))
    }
}

fn weather_client(config: &GeoriskConfig) -> Result<OpenMeteoClient, Box<dyn Error>> {
    let features = &config.features;
    let validator: Box<dyn ResponseValidator> = if features.validate_weather_responses {
        Box::new(DailySchemaValidator)
    } else {
        Box::new(NoValidation)
    };
    let cache: Box<dyn ResponseCache> = if features.weather_cache_ttl_secs > 0 {
        Box::new(MemoryCache::new(std::time::Duration::from_secs(
            features.weather_cache_ttl_secs,
        )))
    } else {
        Box::new(NoCache)
    };

    Ok(OpenMeteoClient::new(features.weather_timeout())?
        .with_base_url(&features.weather_base_url)
        .with_timezone(&features.timezone)
        .with_validator(validator)
        .with_cache(cache))
}
