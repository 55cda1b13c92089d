//! Risk score regression.
//!
//! `RiskModel` owns a fitted scaler, a regressor and the feature schema they
//! were trained with. It has two states: empty (every predict returns
//! `ModelError::NotReady`) and ready (after `train`, `load`, or
//! `from_state`). A failed train or load leaves the previous state intact.
//!
//! Scores are always clipped to [0, 100]; `NaN` scores become 0.
//!
//! Model artifacts are JSON: `{ "regressor": …, "scaler": …,
//! "feature_names": [...] }`, written to a temporary file and renamed into
//! place.

pub mod metrics;
pub mod regressor;
pub mod scaler;

pub use metrics::TrainingMetrics;
pub use regressor::{GbdtRegressor, Hyperparameters, Regressor};
pub use scaler::StandardScaler;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use log::{info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::features::FeatureBuilder;
use crate::model::{FeatureVector, GeoPoint, ScoredPoint};
use crate::training::TrainingSet;

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 100.0;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model not ready: train or load a model before predicting")]
    NotReady,

    #[error("corrupt model state: {0}")]
    CorruptState(String),

    #[error("insufficient training data: {0}")]
    InsufficientData(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("could not serialize model state: {0}")]
    Serialization(String),

    #[error("model artifact I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Clamps a raw regressor output into the published score range.
pub fn clip_score(raw: f64) -> f64 {
    if raw.is_nan() {
        MIN_SCORE
    } else {
        raw.clamp(MIN_SCORE, MAX_SCORE)
    }
}

// ---------------------------------------------------------------------------
// Training options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingOptions {
    /// Share of rows held out for evaluation.
    pub test_fraction: f64,
    /// Seed for the hold-out shuffle.
    pub random_seed: u64,
    pub hyperparameters: Hyperparameters,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            random_seed: 42,
            hyperparameters: Hyperparameters::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Model state
// ---------------------------------------------------------------------------

/// Everything needed to score a feature vector.
#[derive(Serialize, Deserialize)]
pub struct RiskModelState<R> {
    pub regressor: R,
    pub scaler: StandardScaler,
    pub feature_names: Vec<String>,
}

impl<R> RiskModelState<R> {
    /// Schema and scaler agree in width.
    fn validate_schema(&self) -> Result<(), ModelError> {
        if self.feature_names.is_empty() {
            return Err(ModelError::CorruptState("empty feature schema".to_string()));
        }
        if self.scaler.width() != self.feature_names.len()
            || self.scaler.scale().len() != self.feature_names.len()
        {
            return Err(ModelError::CorruptState(format!(
                "scaler width {} does not match {} feature names",
                self.scaler.width(),
                self.feature_names.len()
            )));
        }
        Ok(())
    }

    /// Scales a row already in schema order. Values that are missing or
    /// non-finite after scaling are imputed as 0, the training mean.
    fn prepare(&self, row: &[f64]) -> Vec<f64> {
        self.scaler
            .transform_row(row)
            .into_iter()
            .map(|v| if v.is_finite() { v } else { 0.0 })
            .collect()
    }
}

impl<R: Regressor> RiskModelState<R> {
    pub fn new(regressor: R, scaler: StandardScaler, feature_names: Vec<String>) -> Result<Self, ModelError> {
        let state = Self {
            regressor,
            scaler,
            feature_names,
        };
        state.validate()?;
        Ok(state)
    }

    /// Schema, scaler and regressor all agree in width.
    fn validate(&self) -> Result<(), ModelError> {
        self.validate_schema()?;
        if self.regressor.feature_count() != self.feature_names.len() {
            return Err(ModelError::CorruptState(format!(
                "regressor expects {} features but the schema has {}",
                self.regressor.feature_count(),
                self.feature_names.len()
            )));
        }
        Ok(())
    }

    /// Clipped scores for rows already in schema order.
    fn score_rows(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        let prepared: Vec<Vec<f64>> = rows.iter().map(|r| self.prepare(r)).collect();
        let raw = self.regressor.predict(&prepared);
        if raw.len() != rows.len() {
            return Err(ModelError::CorruptState(format!(
                "regressor returned {} scores for {} rows",
                raw.len(),
                rows.len()
            )));
        }
        Ok(raw.into_iter().map(clip_score).collect())
    }
}

// ---------------------------------------------------------------------------
// RiskModel
// ---------------------------------------------------------------------------

pub struct RiskModel<R = GbdtRegressor> {
    builder: FeatureBuilder,
    state: Option<RiskModelState<R>>,
}

impl<R> RiskModel<R> {
    /// An empty model. Train or load before predicting.
    pub fn new(builder: FeatureBuilder) -> Self {
        Self { builder, state: None }
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_some()
    }

    pub fn feature_names(&self) -> Option<&[String]> {
        self.state.as_ref().map(|s| s.feature_names.as_slice())
    }

    fn ready_state(&self) -> Result<&RiskModelState<R>, ModelError> {
        self.state.as_ref().ok_or(ModelError::NotReady)
    }
}

impl<R: Regressor> RiskModel<R> {
    pub fn from_state(builder: FeatureBuilder, state: RiskModelState<R>) -> Result<Self, ModelError> {
        state.validate()?;
        Ok(Self {
            builder,
            state: Some(state),
        })
    }

    /// Scores `points` as of today.
    pub fn predict(&self, points: &[GeoPoint]) -> Result<Vec<ScoredPoint>, ModelError> {
        self.predict_on(points, Utc::now().date_naive())
    }

    /// Scores `points` with calendar features taken from `date`.
    /// Output order and length match `points`.
    pub fn predict_on(&self, points: &[GeoPoint], date: NaiveDate) -> Result<Vec<ScoredPoint>, ModelError> {
        self.ready_state()?;
        if points.is_empty() {
            return Ok(Vec::new());
        }

        let requests: Vec<(GeoPoint, NaiveDate)> = points.iter().map(|&p| (p, date)).collect();
        let vectors = self.builder.build_batch(&requests);
        let scores = self.score_features(&vectors)?;

        Ok(points
            .iter()
            .zip(scores)
            .map(|(&point, risk_score)| ScoredPoint { point, risk_score })
            .collect())
    }

    /// Scores prebuilt feature vectors, reindexed to the trained schema.
    pub fn score_features(&self, vectors: &[FeatureVector]) -> Result<Vec<f64>, ModelError> {
        let state = self.ready_state()?;
        let rows: Vec<Vec<f64>> = vectors
            .iter()
            .map(|v| v.reindex(&state.feature_names))
            .collect();
        state.score_rows(&rows)
    }

    /// Permutation importance on `set`: the rise in mean squared error when
    /// one column is shuffled, per feature, sorted most important first.
    pub fn permutation_importance(&self, set: &TrainingSet, seed: u64) -> Result<Vec<(String, f64)>, ModelError> {
        let state = self.ready_state()?;
        if set.is_empty() {
            return Err(ModelError::InsufficientData("empty evaluation set".to_string()));
        }

        let rows = align_columns(set, &state.feature_names);
        let baseline = metrics::mean_squared_error(&set.labels, &state.score_rows(&rows)?);

        let mut rng = StdRng::seed_from_u64(seed);
        let mut importance = Vec::with_capacity(state.feature_names.len());
        for (col, name) in state.feature_names.iter().enumerate() {
            let mut column: Vec<f64> = rows.iter().map(|r| r[col]).collect();
            column.shuffle(&mut rng);
            let permuted: Vec<Vec<f64>> = rows
                .iter()
                .zip(&column)
                .map(|(row, &value)| {
                    let mut row = row.clone();
                    row[col] = value;
                    row
                })
                .collect();
            let mse = metrics::mean_squared_error(&set.labels, &state.score_rows(&permuted)?);
            importance.push((name.clone(), mse - baseline));
        }

        importance.sort_by(|a, b| b.1.total_cmp(&a.1));
        Ok(importance)
    }
}

impl RiskModel<GbdtRegressor> {
    /// Fits scaler and regressor on a seeded hold-out split of `set` and
    /// reports test-set metrics. Replaces the current state only on success.
    pub fn train(&mut self, set: &TrainingSet, options: &TrainingOptions) -> Result<TrainingMetrics, ModelError> {
        if set.features.len() != set.labels.len() {
            return Err(ModelError::InvalidInput(format!(
                "{} feature rows but {} labels",
                set.features.len(),
                set.labels.len()
            )));
        }
        if let Some(row) = set.features.iter().find(|r| r.len() != set.feature_names.len()) {
            return Err(ModelError::InvalidInput(format!(
                "row has {} values for {} feature names",
                row.len(),
                set.feature_names.len()
            )));
        }

        let (train_idx, test_idx) = metrics::train_test_split(set.len(), options.test_fraction, options.random_seed)?;
        let pick_rows = |idx: &[usize]| idx.iter().map(|&i| set.features[i].clone()).collect::<Vec<_>>();
        let pick_labels = |idx: &[usize]| idx.iter().map(|&i| set.labels[i]).collect::<Vec<_>>();

        let train_rows = pick_rows(&train_idx);
        let train_labels = pick_labels(&train_idx);
        let test_rows = pick_rows(&test_idx);
        let test_labels = pick_labels(&test_idx);

        info!(
            "Training gradient-boosted model on {} rows ({} held out)",
            train_rows.len(),
            test_rows.len()
        );

        let scaler = StandardScaler::fit(&train_rows)?;
        let scaffold = RiskModelState {
            regressor: (),
            scaler,
            feature_names: set.feature_names.clone(),
        };
        scaffold.validate_schema()?;
        let scaled_train: Vec<Vec<f64>> = train_rows.iter().map(|r| scaffold.prepare(r)).collect();
        let scaled_test: Vec<Vec<f64>> = test_rows.iter().map(|r| scaffold.prepare(r)).collect();

        let regressor = GbdtRegressor::fit(&scaled_train, &train_labels, &options.hyperparameters)?;
        let predictions = regressor.predict(&scaled_test);

        let metrics = TrainingMetrics {
            test_r2: metrics::r2_score(&test_labels, &predictions),
            test_rmse: metrics::rmse(&test_labels, &predictions),
            test_mae: metrics::mae(&test_labels, &predictions),
            training_samples: train_rows.len(),
            test_samples: test_rows.len(),
            feature_count: set.feature_names.len(),
        };
        info!(
            "Model trained: R²={:.3} RMSE={:.2} MAE={:.2}",
            metrics.test_r2, metrics.test_rmse, metrics.test_mae
        );

        self.state = Some(RiskModelState::new(
            regressor,
            scaffold.scaler,
            scaffold.feature_names,
        )?);
        Ok(metrics)
    }
}

impl<R: Serialize> RiskModel<R> {
    /// Writes the model state to `path` atomically (temp file + rename).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ModelError> {
        let path = path.as_ref();
        let state = self.ready_state()?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string(state).map_err(|e| ModelError::Serialization(e.to_string()))?;
        let tmp = temp_path(path);
        fs::write(&tmp, json)?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        info!("Model saved to {}", path.display());
        Ok(())
    }
}

impl<R: Regressor + DeserializeOwned> RiskModel<R> {
    /// Replaces the current state with the artifact at `path`. On any error
    /// the current state is kept.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ModelError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let state: RiskModelState<R> = serde_json::from_str(&contents)
            .map_err(|e| ModelError::CorruptState(format!("{}: {}", path.display(), e)))?;
        state.validate()?;

        if state.feature_names != crate::model::feature_schema() {
            warn!(
                "Model {} was trained on a different feature schema; inputs will be reindexed",
                path.display()
            );
        }

        self.state = Some(state);
        info!("Model loaded from {}", path.display());
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Reorders `set` columns into `schema` by name; absent columns become NaN.
fn align_columns(set: &TrainingSet, schema: &[String]) -> Vec<Vec<f64>> {
    let positions: HashMap<&str, usize> = set
        .feature_names
        .iter()
        .enumerate()
        .map(|(i, n)| (n.as_str(), i))
        .collect();
    let lookup: Vec<Option<usize>> = schema.iter().map(|n| positions.get(n.as_str()).copied()).collect();

    set.features
        .iter()
        .map(|row| {
            lookup
                .iter()
                .map(|pos| pos.and_then(|i| row.get(i).copied()).unwrap_or(f64::NAN))
                .collect()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
