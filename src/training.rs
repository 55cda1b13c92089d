//! Training-set assembly.
//!
//! Historical events become positive rows labelled with their intensity.
//! Pseudo-negative rows are drawn uniformly from the study area on random
//! past dates and labelled 0. Negatives are not checked against event
//! locations, so a draw may land near a real event; the resulting label
//! noise is accepted.

use chrono::{Duration, NaiveDate, Utc};
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::features::FeatureBuilder;
use crate::model::{GeoPoint, HistoricalEvent, StudyArea, feature_schema};
use crate::risk_model::ModelError;

/// How pseudo-negatives are drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NegativeSampling {
    /// Negatives per positive; 1.0 yields exactly as many negatives as events.
    pub ratio: f64,
    /// Negatives are dated up to this many days before the reference date.
    pub max_age_days: u32,
    /// Fixed seed for reproducible draws; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for NegativeSampling {
    fn default() -> Self {
        Self {
            ratio: 1.0,
            max_age_days: 3650,
            seed: None,
        }
    }
}

/// Feature matrix and labels, rows ordered positives first.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<f64>,
    pub feature_names: Vec<String>,
    pub positive_count: usize,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn negative_count(&self) -> usize {
        self.len() - self.positive_count
    }
}

pub struct TrainingSetAssembler {
    builder: FeatureBuilder,
    sampling: NegativeSampling,
    reference_date: Option<NaiveDate>,
}

impl TrainingSetAssembler {
    pub fn new(builder: FeatureBuilder, sampling: NegativeSampling) -> Self {
        Self {
            builder,
            sampling,
            reference_date: None,
        }
    }

    /// Pins "today" (used for undated events and negative dates).
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    fn today(&self) -> NaiveDate {
        self.reference_date
            .unwrap_or_else(|| Utc::now().date_naive())
    }

    /// Builds the training matrix for `events`.
    ///
    /// With zero events the set is empty (no negatives are drawn); training
    /// on it fails with `ModelError::InsufficientData`.
    pub fn assemble(
        &self,
        events: &[HistoricalEvent],
        area: &StudyArea,
    ) -> Result<TrainingSet, ModelError> {
        if !area.is_valid() {
            return Err(ModelError::InvalidInput(format!(
                "study area is empty or out of range: {:?}",
                area
            )));
        }
        let today = self.today();
        info!("Preparing training data from {} historical events", events.len());

        let positives: Vec<(GeoPoint, NaiveDate)> = events
            .iter()
            .map(|e| (e.point, e.date.unwrap_or(today)))
            .collect();

        let negative_count = (events.len() as f64 * self.sampling.ratio.max(0.0)).round() as usize;
        let negatives = self.draw_negatives(negative_count, area, today);

        let mut features: Vec<Vec<f64>> = Vec::with_capacity(positives.len() + negatives.len());
        for fv in self.builder.build_batch(&positives) {
            features.push(fv.values().to_vec());
        }
        for fv in self.builder.build_batch(&negatives) {
            features.push(fv.values().to_vec());
        }

        let mut labels: Vec<f64> = events.iter().map(|e| e.intensity).collect();
        labels.extend(std::iter::repeat(0.0).take(negatives.len()));

        info!(
            "Training set: {} rows ({} positive, {} negative)",
            labels.len(),
            positives.len(),
            negatives.len()
        );

        Ok(TrainingSet {
            features,
            labels,
            feature_names: feature_schema(),
            positive_count: positives.len(),
        })
    }

    /// Draws all negatives up front so the sequence depends only on the seed.
    fn draw_negatives(
        &self,
        count: usize,
        area: &StudyArea,
        today: NaiveDate,
    ) -> Vec<(GeoPoint, NaiveDate)> {
        let mut rng = match self.sampling.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        (0..count)
            .map(|_| {
                let lat = rng.gen_range(area.lat_min..area.lat_max);
                let lon = rng.gen_range(area.lon_min..area.lon_max);
                let age = if self.sampling.max_age_days == 0 {
                    0
                } else {
                    rng.gen_range(0..self.sampling.max_age_days as i64)
                };
                (GeoPoint::new(lat, lon), today - Duration::days(age))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
