//! Feature extraction.
//!
//! `FeatureBuilder` combines terrain statistics, precipitation totals and
//! calendar/position fields into the fixed 12-field `FeatureVector`. Both
//! samplers degrade to documented fallbacks, so building a vector never
//! fails.
//!
//! Batches fan out over a thread pool; results come back in input order.

pub mod projection;
pub mod terrain;
pub mod weather;

use std::sync::Arc;
use std::sync::mpsc;

use chrono::{Datelike, NaiveDate};
use log::error;
use threadpool::ThreadPool;

use crate::model::{FEATURE_COUNT, FeatureVector, GeoPoint};
use terrain::{DEFAULT_BUFFER_RADIUS_M, TerrainFeatures, TerrainSampler};
use weather::{WeatherFeatures, WeatherSampler};

/// Assembles a feature vector from its parts, in schema order.
pub fn compose(
    terrain: TerrainFeatures,
    weather: WeatherFeatures,
    point: GeoPoint,
    date: NaiveDate,
) -> FeatureVector {
    let values: [f64; FEATURE_COUNT] = [
        terrain.elevation_mean,
        terrain.elevation_std,
        terrain.slope_mean,
        terrain.roughness,
        weather.precip_1d_past,
        weather.precip_3d_past,
        weather.precip_7d_past,
        weather.precip_3d_forecast,
        date.month() as f64,
        date.ordinal() as f64,
        point.latitude,
        point.longitude,
    ];
    FeatureVector::new(values)
}

/// Builds feature vectors for points and reference dates.
///
/// Cloning is cheap: the samplers (and the DEM they hold) are shared.
#[derive(Clone)]
pub struct FeatureBuilder {
    terrain: Arc<TerrainSampler>,
    weather: Arc<WeatherSampler>,
    workers: usize,
}

impl FeatureBuilder {
    pub fn new(terrain: TerrainSampler, weather: WeatherSampler) -> Self {
        Self {
            terrain: Arc::new(terrain),
            weather: Arc::new(weather),
            workers: 1,
        }
    }

    /// Builder with no DEM and no weather provider: every vector carries
    /// the terrain and weather fallbacks.
    pub fn offline() -> Self {
        Self::new(
            TerrainSampler::fallback_only(DEFAULT_BUFFER_RADIUS_M),
            WeatherSampler::offline(),
        )
    }

    /// Sets the number of worker threads used by `build_batch` (min 1).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Feature vector for one point on `date`.
    pub fn build(&self, point: GeoPoint, date: NaiveDate) -> FeatureVector {
        let terrain = self.terrain.sample(point);
        let weather = self.weather.sample(point);
        compose(terrain, weather, point, date)
    }

    /// Feature vectors for many (point, date) pairs, in input order.
    pub fn build_batch(&self, requests: &[(GeoPoint, NaiveDate)]) -> Vec<FeatureVector> {
        if self.workers <= 1 || requests.len() <= 1 {
            return requests.iter().map(|&(p, d)| self.build(p, d)).collect();
        }

        let pool = ThreadPool::new(self.workers.min(requests.len()));
        let (tx, rx) = mpsc::channel();

        for (index, &(point, date)) in requests.iter().enumerate() {
            let tx = tx.clone();
            let builder = self.clone();
            pool.execute(move || {
                let vector = builder.build(point, date);
                let _ = tx.send((index, vector));
            });
        }
        drop(tx);

        // Receiving ends once every job has finished (or panicked)
        let mut slots: Vec<Option<FeatureVector>> = vec![None; requests.len()];
        for (index, vector) in rx.iter() {
            slots[index] = Some(vector);
        }

        slots
            .into_iter()
            .zip(requests)
            .map(|(slot, &(point, date))| {
                slot.unwrap_or_else(|| {
                    error!("Feature worker for {} did not report; using fallbacks", point);
                    compose(
                        TerrainFeatures::fallback(point.latitude),
                        WeatherFeatures::FALLBACK,
                        point,
                        date,
                    )
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
