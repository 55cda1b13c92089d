//! Core data types for the georisk scoring service.
//!
//! This module defines the shared domain model imported by all other modules:
//! points, study-area bounds, the fixed feature schema, reference localities
//! and the enriched prediction record. It contains no I/O.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::AlertTier;

// ---------------------------------------------------------------------------
// Geographic types
// ---------------------------------------------------------------------------

/// A WGS84 geographic coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// True when both coordinates are finite and inside the WGS84 ranges
    /// (−90 ≤ lat ≤ 90, −180 ≤ lon ≤ 180).
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.3}, {:.3})", self.latitude, self.longitude)
    }
}

/// Latitude/longitude bounding box used for negative sampling and
/// prediction grids.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StudyArea {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl Default for StudyArea {
    /// Lombardy.
    fn default() -> Self {
        Self {
            lat_min: 45.4,
            lat_max: 46.6,
            lon_min: 8.5,
            lon_max: 11.4,
        }
    }
}

impl StudyArea {
    pub fn is_valid(&self) -> bool {
        GeoPoint::new(self.lat_min, self.lon_min).is_valid()
            && GeoPoint::new(self.lat_max, self.lon_max).is_valid()
            && self.lat_min < self.lat_max
            && self.lon_min < self.lon_max
    }

    /// Regular grid of points over the area, latitude-major, with half-open
    /// ranges `[min, max)` stepped by `resolution_deg`.
    ///
    /// Each coordinate is computed as `min + i * step` rather than by repeated
    /// addition so long grids do not accumulate drift.
    pub fn grid(&self, resolution_deg: f64) -> Vec<GeoPoint> {
        if !(resolution_deg > 0.0) {
            return Vec::new();
        }
        let steps = |min: f64, max: f64| ((max - min) / resolution_deg).ceil().max(0.0) as usize;
        let lat_steps = steps(self.lat_min, self.lat_max);
        let lon_steps = steps(self.lon_min, self.lon_max);

        let mut points = Vec::with_capacity(lat_steps * lon_steps);
        for i in 0..lat_steps {
            let lat = self.lat_min + i as f64 * resolution_deg;
            if lat >= self.lat_max {
                break;
            }
            for j in 0..lon_steps {
                let lon = self.lon_min + j as f64 * resolution_deg;
                if lon >= self.lon_max {
                    break;
                }
                points.push(GeoPoint::new(lat, lon));
            }
        }
        points
    }
}

// ---------------------------------------------------------------------------
// Feature schema
// ---------------------------------------------------------------------------

/// Number of fields in the feature schema.
pub const FEATURE_COUNT: usize = 12;

/// Authoritative field order. Training and inference both use this order;
/// persisted models carry their own copy so older artifacts can be reindexed.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "elevation_mean",
    "elevation_std",
    "slope_mean",
    "roughness",
    "precip_1d_past",
    "precip_3d_past",
    "precip_7d_past",
    "precip_3d_forecast",
    "month",
    "day_of_year",
    "latitude",
    "longitude",
];

/// One row of model input, ordered as `FEATURE_NAMES`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn new(values: [f64; FEATURE_COUNT]) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Looks up a field by name.
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.values[i])
    }

    /// Reorders the vector to `schema`. Names absent from this vector come
    /// back as `NaN` so the caller can impute them; unknown names never error.
    pub fn reindex(&self, schema: &[String]) -> Vec<f64> {
        schema
            .iter()
            .map(|name| self.get(name).unwrap_or(f64::NAN))
            .collect()
    }
}

/// The schema as owned strings, as stored in a trained model.
pub fn feature_schema() -> Vec<String> {
    FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Reference data and outputs
// ---------------------------------------------------------------------------

/// A named administrative center used for nearest-locality labelling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceLocality {
    pub name: String,
    pub province: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl ReferenceLocality {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// A documented landslide or flood occurrence used as a positive training
/// example. `intensity` is the regression target on the 0–100 risk scale.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalEvent {
    pub locality: Option<String>,
    pub province: Option<String>,
    pub point: GeoPoint,
    /// Occurrence date; `None` means "treat as today".
    pub date: Option<NaiveDate>,
    pub intensity: f64,
}

/// Raw model output for a single query point, already clipped to [0, 100].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredPoint {
    pub point: GeoPoint,
    pub risk_score: f64,
}

/// A scored point with its alert tier, ready for enrichment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifiedPoint {
    pub point: GeoPoint,
    pub risk_score: f64,
    pub tier: AlertTier,
}

/// Fully enriched prediction handed to export/publishing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRecord {
    pub point: GeoPoint,
    pub risk_score: f64,
    pub alert_level: AlertTier,
    pub risk_level: &'static str,
    pub locality: String,
    pub province: String,
    pub alert_color: String,
    pub precipitation_mm: f64,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
