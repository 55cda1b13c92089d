//! Spatial enrichment of classified predictions.
//!
//! Each prediction is labelled with its nearest reference locality (planar
//! distance in degrees over (longitude, latitude), queried through an R-tree),
//! the display color of its tier, and a precipitation proxy derived from the
//! score. Records are processed independently: a failure on one record yields
//! a pass-through record with sentinel labels and never aborts the batch.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use rstar::{AABB, PointDistance, RTree, RTreeObject};

use crate::alert::AlertTier;
use crate::model::{ClassifiedPoint, GeoPoint, PredictionRecord, ReferenceLocality};

pub const UNKNOWN_LOCALITY: &str = "Unknown";
pub const UNKNOWN_PROVINCE: &str = "N/A";

/// Precipitation proxy: `clamp(score * 0.8, 0, 100)` rounded half-to-even to
/// one decimal. A display heuristic, not a measurement.
pub fn precipitation_proxy(risk_score: f64) -> f64 {
    let mm = (risk_score * 0.8).clamp(0.0, 100.0);
    if mm.is_nan() {
        return 0.0;
    }
    (mm * 10.0).round_ties_even() / 10.0
}

// ---------------------------------------------------------------------------
// Colors
// ---------------------------------------------------------------------------

/// Tier → display color, with a default for tiers missing from the map.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorMap {
    colors: HashMap<AlertTier, String>,
    default_color: String,
}

impl Default for ColorMap {
    fn default() -> Self {
        let colors = [
            (AlertTier::Red, "#ff4757"),
            (AlertTier::Orange, "#ff9f43"),
            (AlertTier::Yellow, "#ffd32c"),
            (AlertTier::Green, "#26de81"),
        ]
        .into_iter()
        .map(|(tier, hex)| (tier, hex.to_string()))
        .collect();
        Self {
            colors,
            default_color: "#26de81".to_string(),
        }
    }
}

impl ColorMap {
    pub fn new(colors: HashMap<AlertTier, String>, default_color: String) -> Self {
        Self { colors, default_color }
    }

    pub fn color_for(&self, tier: AlertTier) -> &str {
        self.colors
            .get(&tier)
            .map(String::as_str)
            .unwrap_or(&self.default_color)
    }

    pub fn default_color(&self) -> &str {
        &self.default_color
    }
}

// ---------------------------------------------------------------------------
// Spatial index
// ---------------------------------------------------------------------------

/// Index entry: a locality position in (longitude, latitude) plus its slot
/// in the locality list.
#[derive(Debug, Clone, Copy, PartialEq)]
struct IndexedLocality {
    slot: usize,
    lon: f64,
    lat: f64,
}

impl RTreeObject for IndexedLocality {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lon, self.lat])
    }
}

impl PointDistance for IndexedLocality {
    /// Squared planar distance in degrees.
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.lon - point[0];
        let dy = self.lat - point[1];
        dx * dx + dy * dy
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error("prediction has invalid coordinates {0}")]
    InvalidPoint(GeoPoint),

    #[error("spatial index returned unknown locality slot {0}")]
    IndexMiss(usize),
}

// ---------------------------------------------------------------------------
// Enricher
// ---------------------------------------------------------------------------

pub struct SpatialEnricher {
    localities: Vec<ReferenceLocality>,
    index: Option<RTree<IndexedLocality>>,
    colors: ColorMap,
}

impl SpatialEnricher {
    /// Builds the index once. Localities with invalid coordinates are
    /// skipped; an empty set labels everything with the sentinels.
    pub fn new(localities: Vec<ReferenceLocality>, colors: ColorMap) -> Self {
        let entries: Vec<IndexedLocality> = localities
            .iter()
            .enumerate()
            .filter_map(|(slot, loc)| {
                if loc.point().is_valid() {
                    Some(IndexedLocality {
                        slot,
                        lon: loc.longitude,
                        lat: loc.latitude,
                    })
                } else {
                    warn!("Skipping locality {} with invalid coordinates", loc.name);
                    None
                }
            })
            .collect();

        let index = if entries.is_empty() {
            warn!("No reference localities available; records will be labelled '{}'", UNKNOWN_LOCALITY);
            None
        } else {
            Some(RTree::bulk_load(entries))
        };

        Self {
            localities,
            index,
            colors,
        }
    }

    pub fn locality_count(&self) -> usize {
        self.index.as_ref().map(|t| t.size()).unwrap_or(0)
    }

    /// Nearest locality slot for each point; `None` for invalid points or
    /// when no localities are indexed.
    pub fn nearest_localities(&self, points: &[GeoPoint]) -> Vec<Option<usize>> {
        let Some(index) = &self.index else {
            return vec![None; points.len()];
        };
        points
            .iter()
            .map(|p| {
                if !p.is_valid() {
                    return None;
                }
                index
                    .nearest_neighbor(&[p.longitude, p.latitude])
                    .map(|entry| entry.slot)
            })
            .collect()
    }

    /// Enriches every prediction. Output length and order match the input.
    pub fn enrich(&self, predictions: &[ClassifiedPoint], timestamp: DateTime<Utc>) -> Vec<PredictionRecord> {
        if predictions.is_empty() {
            info!("No predictions to enrich");
            return Vec::new();
        }

        let points: Vec<GeoPoint> = predictions.iter().map(|p| p.point).collect();
        let nearest = self.nearest_localities(&points);

        let records: Vec<PredictionRecord> = predictions
            .iter()
            .zip(nearest)
            .map(|(prediction, slot)| {
                self.enrich_one(prediction, slot, timestamp)
                    .unwrap_or_else(|e| {
                        error!("Enrichment failed for {}: {}; passing record through", prediction.point, e);
                        self.passthrough(prediction, timestamp)
                    })
            })
            .collect();

        info!("Enriched {} predictions", records.len());
        records
    }

    fn enrich_one(
        &self,
        prediction: &ClassifiedPoint,
        slot: Option<usize>,
        timestamp: DateTime<Utc>,
    ) -> Result<PredictionRecord, EnrichError> {
        if !prediction.point.is_valid() {
            return Err(EnrichError::InvalidPoint(prediction.point));
        }

        let (locality, province) = match slot {
            Some(i) => {
                let loc = self.localities.get(i).ok_or(EnrichError::IndexMiss(i))?;
                (loc.name.clone(), loc.province.clone())
            }
            None => (UNKNOWN_LOCALITY.to_string(), UNKNOWN_PROVINCE.to_string()),
        };

        Ok(PredictionRecord {
            point: prediction.point,
            risk_score: prediction.risk_score,
            alert_level: prediction.tier,
            risk_level: prediction.tier.risk_level(),
            locality,
            province,
            alert_color: self.colors.color_for(prediction.tier).to_string(),
            precipitation_mm: precipitation_proxy(prediction.risk_score),
            timestamp,
        })
    }

    /// Record with sentinel labels and the default color.
    fn passthrough(&self, prediction: &ClassifiedPoint, timestamp: DateTime<Utc>) -> PredictionRecord {
        PredictionRecord {
            point: prediction.point,
            risk_score: prediction.risk_score,
            alert_level: prediction.tier,
            risk_level: prediction.tier.risk_level(),
            locality: UNKNOWN_LOCALITY.to_string(),
            province: UNKNOWN_PROVINCE.to_string(),
            alert_color: self.colors.default_color().to_string(),
            precipitation_mm: precipitation_proxy(prediction.risk_score),
            timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn locality(name: &str, province: &str, lat: f64, lon: f64) -> ReferenceLocality {
        ReferenceLocality {
            name: name.to_string(),
            province: province.to_string(),
            latitude: lat,
            longitude: lon,
        }
    }

    fn capoluoghi() -> Vec<ReferenceLocality> {
        vec![
            locality("Milano", "MI", 45.4642, 9.1900),
            locality("Bergamo", "BG", 45.6983, 9.6773),
            locality("Sondrio", "SO", 46.1699, 9.8782),
            locality("Lecco", "LC", 45.8566, 9.3977),
        ]
    }

    fn classified(lat: f64, lon: f64, score: f64, tier: AlertTier) -> ClassifiedPoint {
        ClassifiedPoint {
            point: GeoPoint::new(lat, lon),
            risk_score: score,
            tier,
        }
    }

    #[test]
    fn test_precipitation_proxy() {
        assert_eq!(precipitation_proxy(0.0), 0.0);
        assert_eq!(precipitation_proxy(50.0), 40.0);
        assert_eq!(precipitation_proxy(100.0), 80.0);
        assert_eq!(precipitation_proxy(-10.0), 0.0);
        assert_eq!(precipitation_proxy(200.0), 100.0);
        // 0.8 * 33.3 = 26.64 → 26.6
        assert_eq!(precipitation_proxy(33.3), 26.6);
        assert_eq!(precipitation_proxy(f64::NAN), 0.0);
    }

    #[test]
    fn test_nearest_locality_labels() {
        let enricher = SpatialEnricher::new(capoluoghi(), ColorMap::default());
        let now = Utc::now();
        let records = enricher.enrich(
            &[
                classified(46.16, 9.87, 82.0, AlertTier::Red),
                classified(45.69, 9.67, 35.0, AlertTier::Yellow),
                classified(45.85, 9.39, 55.0, AlertTier::Orange),
            ],
            now,
        );

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].locality, "Sondrio");
        assert_eq!(records[0].province, "SO");
        assert_eq!(records[0].alert_color, "#ff4757");
        assert_eq!(records[0].risk_level, "R4");
        assert_eq!(records[1].locality, "Bergamo");
        assert_eq!(records[1].alert_color, "#ffd32c");
        assert_eq!(records[2].locality, "Lecco");
        assert_eq!(records[2].alert_color, "#ff9f43");
        assert!(records.iter().all(|r| r.timestamp == now));
    }

    #[test]
    fn test_empty_localities_use_sentinels() {
        let enricher = SpatialEnricher::new(Vec::new(), ColorMap::default());
        let records = enricher.enrich(&[classified(45.5, 9.2, 10.0, AlertTier::Green)], Utc::now());
        assert_eq!(records[0].locality, UNKNOWN_LOCALITY);
        assert_eq!(records[0].province, UNKNOWN_PROVINCE);
        assert_eq!(records[0].alert_color, "#26de81");
    }

    #[test]
    fn test_invalid_point_passes_through() {
        let enricher = SpatialEnricher::new(capoluoghi(), ColorMap::default());
        let records = enricher.enrich(
            &[
                classified(f64::NAN, 9.2, 75.0, AlertTier::Red),
                classified(45.47, 9.19, 75.0, AlertTier::Red),
            ],
            Utc::now(),
        );
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].locality, UNKNOWN_LOCALITY);
        assert_eq!(records[0].alert_color, "#26de81");
        assert_eq!(records[0].alert_level, AlertTier::Red, "tier is kept");
        assert_eq!(records[1].locality, "Milano");
    }

    #[test]
    fn test_missing_color_uses_default() {
        let mut colors = HashMap::new();
        colors.insert(AlertTier::Red, "#aa0000".to_string());
        let map = ColorMap::new(colors, "#cccccc".to_string());
        assert_eq!(map.color_for(AlertTier::Red), "#aa0000");
        assert_eq!(map.color_for(AlertTier::Yellow), "#cccccc");
    }

    #[test]
    fn test_invalid_locality_is_not_indexed() {
        let mut locs = capoluoghi();
        locs.push(locality("Broken", "XX", 200.0, 9.0));
        let enricher = SpatialEnricher::new(locs, ColorMap::default());
        assert_eq!(enricher.locality_count(), 4);
    }

    #[test]
    fn test_empty_input() {
        let enricher = SpatialEnricher::new(capoluoghi(), ColorMap::default());
        assert!(enricher.enrich(&[], Utc::now()).is_empty());
    }
}
