/// Integration tests for the risk scoring pipeline
///
/// These tests verify:
/// 1. Events → training set → trained model → scored, classified, enriched records
/// 2. Seeded runs are reproducible
/// 3. A failing weather provider degrades to fallbacks without dropping points
/// 4. Saved models score identically after reload, and inconsistent artifacts are rejected
/// 5. Terrain features come from a real GeoTIFF when one is configured
///
/// No network access: weather comes from injected providers.
///
/// Run with: cargo test --test pipeline_integration

use georisk_service::alert::{AlertClassifier, AlertTier};
use georisk_service::enrich::{ColorMap, SpatialEnricher, UNKNOWN_LOCALITY, UNKNOWN_PROVINCE};
use georisk_service::features::FeatureBuilder;
use georisk_service::features::terrain::TerrainSampler;
use georisk_service::features::weather::{WeatherFeatures, WeatherSampler};
use georisk_service::ingest::dem::{synthetic_dem, write_geotiff};
use georisk_service::ingest::open_meteo::{PrecipitationProvider, WeatherError};
use georisk_service::model::{
    ClassifiedPoint, FEATURE_COUNT, GeoPoint, HistoricalEvent, ReferenceLocality, StudyArea,
    feature_schema,
};
use georisk_service::risk_model::{
    ModelError, Regressor, RiskModel, RiskModelState, StandardScaler, TrainingOptions,
};
use georisk_service::training::{NegativeSampling, TrainingSetAssembler};

use chrono::{NaiveDate, TimeZone, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn reference_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
}

fn event(lat: f64, lon: f64, intensity: f64) -> HistoricalEvent {
    HistoricalEvent {
        locality: None,
        province: None,
        point: GeoPoint::new(lat, lon),
        date: NaiveDate::from_ymd_opt(2025, 9, 1),
        intensity,
    }
}

/// Sondrio, Bergamo and Lecco area events.
fn three_events() -> Vec<HistoricalEvent> {
    vec![
        event(46.16, 9.87, 85.0),
        event(45.69, 9.67, 40.0),
        event(45.85, 9.39, 90.0),
    ]
}

fn assembler(builder: FeatureBuilder) -> TrainingSetAssembler {
    TrainingSetAssembler::new(
        builder,
        NegativeSampling {
            seed: Some(42),
            ..NegativeSampling::default()
        },
    )
    .with_reference_date(reference_date())
}

fn small_options() -> TrainingOptions {
    let mut options = TrainingOptions::default();
    options.hyperparameters.n_estimators = 20;
    options.hyperparameters.max_depth = 3;
    options
}

fn capitals() -> Vec<ReferenceLocality> {
    vec![
        ReferenceLocality {
            name: "Sondrio".to_string(),
            province: "SO".to_string(),
            latitude: 46.1699,
            longitude: 9.8782,
        },
        ReferenceLocality {
            name: "Bergamo".to_string(),
            province: "BG".to_string(),
            latitude: 45.6983,
            longitude: 9.6773,
        },
        ReferenceLocality {
            name: "Milano".to_string(),
            province: "MI".to_string(),
            latitude: 45.4642,
            longitude: 9.1900,
        },
    ]
}

fn query_points() -> Vec<GeoPoint> {
    vec![
        GeoPoint::new(46.15, 9.88),
        GeoPoint::new(45.70, 9.66),
        GeoPoint::new(45.47, 9.20),
    ]
}

fn trained_model(builder: FeatureBuilder) -> RiskModel {
    let set = assembler(builder.clone())
        .assemble(&three_events(), &StudyArea::default())
        .expect("training set");
    let mut model = RiskModel::new(builder);
    model.train(&set, &small_options()).expect("training succeeds");
    model
}

/// Weather provider that always fails, counting calls.
struct FailingProvider {
    calls: AtomicUsize,
}

impl PrecipitationProvider for FailingProvider {
    fn daily_precipitation(
        &self,
        _point: GeoPoint,
        _past_days: u32,
        _forecast_days: u32,
    ) -> Result<Vec<Option<f64>>, WeatherError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(WeatherError::HttpStatus(503))
    }
}

/// Constant raw score, regardless of input.
#[derive(serde::Serialize, serde::Deserialize)]
struct ConstantRegressor(f64);

impl Regressor for ConstantRegressor {
    fn predict(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        vec![self.0; rows.len()]
    }

    fn feature_count(&self) -> usize {
        FEATURE_COUNT
    }
}

fn constant_model(raw: f64) -> RiskModel<ConstantRegressor> {
    let state = RiskModelState::new(
        ConstantRegressor(raw),
        StandardScaler::identity(FEATURE_COUNT),
        feature_schema(),
    )
    .unwrap();
    RiskModel::from_state(FeatureBuilder::offline(), state).unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_three_events_give_six_rows() {
    let set = assembler(FeatureBuilder::offline())
        .assemble(&three_events(), &StudyArea::default())
        .unwrap();

    assert_eq!(set.len(), 6);
    assert_eq!(set.positive_count, 3);
    assert_eq!(set.negative_count(), 3);
    assert_eq!(set.labels[..3], [85.0, 40.0, 90.0]);
    assert!(set.labels[3..].iter().all(|&l| l == 0.0));
    assert!(set.features.iter().all(|row| row.len() == FEATURE_COUNT));
}

#[test]
fn test_end_to_end_records() {
    let model = trained_model(FeatureBuilder::offline());
    let classifier = AlertClassifier::default();
    let enricher = SpatialEnricher::new(capitals(), ColorMap::default());

    let scored = model.predict_on(&query_points(), reference_date()).unwrap();
    assert_eq!(scored.len(), 3);

    let classified: Vec<ClassifiedPoint> = scored
        .iter()
        .map(|s| ClassifiedPoint {
            point: s.point,
            risk_score: s.risk_score,
            tier: classifier.classify(s.risk_score),
        })
        .collect();
    let timestamp = Utc.with_ymd_and_hms(2026, 10, 17, 6, 0, 0).unwrap();
    let records = enricher.enrich(&classified, timestamp);

    assert_eq!(records.len(), 3);
    let localities: Vec<&str> = records.iter().map(|r| r.locality.as_str()).collect();
    assert_eq!(localities, ["Sondrio", "Bergamo", "Milano"]);
    for record in &records {
        assert!((0.0..=100.0).contains(&record.risk_score));
        assert_eq!(record.alert_level, classifier.classify(record.risk_score));
        assert_eq!(record.risk_level, record.alert_level.risk_level());
        assert_eq!(record.timestamp, timestamp);
        assert!(record.alert_color.starts_with('#'));
    }
}

#[test]
fn test_seeded_training_is_reproducible() {
    let first = trained_model(FeatureBuilder::offline());
    let second = trained_model(FeatureBuilder::offline());

    let a = first.predict_on(&query_points(), reference_date()).unwrap();
    let b = second.predict_on(&query_points(), reference_date()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_failing_weather_still_scores_every_point() {
    let provider = Arc::new(FailingProvider {
        calls: AtomicUsize::new(0),
    });
    let builder = FeatureBuilder::new(
        TerrainSampler::fallback_only(500.0),
        WeatherSampler::new(provider.clone(), 7, 3),
    )
    .with_workers(2);

    let vector = builder.build(GeoPoint::new(46.15, 9.88), reference_date());
    assert_eq!(vector.get("precip_7d_past"), Some(WeatherFeatures::FALLBACK.precip_7d_past));
    assert_eq!(vector.get("precip_3d_forecast"), Some(WeatherFeatures::FALLBACK.precip_3d_forecast));

    let model = trained_model(builder);
    let scored = model.predict_on(&query_points(), reference_date()).unwrap();
    assert_eq!(scored.len(), 3);
    assert!(scored.iter().all(|s| s.risk_score.is_finite()));
    assert!(provider.calls.load(Ordering::SeqCst) >= 3);
}

#[test]
fn test_save_and_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("models/georisk_model.json");

    let model = trained_model(FeatureBuilder::offline());
    model.save(&path).unwrap();
    assert!(path.exists());

    let mut restored: RiskModel = RiskModel::new(FeatureBuilder::offline());
    restored.load(&path).unwrap();
    assert_eq!(restored.feature_names(), model.feature_names());

    let original = model.predict_on(&query_points(), reference_date()).unwrap();
    let reloaded = restored.predict_on(&query_points(), reference_date()).unwrap();
    for (a, b) in original.iter().zip(&reloaded) {
        assert!((a.risk_score - b.risk_score).abs() < 1e-6);
    }
}

#[test]
fn test_artifact_with_narrowed_schema_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("georisk_model.json");

    let model = trained_model(FeatureBuilder::offline());
    model.save(&path).unwrap();

    // Schema and scaler agree on two columns; the trees still expect all of them
    let mut artifact: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    for field in ["mean", "scale"] {
        artifact["scaler"][field].as_array_mut().unwrap().truncate(2);
    }
    artifact["feature_names"].as_array_mut().unwrap().truncate(2);
    std::fs::write(&path, serde_json::to_string(&artifact).unwrap()).unwrap();

    let mut restored = trained_model(FeatureBuilder::offline());
    let before = restored.predict_on(&query_points(), reference_date()).unwrap();
    assert!(matches!(restored.load(&path), Err(ModelError::CorruptState(_))));

    let after = restored.predict_on(&query_points(), reference_date()).unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_out_of_range_scores_are_clipped_and_classified() {
    let points = query_points();

    let low = constant_model(-25.0).predict_on(&points, reference_date()).unwrap();
    let high = constant_model(250.0).predict_on(&points, reference_date()).unwrap();
    assert!(low.iter().all(|s| s.risk_score == 0.0));
    assert!(high.iter().all(|s| s.risk_score == 100.0));

    let classifier = AlertClassifier::default();
    assert_eq!(classifier.classify(low[0].risk_score), AlertTier::Green);
    assert_eq!(classifier.classify(high[0].risk_score), AlertTier::Red);
}

#[test]
fn test_no_localities_labels_unknown() {
    let enricher = SpatialEnricher::new(Vec::new(), ColorMap::default());
    let predictions = [ClassifiedPoint {
        point: GeoPoint::new(45.9, 9.9),
        risk_score: 55.0,
        tier: AlertTier::Orange,
    }];

    let records = enricher.enrich(&predictions, Utc::now());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].locality, UNKNOWN_LOCALITY);
    assert_eq!(records[0].province, UNKNOWN_PROVINCE);
    assert_eq!(records[0].alert_color, "#ff9f43");
}

#[test]
fn test_terrain_from_generated_dem() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dem.tif");

    // ~160 m x 220 m cells, so a 500 m buffer touches a few dozen cells
    let area = StudyArea {
        lat_min: 45.9,
        lat_max: 46.1,
        lon_min: 9.8,
        lon_max: 10.0,
    };
    write_geotiff(&path, &synthetic_dem(&area, 100, 100, 7)).unwrap();

    let sampler = TerrainSampler::from_path(Some(path.as_path()), 500.0);
    assert!(sampler.has_raster());

    let builder = FeatureBuilder::new(sampler, WeatherSampler::offline());
    let vector = builder.build(GeoPoint::new(46.0, 9.9), reference_date());

    // Surface is 100 m + 1500 m per degree north of lat_min, so ~250 m here
    let elevation = vector.get("elevation_mean").unwrap();
    assert!((150.0..350.0).contains(&elevation), "elevation_mean = {}", elevation);
    assert!(vector.get("slope_mean").unwrap() > 0.0);
}
