/// georisk_service: hydrogeological risk scoring for Lombardy.
///
/// # Module structure
///
/// ```text
/// georisk_service
/// ├── model        shared data types (GeoPoint, FeatureVector, PredictionRecord, ...)
/// ├── config       service configuration loader (georisk.toml)
/// ├── ingest
/// │   ├── dem        GeoTIFF DEM reader/writer + synthetic DEM generator
/// │   ├── open_meteo Open-Meteo forecast API: URL construction + JSON parsing
/// │   ├── events     historical landslide/flood event feed
/// │   └── fixtures   (test only) representative API response payloads
/// ├── features
/// │   ├── projection WGS84 <-> UTM conversion for metric buffers
/// │   ├── terrain    elevation/slope/roughness statistics around a point
/// │   └── weather    past and forecast precipitation totals
/// ├── training     training matrix assembly with synthetic negatives
/// ├── risk_model   scaler + gradient-boosted regressor, persistence, metrics
/// ├── alert
/// │   └── thresholds risk score to alert tier classification
/// ├── enrich       nearest-locality labelling and display fields
/// ├── export       GeoJSON output
/// └── pipeline     end-to-end orchestration used by the binary
/// ```

/// Public modules
pub mod alert;
pub mod config;
pub mod enrich;
pub mod export;
pub mod features;
pub mod ingest;
pub mod model;
pub mod pipeline;
pub mod risk_model;
pub mod training;
