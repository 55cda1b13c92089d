/// GeoJSON export of enriched prediction records.
///
/// One Point feature per record, coordinates in `[longitude, latitude]`
/// order. Properties carry the score, tier, risk code, locality, color,
/// precipitation proxy and an RFC 3339 timestamp.

use chrono::NaiveDate;
use serde_json::{Value, json};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use crate::model::PredictionRecord;

/// `predictions_YYYYMMDD.geojson`
pub fn predictions_filename(date: NaiveDate) -> String {
    format!("predictions_{}.geojson", date.format("%Y%m%d"))
}

fn to_feature(record: &PredictionRecord) -> Value {
    json!({
        "type": "Feature",
        "geometry": {
            "type": "Point",
            "coordinates": [record.point.longitude, record.point.latitude],
        },
        "properties": {
            "risk_score": record.risk_score,
            "alert_level": record.alert_level,
            "risk_level": record.risk_level,
            "locality": record.locality,
            "province": record.province,
            "alert_color": record.alert_color,
            "precipitation_mm": record.precipitation_mm,
            "timestamp": record.timestamp.to_rfc3339(),
        },
    })
}

pub fn to_geojson(records: &[PredictionRecord]) -> Value {
    json!({
        "type": "FeatureCollection",
        "features": records.iter().map(to_feature).collect::<Vec<_>>(),
    })
}

/// Writes `records` to `dir/predictions_YYYYMMDD.geojson`, creating `dir`
/// if needed. Returns the written path.
pub fn write_geojson(
    records: &[PredictionRecord],
    dir: &Path,
    date: NaiveDate,
) -> Result<PathBuf, Box<dyn Error>> {
    fs::create_dir_all(dir)?;
    let path = dir.join(predictions_filename(date));
    let body = serde_json::to_string_pretty(&to_geojson(records))?;
    fs::write(&path, body)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertTier;
    use crate::model::GeoPoint;
    use chrono::{TimeZone, Utc};

    fn sample_record() -> PredictionRecord {
        PredictionRecord {
            point: GeoPoint::new(46.17, 9.87),
            risk_score: 72.5,
            alert_level: AlertTier::Red,
            risk_level: AlertTier::Red.risk_level(),
            locality: "Sondrio".to_string(),
            province: "SO".to_string(),
            alert_color: "#ff4757".to_string(),
            precipitation_mm: 36.2,
            timestamp: Utc.with_ymd_and_hms(2026, 10, 17, 6, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_filename_uses_compact_date() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert_eq!(predictions_filename(date), "predictions_20260307.geojson");
    }

    #[test]
    fn test_feature_layout() {
        let collection = to_geojson(&[sample_record()]);
        assert_eq!(collection["type"], "FeatureCollection");

        let feature = &collection["features"][0];
        assert_eq!(feature["geometry"]["coordinates"][0], 9.87);
        assert_eq!(feature["geometry"]["coordinates"][1], 46.17);

        let props = &feature["properties"];
        assert_eq!(props["alert_level"], "RED");
        assert_eq!(props["risk_level"], "R4");
        assert_eq!(props["locality"], "Sondrio");
        assert_eq!(props["timestamp"], "2026-10-17T06:00:00+00:00");
    }

    #[test]
    fn test_empty_collection() {
        let collection = to_geojson(&[]);
        assert_eq!(collection["features"].as_array().map(Vec::len), Some(0));
    }

    #[test]
    fn test_write_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("nested/predictions");
        let date = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();

        let path = write_geojson(&[sample_record()], &out_dir, date).unwrap();
        assert!(path.ends_with("predictions_20261017.geojson"));

        let parsed: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["features"].as_array().map(Vec::len), Some(1));
    }
}
