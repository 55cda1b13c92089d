/// Historical landslide/flood event feed.
///
/// Events arrive as a JSON array of flat records:
///
///   { "locality": "Bormio", "province": "SO",
///     "latitude": 46.466, "longitude": 10.370,
///     "date": "2023-07-25", "event_type": "frana_profonda",
///     "intensity": 75.0 }
///
/// Only `latitude` and `longitude` are required. When `intensity` is absent it
/// is derived from `event_type` (see `EventType::intensity`); unknown or
/// missing types get `DEFAULT_INTENSITY`. A missing or unparseable `date`
/// leaves the event undated, which training treats as today.

use std::error::Error;
use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::{info, warn};
use serde::Deserialize;

use crate::model::{GeoPoint, HistoricalEvent};

/// Intensity assigned to events of unknown type.
pub const DEFAULT_INTENSITY: f64 = 50.0;

/// Event categories recognized by the feed, with their risk intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    ShallowLandslide,
    DeepLandslide,
    Rockfall,
    Slide,
    DebrisFlow,
    Flood,
    Overflow,
}

impl EventType {
    /// Accepts the regional inventory codes and their English names.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "frana_superficiale" | "shallow_landslide" => Some(EventType::ShallowLandslide),
            "frana_profonda" | "deep_landslide" => Some(EventType::DeepLandslide),
            "crollo" | "rockfall" => Some(EventType::Rockfall),
            "scivolamento" | "slide" => Some(EventType::Slide),
            "colata_detritica" | "debris_flow" => Some(EventType::DebrisFlow),
            "alluvione" | "flood" => Some(EventType::Flood),
            "esondazione" | "overflow" => Some(EventType::Overflow),
            _ => None,
        }
    }

    pub fn intensity(&self) -> f64 {
        match self {
            EventType::ShallowLandslide => 40.0,
            EventType::DeepLandslide => 75.0,
            EventType::Rockfall => 85.0,
            EventType::Slide => 60.0,
            EventType::DebrisFlow => 70.0,
            EventType::Flood => 55.0,
            EventType::Overflow => 45.0,
        }
    }
}

/// Intensity for an optional type label.
pub fn intensity_for(event_type: Option<&str>) -> f64 {
    event_type
        .and_then(EventType::from_label)
        .map(|t| t.intensity())
        .unwrap_or(DEFAULT_INTENSITY)
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`, or RFC 3339 timestamps.
pub fn parse_event_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date());
    }
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive())
}

// ---------------------------------------------------------------------------
// Serde structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct EventRecord {
    locality: Option<String>,
    province: Option<String>,
    #[serde(alias = "lat")]
    latitude: f64,
    #[serde(alias = "lon")]
    longitude: f64,
    date: Option<String>,
    event_type: Option<String>,
    intensity: Option<f64>,
}

impl EventRecord {
    fn into_event(self) -> HistoricalEvent {
        let date = match self.date.as_deref() {
            Some(raw) => {
                let parsed = parse_event_date(raw);
                if parsed.is_none() {
                    warn!("Unparseable event date '{}'; treating as undated", raw);
                }
                parsed
            }
            None => None,
        };
        let intensity = match self.intensity {
            Some(v) if v.is_finite() => v,
            _ => intensity_for(self.event_type.as_deref()),
        };
        HistoricalEvent {
            locality: self.locality,
            province: self.province,
            point: GeoPoint::new(self.latitude, self.longitude),
            date,
            intensity,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Parses an event feed body.
pub fn parse_events(json: &str) -> Result<Vec<HistoricalEvent>, serde_json::Error> {
    let records: Vec<EventRecord> = serde_json::from_str(json)?;
    Ok(records.into_iter().map(EventRecord::into_event).collect())
}

/// Loads an event feed from disk.
pub fn load_events<P: AsRef<Path>>(path: P) -> Result<Vec<HistoricalEvent>, Box<dyn Error>> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read events file {}: {}", path.display(), e))?;
    let events = parse_events(&contents)
        .map_err(|e| format!("Failed to parse events file {}: {}", path.display(), e))?;
    info!("Loaded {} historical events from {}", events.len(), path.display());
    Ok(events)
}

/// Demonstration inventory of eleven documented Lombardy events, used when
/// no event feed is configured.
pub fn demo_events() -> Vec<HistoricalEvent> {
    const DEMO: [(&str, &str, f64, f64, &str, &str); 11] = [
        // Sondrio: Valtellina
        ("Bormio", "SO", 46.466, 10.370, "2023-07-25", "frana_profonda"),
        ("Livigno", "SO", 46.538, 10.135, "2023-06-15", "frana_superficiale"),
        ("Chiesa in Valmalenco", "SO", 46.267, 9.851, "2023-08-10", "colata_detritica"),
        // Brescia: Valcamonica
        ("Ponte di Legno", "BS", 46.259, 10.509, "2023-07-18", "frana_superficiale"),
        ("Edolo", "BS", 46.173, 10.327, "2023-09-05", "crollo"),
        // Bergamo: Orobie valleys
        ("Valbondione", "BG", 46.047, 10.003, "2023-06-20", "frana_profonda"),
        ("Branzi", "BG", 46.003, 9.762, "2023-10-15", "scivolamento"),
        // Lecco: Lake Como shore
        ("Bellano", "LC", 46.041, 9.301, "2023-11-10", "crollo"),
        ("Varenna", "LC", 46.010, 9.285, "2023-10-25", "frana_superficiale"),
        // Po plain
        ("Lodi", "LO", 45.314, 9.502, "2023-10-15", "alluvione"),
        ("Cremona", "CR", 45.133, 10.022, "2023-11-20", "esondazione"),
    ];

    DEMO.iter()
        .map(|&(locality, province, lat, lon, date, kind)| HistoricalEvent {
            locality: Some(locality.to_string()),
            province: Some(province.to_string()),
            point: GeoPoint::new(lat, lon),
            date: parse_event_date(date),
            intensity: intensity_for(Some(kind)),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::fixtures::fixture_events_json;

    #[test]
    fn test_intensity_table() {
        assert_eq!(intensity_for(Some("frana_superficiale")), 40.0);
        assert_eq!(intensity_for(Some("frana_profonda")), 75.0);
        assert_eq!(intensity_for(Some("crollo")), 85.0);
        assert_eq!(intensity_for(Some("scivolamento")), 60.0);
        assert_eq!(intensity_for(Some("colata_detritica")), 70.0);
        assert_eq!(intensity_for(Some("alluvione")), 55.0);
        assert_eq!(intensity_for(Some("esondazione")), 45.0);
        assert_eq!(intensity_for(Some("Rockfall")), 85.0);
        assert_eq!(intensity_for(Some("sinkhole")), DEFAULT_INTENSITY);
        assert_eq!(intensity_for(None), DEFAULT_INTENSITY);
    }

    #[test]
    fn test_parse_event_dates() {
        let expected = NaiveDate::from_ymd_opt(2024, 11, 3);
        assert_eq!(parse_event_date("2024-11-03"), expected);
        assert_eq!(parse_event_date("2024-11-03 06:30:00"), expected);
        assert_eq!(parse_event_date("2024-11-03T06:30:00Z"), expected);
        assert_eq!(parse_event_date("03/11/2024"), None);
    }

    #[test]
    fn test_parse_event_feed() {
        let events = parse_events(fixture_events_json()).expect("fixture should parse");
        assert_eq!(events.len(), 5);

        assert_eq!(events[0].locality.as_deref(), Some("Bormio"));
        assert_eq!(events[0].intensity, 70.0);
        assert_eq!(events[0].date, NaiveDate::from_ymd_opt(2025, 7, 12));

        assert_eq!(events[1].intensity, 85.0, "English type name");
        assert_eq!(events[2].intensity, DEFAULT_INTENSITY, "unknown type");
        assert_eq!(events[3].intensity, 90.0, "explicit intensity wins");

        assert_eq!(events[4].locality, None);
        assert_eq!(events[4].date, None);
        assert_eq!(events[4].intensity, 45.0);
    }

    #[test]
    fn test_parse_rejects_missing_coordinates() {
        let json = r#"[{ "locality": "Nowhere", "event_type": "crollo" }]"#;
        assert!(parse_events(json).is_err());
    }

    #[test]
    fn test_load_events_from_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("events.json");
        fs::write(&path, fixture_events_json()).expect("write fixture");
        let events = load_events(&path).expect("load should succeed");
        assert_eq!(events.len(), 5);
        assert!(load_events(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_demo_inventory() {
        let events = demo_events();
        assert_eq!(events.len(), 11);
        assert!(events.iter().all(|e| e.point.is_valid() && e.date.is_some()));
        let bormio = &events[0];
        assert_eq!(bormio.point, GeoPoint::new(46.466, 10.370));
        assert_eq!(bormio.intensity, 75.0);
    }
}
