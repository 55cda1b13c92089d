/// Test fixtures: representative JSON payloads from the Open-Meteo forecast
/// API and the historical event feed.
///
/// The forecast fixtures mirror the envelope returned by:
///   https://api.open-meteo.com/v1/forecast?daily=precipitation_sum&past_days=7&forecast_days=3
///
/// Forecast response shape:
///   latitude, longitude         grid cell actually used (snapped)
///   daily_units.precipitation_sum   "mm"
///   daily.time[]                local dates, oldest first
///   daily.precipitation_sum[]   numbers or null
///
/// With past_days=7 and forecast_days=3 the first seven entries are observed
/// days and the last three are forecast.

/// Bormio, 7 past + 3 forecast days. Day 5 is null.
///
/// Past 7:   0.0, 2.0, 0.4, 8.1, null, 3.0, 12.5  → 7d = 26.0, 3d = 15.5, 1d = 12.5
/// Forecast: 20.0, 6.5, 1.5                       → 3d forecast = 28.0
#[cfg(test)]
pub(crate) fn fixture_bormio_ten_days_json() -> &'static str {
    r#"{
      "latitude": 46.46,
      "longitude": 10.38,
      "generationtime_ms": 0.21,
      "utc_offset_seconds": 7200,
      "timezone": "Europe/Rome",
      "timezone_abbreviation": "CEST",
      "elevation": 1225.0,
      "daily_units": { "time": "iso8601", "precipitation_sum": "mm" },
      "daily": {
        "time": [
          "2026-10-08", "2026-10-09", "2026-10-10", "2026-10-11", "2026-10-12",
          "2026-10-13", "2026-10-14", "2026-10-15", "2026-10-16", "2026-10-17"
        ],
        "precipitation_sum": [0.0, 2.0, 0.4, 8.1, null, 3.0, 12.5, 20.0, 6.5, 1.5]
      }
    }"#
}

/// Upstream error envelope: no `daily` block at all.
#[cfg(test)]
pub(crate) fn fixture_missing_daily_json() -> &'static str {
    r#"{
      "error": true,
      "reason": "Cannot initialize WeatherVariable from invalid String value precip"
    }"#
}

/// Three dates but only two precipitation values.
#[cfg(test)]
pub(crate) fn fixture_length_mismatch_json() -> &'static str {
    r#"{
      "latitude": 45.7,
      "longitude": 9.66,
      "daily": {
        "time": ["2026-10-15", "2026-10-16", "2026-10-17"],
        "precipitation_sum": [1.0, 2.0]
      }
    }"#
}

/// A precipitation value sent as a string.
#[cfg(test)]
pub(crate) fn fixture_string_value_json() -> &'static str {
    r#"{
      "latitude": 45.7,
      "longitude": 9.66,
      "daily": {
        "time": ["2026-10-16", "2026-10-17"],
        "precipitation_sum": [1.0, "2.0"]
      }
    }"#
}

/// Historical event feed: mixed Italian type codes, an English type name,
/// an unknown type, an explicit intensity, and a missing date.
#[cfg(test)]
pub(crate) fn fixture_events_json() -> &'static str {
    r#"[
      { "locality": "Bormio", "province": "SO", "latitude": 46.466, "longitude": 10.370,
        "date": "2025-07-12", "event_type": "colata_detritica" },
      { "locality": "Valbondione", "province": "BG", "latitude": 46.036, "longitude": 10.012,
        "date": "2024-11-03T06:30:00Z", "event_type": "rockfall" },
      { "locality": "Lodi", "province": "LO", "latitude": 45.314, "longitude": 9.503,
        "date": "2023-05-20", "event_type": "mudslide" },
      { "locality": "Bellano", "province": "LC", "latitude": 46.042, "longitude": 9.303,
        "date": "2025-09-01", "event_type": "frana_superficiale", "intensity": 90.0 },
      { "latitude": 45.85, "longitude": 9.39, "event_type": "esondazione" }
    ]"#
}
