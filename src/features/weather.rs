/// Precipitation features for a point.
///
/// Reduces a daily series of `past_days` observed days followed by
/// `forecast_days` forecast days into four totals (mm):
///
///   precip_1d_past      last observed day
///   precip_3d_past      last three observed days
///   precip_7d_past      all observed days
///   precip_3d_forecast  all forecast days
///
/// Missing days count as 0. When the provider fails, or returns fewer
/// entries than `past_days`, the fixed `WeatherFeatures::FALLBACK` applies.
use std::sync::Arc;

use log::warn;

use crate::ingest::open_meteo::{OfflineProvider, PrecipitationProvider};
use crate::model::GeoPoint;

pub const DEFAULT_PAST_DAYS: u32 = 7;
pub const DEFAULT_FORECAST_DAYS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherFeatures {
    pub precip_1d_past: f64,
    pub precip_3d_past: f64,
    pub precip_7d_past: f64,
    pub precip_3d_forecast: f64,
}

impl WeatherFeatures {
    pub const FALLBACK: WeatherFeatures = WeatherFeatures {
        precip_1d_past: 5.0,
        precip_3d_past: 15.0,
        precip_7d_past: 30.0,
        precip_3d_forecast: 10.0,
    };

    /// Aggregates a daily series. Returns `None` when the series is shorter
    /// than `past_days`.
    pub fn from_daily(series: &[Option<f64>], past_days: usize, forecast_days: usize) -> Option<Self> {
        if series.len() < past_days {
            return None;
        }
        let day = |v: &Option<f64>| v.filter(|x| x.is_finite()).unwrap_or(0.0);
        let past = &series[..past_days];

        Some(Self {
            precip_1d_past: past.last().map(day).unwrap_or(0.0),
            precip_3d_past: past[past_days.saturating_sub(3)..].iter().map(day).sum(),
            precip_7d_past: past.iter().map(day).sum(),
            precip_3d_forecast: series[past_days..].iter().take(forecast_days).map(day).sum(),
        })
    }
}

/// Fetches and aggregates precipitation through a `PrecipitationProvider`.
#[derive(Clone)]
pub struct WeatherSampler {
    provider: Arc<dyn PrecipitationProvider>,
    past_days: u32,
    forecast_days: u32,
}

impl WeatherSampler {
    pub fn new(provider: Arc<dyn PrecipitationProvider>, past_days: u32, forecast_days: u32) -> Self {
        Self {
            provider,
            past_days,
            forecast_days,
        }
    }

    /// Sampler that never calls out; every point gets the fallback.
    pub fn offline() -> Self {
        Self::new(Arc::new(OfflineProvider), DEFAULT_PAST_DAYS, DEFAULT_FORECAST_DAYS)
    }

    /// Weather features for `point`. Never fails.
    pub fn sample(&self, point: GeoPoint) -> WeatherFeatures {
        if !point.is_valid() {
            warn!("Weather fallback for {}: coordinates out of range", point);
            return WeatherFeatures::FALLBACK;
        }

        match self
            .provider
            .daily_precipitation(point, self.past_days, self.forecast_days)
        {
            Ok(series) => {
                WeatherFeatures::from_daily(&series, self.past_days as usize, self.forecast_days as usize)
                    .unwrap_or_else(|| {
                        warn!(
                            "Weather series for {} has {} days, expected at least {}; using fallback",
                            point,
                            series.len(),
                            self.past_days
                        );
                        WeatherFeatures::FALLBACK
                    })
            }
            Err(e) => {
                warn!("Weather fallback for {}: {}", point, e);
                WeatherFeatures::FALLBACK
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::fixtures::fixture_bormio_ten_days_json;
    use crate::ingest::open_meteo::{NoValidation, WeatherError, parse_daily_precipitation};
    use approx::assert_abs_diff_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves a fixed series and counts calls.
    struct CannedProvider {
        series: Vec<Option<f64>>,
        calls: AtomicUsize,
    }

    impl PrecipitationProvider for CannedProvider {
        fn daily_precipitation(
            &self,
            _point: GeoPoint,
            _past_days: u32,
            _forecast_days: u32,
        ) -> Result<Vec<Option<f64>>, WeatherError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.series.clone())
        }
    }

    fn canned(series: Vec<Option<f64>>) -> Arc<CannedProvider> {
        Arc::new(CannedProvider {
            series,
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_aggregates_fixture_series() {
        let series = parse_daily_precipitation(fixture_bormio_ten_days_json(), &NoValidation).unwrap();
        let f = WeatherFeatures::from_daily(&series, 7, 3).unwrap();
        assert_abs_diff_eq!(f.precip_1d_past, 12.5);
        assert_abs_diff_eq!(f.precip_3d_past, 15.5, epsilon = 1e-9);
        assert_abs_diff_eq!(f.precip_7d_past, 26.0, epsilon = 1e-9);
        assert_abs_diff_eq!(f.precip_3d_forecast, 28.0, epsilon = 1e-9);
    }

    #[test]
    fn test_short_series_is_rejected() {
        let series = vec![Some(1.0); 5];
        assert_eq!(WeatherFeatures::from_daily(&series, 7, 3), None);
    }

    #[test]
    fn test_past_only_series_has_zero_forecast() {
        let series = vec![Some(2.0); 7];
        let f = WeatherFeatures::from_daily(&series, 7, 3).unwrap();
        assert_eq!(f.precip_3d_forecast, 0.0);
        assert_eq!(f.precip_7d_past, 14.0);
    }

    #[test]
    fn test_sampler_uses_provider_series() {
        let provider = canned(vec![Some(1.0); 10]);
        let sampler = WeatherSampler::new(provider.clone(), 7, 3);
        let f = sampler.sample(GeoPoint::new(45.9, 9.4));
        assert_eq!(f.precip_7d_past, 7.0);
        assert_eq!(f.precip_3d_forecast, 3.0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_sampler_falls_back_on_short_series() {
        let sampler = WeatherSampler::new(canned(vec![Some(1.0); 3]), 7, 3);
        assert_eq!(sampler.sample(GeoPoint::new(45.9, 9.4)), WeatherFeatures::FALLBACK);
    }

    #[test]
    fn test_sampler_falls_back_when_offline() {
        let sampler = WeatherSampler::offline();
        assert_eq!(sampler.sample(GeoPoint::new(45.9, 9.4)), WeatherFeatures::FALLBACK);
    }

    #[test]
    fn test_invalid_point_skips_provider() {
        let provider = canned(vec![Some(1.0); 10]);
        let sampler = WeatherSampler::new(provider.clone(), 7, 3);
        assert_eq!(sampler.sample(GeoPoint::new(95.0, 9.4)), WeatherFeatures::FALLBACK);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_out_of_range_longitude_and_nan_skip_provider() {
        let provider = canned(vec![Some(1.0); 10]);
        let sampler = WeatherSampler::new(provider.clone(), 7, 3);
        for point in [
            GeoPoint::new(45.9, 181.0),
            GeoPoint::new(45.9, -180.5),
            GeoPoint::new(f64::NAN, 9.4),
            GeoPoint::new(45.9, f64::INFINITY),
        ] {
            assert_eq!(sampler.sample(point), WeatherFeatures::FALLBACK);
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }
}
