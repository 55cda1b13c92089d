/// Terrain statistics around a point.
///
/// A circular buffer (radius in metres, default 500) is drawn around the
/// point in the planar CRS (UTM 32N), reprojected into the raster CRS, and
/// every DEM cell it touches is collected. From those cells:
///
///   elevation_mean  mean of valid elevations
///   elevation_std   population standard deviation of valid elevations
///   slope_mean      mean magnitude of the elevation gradient
///   roughness       std of residuals from a 3×3 mean-filtered surface
///
/// With fewer than `MIN_VALID_CELLS` valid cells, no raster, or any read
/// failure, a latitude-based fallback is returned instead.
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use geo::{LineString, Polygon};
use log::{debug, warn};

use crate::features::projection::Crs;
use crate::ingest::dem::{DemRaster, ElevationWindow, TerrainError};
use crate::model::GeoPoint;

/// Minimum number of valid cells required to trust raster statistics.
pub const MIN_VALID_CELLS: usize = 10;

/// Vertices used to approximate the circular buffer.
const BUFFER_VERTICES: usize = 64;

/// Latitude the fallback formulas are anchored to (southern edge of the
/// default study area).
const FALLBACK_REFERENCE_LAT: f64 = 45.4;

pub const DEFAULT_BUFFER_RADIUS_M: f64 = 500.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerrainFeatures {
    pub elevation_mean: f64,
    pub elevation_std: f64,
    pub slope_mean: f64,
    pub roughness: f64,
}

impl TerrainFeatures {
    /// Latitude-driven stand-in used when the raster cannot answer.
    /// Non-finite latitudes are treated as the reference latitude so the
    /// result is always finite.
    pub fn fallback(latitude: f64) -> Self {
        let offset = if latitude.is_finite() {
            latitude - FALLBACK_REFERENCE_LAT
        } else {
            0.0
        };
        Self {
            elevation_mean: 200.0 + offset * 1500.0,
            elevation_std: 150.0,
            slope_mean: 5.0 + offset * 20.0,
            roughness: 20.0,
        }
    }
}

/// Samples terrain statistics from an optional DEM.
///
/// The raster is loaded once and shared read-only; samplers are cheap to
/// clone across worker threads.
#[derive(Debug, Clone)]
pub struct TerrainSampler {
    raster: Option<Arc<DemRaster>>,
    planar: Crs,
    buffer_radius_m: f64,
    /// Set once the no-raster fallback has been reported; shared by clones.
    fallback_reported: Arc<AtomicBool>,
}

impl TerrainSampler {
    /// A sampler with no DEM; every query returns the fallback.
    pub fn fallback_only(buffer_radius_m: f64) -> Self {
        Self {
            raster: None,
            planar: Crs::UTM_32N,
            buffer_radius_m,
            fallback_reported: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_raster(raster: DemRaster, buffer_radius_m: f64) -> Self {
        Self {
            raster: Some(Arc::new(raster)),
            planar: Crs::UTM_32N,
            buffer_radius_m,
            fallback_reported: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Opens the DEM at `path`, if any. A missing or unreadable raster is
    /// logged and the sampler degrades to fallback-only.
    pub fn from_path(path: Option<&Path>, buffer_radius_m: f64) -> Self {
        let Some(path) = path else {
            warn!("No DEM configured; terrain features will use latitude fallbacks");
            return Self::fallback_only(buffer_radius_m);
        };
        match DemRaster::open(path) {
            Ok(raster) => {
                debug!(
                    "Loaded DEM {} ({}x{}, {})",
                    path.display(),
                    raster.width,
                    raster.height,
                    raster.crs
                );
                Self::with_raster(raster, buffer_radius_m)
            }
            Err(e) => {
                warn!(
                    "Could not open DEM {}: {}; terrain features will use latitude fallbacks",
                    path.display(),
                    e
                );
                Self::fallback_only(buffer_radius_m)
            }
        }
    }

    pub fn has_raster(&self) -> bool {
        self.raster.is_some()
    }

    /// Terrain features for `point` using the configured buffer radius.
    pub fn sample(&self, point: GeoPoint) -> TerrainFeatures {
        self.sample_within(point, self.buffer_radius_m)
    }

    /// Terrain features for `point` with an explicit buffer radius.
    /// Never fails: degraded cases return `TerrainFeatures::fallback`.
    pub fn sample_within(&self, point: GeoPoint, buffer_radius_m: f64) -> TerrainFeatures {
        if self.raster.is_none() {
            if !self.fallback_reported.swap(true, Ordering::Relaxed) {
                debug!("Terrain fallback from {} onward: no DEM loaded", point);
            }
            return TerrainFeatures::fallback(point.latitude);
        }
        match self.try_sample(point, buffer_radius_m) {
            Ok(features) => features,
            Err(e) => {
                warn!("Terrain fallback for {}: {}", point, e);
                TerrainFeatures::fallback(point.latitude)
            }
        }
    }

    /// Raster statistics for `point`, surfacing why they are unavailable.
    pub fn try_sample(
        &self,
        point: GeoPoint,
        buffer_radius_m: f64,
    ) -> Result<TerrainFeatures, TerrainError> {
        let raster = self.raster.as_ref().ok_or_else(|| {
            TerrainError::MissingGeoreference("no DEM loaded".to_string())
        })?;
        if !point.is_valid() {
            return Err(TerrainError::InvalidPoint(point));
        }

        let buffer = self.buffer_polygon(point, buffer_radius_m, &raster.crs);
        let window = raster.window(&buffer);
        terrain_statistics(&window)
    }

    /// Circle of `radius_m` around `point`, drawn in the planar CRS and
    /// expressed in `target` coordinates.
    fn buffer_polygon(&self, point: GeoPoint, radius_m: f64, target: &Crs) -> Polygon<f64> {
        let (cx, cy) = self.planar.from_lon_lat(point.longitude, point.latitude);
        let mut ring: Vec<(f64, f64)> = (0..BUFFER_VERTICES)
            .map(|i| {
                let theta = i as f64 / BUFFER_VERTICES as f64 * std::f64::consts::TAU;
                let x = cx + radius_m * theta.cos();
                let y = cy + radius_m * theta.sin();
                self.planar.transform_to(target, x, y)
            })
            .collect();
        if let Some(first) = ring.first().copied() {
            ring.push(first);
        }
        Polygon::new(LineString::from(ring), vec![])
    }
}

// ---------------------------------------------------------------------------
// Window statistics
// ---------------------------------------------------------------------------

/// Computes terrain statistics over a masked window.
///
/// The gradient is taken over the whole rectangular window (invalid cells
/// filled with the valid mean so they contribute a flat surface) and then
/// averaged over valid cells only. The same filled surface feeds the 3×3
/// mean filter used for roughness.
pub fn terrain_statistics(window: &ElevationWindow) -> Result<TerrainFeatures, TerrainError> {
    let valid: Vec<f64> = window.cells.iter().flatten().copied().collect();
    if valid.len() < MIN_VALID_CELLS {
        return Err(TerrainError::InsufficientCells {
            found: valid.len(),
            required: MIN_VALID_CELLS,
        });
    }

    let (mean, std) = mean_and_std(&valid);
    let filled: Vec<f64> = window.cells.iter().map(|c| c.unwrap_or(mean)).collect();
    let valid_idx: Vec<usize> = window
        .cells
        .iter()
        .enumerate()
        .filter_map(|(i, c)| c.map(|_| i))
        .collect();

    let (grad_rows, grad_cols) = gradient(&filled, window.rows, window.cols);
    let slope_sum: f64 = valid_idx
        .iter()
        .map(|&i| (grad_rows[i] * grad_rows[i] + grad_cols[i] * grad_cols[i]).sqrt())
        .sum();
    let slope_mean = slope_sum / valid_idx.len() as f64;

    let smooth = uniform_filter_3x3(&filled, window.rows, window.cols);
    let residuals: Vec<f64> = valid_idx.iter().map(|&i| filled[i] - smooth[i]).collect();
    let (_, roughness) = mean_and_std(&residuals);

    Ok(TerrainFeatures {
        elevation_mean: mean,
        elevation_std: std,
        slope_mean,
        roughness,
    })
}

/// Population mean and standard deviation.
fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Per-axis finite differences in cell units: central in the interior,
/// one-sided at the edges. An axis of length 1 has zero gradient.
fn gradient(grid: &[f64], rows: usize, cols: usize) -> (Vec<f64>, Vec<f64>) {
    let at = |r: usize, c: usize| grid[r * cols + c];
    let mut d_row = vec![0.0; rows * cols];
    let mut d_col = vec![0.0; rows * cols];

    for r in 0..rows {
        for c in 0..cols {
            let i = r * cols + c;
            if rows > 1 {
                d_row[i] = if r == 0 {
                    at(1, c) - at(0, c)
                } else if r == rows - 1 {
                    at(r, c) - at(r - 1, c)
                } else {
                    (at(r + 1, c) - at(r - 1, c)) / 2.0
                };
            }
            if cols > 1 {
                d_col[i] = if c == 0 {
                    at(r, 1) - at(r, 0)
                } else if c == cols - 1 {
                    at(r, c) - at(r, c - 1)
                } else {
                    (at(r, c + 1) - at(r, c - 1)) / 2.0
                };
            }
        }
    }
    (d_row, d_col)
}

/// 3×3 moving average with half-sample symmetric ("reflect") edges:
/// the neighbour beyond an edge is the edge cell itself.
pub fn uniform_filter_3x3(grid: &[f64], rows: usize, cols: usize) -> Vec<f64> {
    let reflect = |i: isize, n: usize| -> usize {
        if i < 0 {
            0
        } else if i as usize >= n {
            n - 1
        } else {
            i as usize
        }
    };

    let mut out = vec![0.0; rows * cols];
    for r in 0..rows {
        for c in 0..cols {
            let mut sum = 0.0;
            for dr in -1isize..=1 {
                for dc in -1isize..=1 {
                    let rr = reflect(r as isize + dr, rows);
                    let cc = reflect(c as isize + dc, cols);
                    sum += grid[rr * cols + cc];
                }
            }
            out[r * cols + c] = sum / 9.0;
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::dem::GeoTransform;
    use approx::assert_abs_diff_eq;

    fn window_from(rows: usize, cols: usize, values: Vec<f64>) -> ElevationWindow {
        ElevationWindow {
            rows,
            cols,
            cells: values.into_iter().map(Some).collect(),
        }
    }

    /// 40 x 40 cells of 50 m around Bergamo, elevation rising 2 m per column.
    fn tilted_raster() -> DemRaster {
        let (cx, cy) = Crs::UTM_32N.from_lon_lat(9.67, 45.69);
        let (width, height) = (40, 40);
        let data = (0..height)
            .flat_map(|_| (0..width).map(|c| 300.0 + 2.0 * c as f64))
            .collect();
        DemRaster {
            width,
            height,
            data,
            transform: GeoTransform {
                origin_x: cx - 1000.0,
                origin_y: cy + 1000.0,
                pixel_width: 50.0,
                pixel_height: 50.0,
            },
            crs: Crs::UTM_32N,
            nodata: Some(-9999.0),
        }
    }

    #[test]
    fn test_fallback_formulas() {
        let f = TerrainFeatures::fallback(46.4);
        assert_abs_diff_eq!(f.elevation_mean, 1700.0, epsilon = 1e-9);
        assert_abs_diff_eq!(f.elevation_std, 150.0);
        assert_abs_diff_eq!(f.slope_mean, 25.0, epsilon = 1e-9);
        assert_abs_diff_eq!(f.roughness, 20.0);
    }

    #[test]
    fn test_fallback_is_finite_for_nan_latitude() {
        let f = TerrainFeatures::fallback(f64::NAN);
        assert_eq!(f.elevation_mean, 200.0);
        assert_eq!(f.slope_mean, 5.0);
    }

    #[test]
    fn test_flat_window_has_zero_slope_and_roughness() {
        let window = window_from(4, 4, vec![250.0; 16]);
        let f = terrain_statistics(&window).unwrap();
        assert_abs_diff_eq!(f.elevation_mean, 250.0);
        assert_abs_diff_eq!(f.elevation_std, 0.0);
        assert_abs_diff_eq!(f.slope_mean, 0.0);
        assert_abs_diff_eq!(f.roughness, 0.0);
    }

    #[test]
    fn test_planar_ramp_has_constant_slope() {
        // z = 3 * col: gradient magnitude is 3 everywhere, including edges
        let values = (0..5).flat_map(|_| (0..5).map(|c| 3.0 * c as f64)).collect();
        let f = terrain_statistics(&window_from(5, 5, values)).unwrap();
        assert_abs_diff_eq!(f.slope_mean, 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(f.elevation_mean, 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_too_few_cells_is_an_error() {
        let mut window = window_from(3, 3, vec![100.0; 9]);
        window.cells[4] = None;
        assert!(matches!(
            terrain_statistics(&window),
            Err(TerrainError::InsufficientCells { found: 8, required: 10 })
        ));
    }

    #[test]
    fn test_uniform_filter_reflects_edges() {
        let grid = vec![1.0, 2.0, 3.0, 4.0];
        let out = uniform_filter_3x3(&grid, 2, 2);
        // Top-left neighbourhood under reflect: rows [0,0,1] x cols [0,0,1]
        let expected = (1.0 * 4.0 + 2.0 * 2.0 + 3.0 * 2.0 + 4.0) / 9.0;
        assert_abs_diff_eq!(out[0], expected, epsilon = 1e-12);
    }

    #[test]
    fn test_sampler_without_raster_returns_fallback() {
        let sampler = TerrainSampler::fallback_only(DEFAULT_BUFFER_RADIUS_M);
        let point = GeoPoint::new(45.9, 9.4);
        assert_eq!(sampler.sample(point), TerrainFeatures::fallback(45.9));
    }

    #[test]
    fn test_missing_raster_is_reported_once_across_clones() {
        let sampler = TerrainSampler::fallback_only(DEFAULT_BUFFER_RADIUS_M);
        let worker = sampler.clone();
        assert!(!sampler.fallback_reported.load(Ordering::Relaxed));

        worker.sample(GeoPoint::new(45.9, 9.4));
        assert!(sampler.fallback_reported.load(Ordering::Relaxed));
        assert_eq!(sampler.sample(GeoPoint::new(46.1, 9.8)), TerrainFeatures::fallback(46.1));

        let with_raster = TerrainSampler::with_raster(tilted_raster(), DEFAULT_BUFFER_RADIUS_M);
        with_raster.sample(GeoPoint::new(46.5, 11.0));
        assert!(!with_raster.fallback_reported.load(Ordering::Relaxed));
    }

    #[test]
    fn test_sampler_reads_raster_statistics() {
        let sampler = TerrainSampler::with_raster(tilted_raster(), DEFAULT_BUFFER_RADIUS_M);
        let f = sampler.try_sample(GeoPoint::new(45.69, 9.67), 500.0).unwrap();
        // Buffer is centred on the raster so mean stays near the middle column
        assert!((f.elevation_mean - 340.0).abs() < 5.0, "mean {}", f.elevation_mean);
        // Interior cells see the 2 m/cell ramp; rim cells border mean-filled cells
        assert!(f.slope_mean >= 1.0, "slope {}", f.slope_mean);
        assert!(f.elevation_std > 0.0);
    }

    #[test]
    fn test_sampler_outside_raster_falls_back() {
        let sampler = TerrainSampler::with_raster(tilted_raster(), DEFAULT_BUFFER_RADIUS_M);
        let far = GeoPoint::new(46.5, 11.0);
        assert_eq!(sampler.sample(far), TerrainFeatures::fallback(46.5));
    }

    #[test]
    fn test_sampler_invalid_point_falls_back() {
        let sampler = TerrainSampler::with_raster(tilted_raster(), DEFAULT_BUFFER_RADIUS_M);
        let bad = GeoPoint::new(f64::NAN, 9.67);
        let f = sampler.sample(bad);
        assert!(f.elevation_mean.is_finite());
    }

    #[test]
    fn test_from_missing_path_degrades() {
        let sampler = TerrainSampler::from_path(Some(Path::new("/nonexistent/dem.tif")), 500.0);
        assert!(!sampler.has_raster());
    }
}
