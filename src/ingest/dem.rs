//! Digital elevation model (DEM) rasters.
//!
//! Reads and writes single-band, north-up GeoTIFFs:
//!   - georeferencing from `ModelPixelScale` + `ModelTiepoint`
//!     (cells are treated as areas, i.e. `PixelIsArea`)
//!   - CRS from the GeoKey directory (`ProjectedCSTypeGeoKey` or
//!     `GeographicTypeGeoKey`), resolved through `features::projection::Crs`
//!   - no-data from the GDAL no-data tag, when present
//!
//! Also builds the synthetic demonstration DEM used when no real elevation
//! model is configured.

use geo::{BoundingRect, Intersects, Polygon, Rect, coord};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tiff::ColorType;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{TiffEncoder, colortype};
use tiff::tags::Tag;

use crate::features::projection::Crs;
use crate::features::terrain::uniform_filter_3x3;
use crate::model::{GeoPoint, StudyArea};

// GeoKey identifiers (GeoTIFF 1.0 spec, section 6.2)
const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

/// No-data value written into synthetic rasters.
pub const SYNTHETIC_NODATA: f64 = -9999.0;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while reading a raster or sampling terrain from it.
#[derive(Debug, thiserror::Error)]
pub enum TerrainError {
    #[error("raster I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("raster is not georeferenced: {0}")]
    MissingGeoreference(String),

    #[error("unsupported raster CRS EPSG:{0}")]
    UnsupportedCrs(u32),

    #[error("unsupported raster layout: {0}")]
    UnsupportedLayout(String),

    #[error("point outside valid coordinate range: {0}")]
    InvalidPoint(GeoPoint),

    #[error("insufficient elevation cells in buffer ({found} < {required})")]
    InsufficientCells { found: usize, required: usize },
}

// ---------------------------------------------------------------------------
// Raster types
// ---------------------------------------------------------------------------

/// Affine placement of a north-up raster: the top-left corner of cell (0, 0)
/// and the cell size in CRS units. Rows grow southwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Footprint of one cell in CRS coordinates.
    pub fn cell_rect(&self, row: usize, col: usize) -> Rect<f64> {
        let x0 = self.origin_x + col as f64 * self.pixel_width;
        let y0 = self.origin_y - row as f64 * self.pixel_height;
        Rect::new(
            coord! { x: x0, y: y0 - self.pixel_height },
            coord! { x: x0 + self.pixel_width, y: y0 },
        )
    }

    /// Fractional column containing `x`.
    fn col_of(&self, x: f64) -> f64 {
        ((x - self.origin_x) / self.pixel_width).floor()
    }

    /// Fractional row containing `y`.
    fn row_of(&self, y: f64) -> f64 {
        ((self.origin_y - y) / self.pixel_height).floor()
    }
}

/// A single-band elevation raster held in memory, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct DemRaster {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f64>,
    pub transform: GeoTransform,
    pub crs: Crs,
    pub nodata: Option<f64>,
}

/// The cells of a raster window, row-major. `None` marks cells outside the
/// mask or carrying the no-data value.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationWindow {
    pub rows: usize,
    pub cols: usize,
    pub cells: Vec<Option<f64>>,
}

impl ElevationWindow {
    pub fn empty() -> Self {
        Self { rows: 0, cols: 0, cells: Vec::new() }
    }

    pub fn valid_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }
}

impl DemRaster {
    /// Opens a GeoTIFF from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TerrainError> {
        let file = File::open(path.as_ref())?;
        let mut decoder = Decoder::new(BufReader::new(file))?;

        let (width, height) = decoder.dimensions()?;
        match decoder.colortype()? {
            ColorType::Gray(_) => {}
            other => {
                return Err(TerrainError::UnsupportedLayout(format!(
                    "expected a single-band raster, found {:?}",
                    other
                )));
            }
        }

        let scale = decoder
            .get_tag_f64_vec(Tag::ModelPixelScaleTag)
            .map_err(|e| TerrainError::MissingGeoreference(format!("ModelPixelScale: {}", e)))?;
        let tiepoint = decoder
            .get_tag_f64_vec(Tag::ModelTiepointTag)
            .map_err(|e| TerrainError::MissingGeoreference(format!("ModelTiepoint: {}", e)))?;
        let geokeys = decoder
            .get_tag_u16_vec(Tag::GeoKeyDirectoryTag)
            .map_err(|e| TerrainError::MissingGeoreference(format!("GeoKeyDirectory: {}", e)))?;
        let nodata = decoder
            .get_tag_ascii_string(Tag::GdalNodata)
            .ok()
            .and_then(|s| s.trim().trim_end_matches('\0').parse::<f64>().ok());

        if scale.len() < 2 || tiepoint.len() < 6 {
            return Err(TerrainError::MissingGeoreference(
                "pixel scale or tiepoint too short".to_string(),
            ));
        }
        let (pixel_width, pixel_height) = (scale[0], scale[1]);
        if !(pixel_width > 0.0 && pixel_height > 0.0) {
            return Err(TerrainError::UnsupportedLayout(format!(
                "non-positive pixel scale ({}, {})",
                pixel_width, pixel_height
            )));
        }
        let transform = GeoTransform {
            origin_x: tiepoint[3] - tiepoint[0] * pixel_width,
            origin_y: tiepoint[4] + tiepoint[1] * pixel_height,
            pixel_width,
            pixel_height,
        };
        let crs = crs_from_geokeys(&geokeys)?;

        let data: Vec<f64> = match decoder.read_image()? {
            DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::F64(v) => v,
            DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
            _ => {
                return Err(TerrainError::UnsupportedLayout(
                    "unsupported sample format".to_string(),
                ));
            }
        };

        let (width, height) = (width as usize, height as usize);
        if data.len() != width * height {
            return Err(TerrainError::UnsupportedLayout(format!(
                "expected {} samples, decoded {}",
                width * height,
                data.len()
            )));
        }

        Ok(Self { width, height, data, transform, crs, nodata })
    }

    fn is_nodata(&self, value: f64) -> bool {
        if !value.is_finite() {
            return true;
        }
        match self.nodata {
            Some(nd) if nd.is_nan() => false,
            Some(nd) => value == nd,
            None => false,
        }
    }

    /// Extracts every cell whose footprint touches `mask` (a polygon in this
    /// raster's CRS). Partially covered cells are included.
    pub fn window(&self, mask: &Polygon<f64>) -> ElevationWindow {
        let Some(bbox) = mask.bounding_rect() else {
            return ElevationWindow::empty();
        };

        let col_lo = self.transform.col_of(bbox.min().x);
        let col_hi = self.transform.col_of(bbox.max().x);
        let row_lo = self.transform.row_of(bbox.max().y);
        let row_hi = self.transform.row_of(bbox.min().y);

        let (w, h) = (self.width as f64, self.height as f64);
        if !(col_lo.is_finite() && col_hi.is_finite() && row_lo.is_finite() && row_hi.is_finite())
            || col_hi < 0.0
            || row_hi < 0.0
            || col_lo >= w
            || row_lo >= h
        {
            return ElevationWindow::empty();
        }

        let col_start = col_lo.max(0.0) as usize;
        let col_end = col_hi.min(w - 1.0) as usize;
        let row_start = row_lo.max(0.0) as usize;
        let row_end = row_hi.min(h - 1.0) as usize;

        let rows = row_end - row_start + 1;
        let cols = col_end - col_start + 1;
        let mut cells = Vec::with_capacity(rows * cols);

        for row in row_start..=row_end {
            for col in col_start..=col_end {
                let value = self.data[row * self.width + col];
                let touched = mask.intersects(&self.transform.cell_rect(row, col));
                cells.push(if touched && !self.is_nodata(value) { Some(value) } else { None });
            }
        }

        ElevationWindow { rows, cols, cells }
    }
}

/// Resolves the raster CRS from a GeoKey directory
/// (header `[version, revision, minor, count]` followed by `count` entries of
/// `[key_id, tiff_tag_location, count, value]`).
fn crs_from_geokeys(keys: &[u16]) -> Result<Crs, TerrainError> {
    if keys.len() < 4 {
        return Err(TerrainError::MissingGeoreference(
            "GeoKey directory header truncated".to_string(),
        ));
    }

    let mut model_type = None;
    let mut projected = None;
    let mut geographic = None;

    for entry in keys[4..].chunks_exact(4).take(keys[3] as usize) {
        // Values stored in other tags (location != 0) are never CRS codes we use
        if entry[1] != 0 {
            continue;
        }
        match entry[0] {
            GT_MODEL_TYPE_GEO_KEY => model_type = Some(entry[3]),
            PROJECTED_CS_TYPE_GEO_KEY => projected = Some(entry[3] as u32),
            GEOGRAPHIC_TYPE_GEO_KEY => geographic = Some(entry[3] as u32),
            _ => {}
        }
    }

    if let Some(code) = projected {
        return Crs::from_epsg(code).ok_or(TerrainError::UnsupportedCrs(code));
    }
    if let Some(code) = geographic {
        return Crs::from_epsg(code).ok_or(TerrainError::UnsupportedCrs(code));
    }
    if model_type == Some(MODEL_TYPE_GEOGRAPHIC) {
        return Ok(Crs::Wgs84);
    }
    Err(TerrainError::MissingGeoreference(
        "GeoKey directory declares no CRS".to_string(),
    ))
}

fn geokeys_for(crs: Crs) -> Vec<u16> {
    let (model_type, crs_key) = match crs {
        Crs::Wgs84 => (MODEL_TYPE_GEOGRAPHIC, GEOGRAPHIC_TYPE_GEO_KEY),
        Crs::Utm { .. } => (MODEL_TYPE_PROJECTED, PROJECTED_CS_TYPE_GEO_KEY),
    };
    vec![
        1, 1, 0, 3,
        GT_MODEL_TYPE_GEO_KEY, 0, 1, model_type,
        GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_AREA,
        crs_key, 0, 1, crs.epsg() as u16,
    ]
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Writes `raster` as a 32-bit float GeoTIFF.
pub fn write_geotiff<P: AsRef<Path>>(path: P, raster: &DemRaster) -> Result<(), TerrainError> {
    let file = File::create(path.as_ref())?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file))?;
    let mut image =
        encoder.new_image::<colortype::Gray32Float>(raster.width as u32, raster.height as u32)?;

    let t = raster.transform;
    let scale = [t.pixel_width, t.pixel_height, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0];
    let geokeys = geokeys_for(raster.crs);

    image.encoder().write_tag(Tag::ModelPixelScaleTag, &scale[..])?;
    image.encoder().write_tag(Tag::ModelTiepointTag, &tiepoint[..])?;
    image.encoder().write_tag(Tag::GeoKeyDirectoryTag, &geokeys[..])?;
    if let Some(nodata) = raster.nodata {
        let text = format!("{}", nodata);
        image.encoder().write_tag(Tag::GdalNodata, text.as_str())?;
    }

    let samples: Vec<f32> = raster.data.iter().map(|v| *v as f32).collect();
    image.write_data(&samples)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Synthetic DEM
// ---------------------------------------------------------------------------

/// Builds a demonstration DEM over `area` in geographic coordinates:
/// elevation rises northwards (≈1500 m per degree of latitude from a 100 m
/// plain), with seeded noise, a 3×3 mean smoothing pass, and a 50 m floor.
pub fn synthetic_dem(area: &StudyArea, width: usize, height: usize, seed: u64) -> DemRaster {
    let mut rng = StdRng::seed_from_u64(seed);
    let pixel_width = (area.lon_max - area.lon_min) / width as f64;
    let pixel_height = (area.lat_max - area.lat_min) / height as f64;

    let mut elevation = Vec::with_capacity(width * height);
    for row in 0..height {
        let lat = area.lat_max - (row as f64 + 0.5) * pixel_height;
        for _ in 0..width {
            let noise: f64 = rng.gen_range(-50.0..50.0);
            elevation.push(100.0 + (lat - area.lat_min) * 1500.0 + noise);
        }
    }

    let data = uniform_filter_3x3(&elevation, height, width)
        .into_iter()
        .map(|v| v.max(50.0))
        .collect();

    DemRaster {
        width,
        height,
        data,
        transform: GeoTransform {
            origin_x: area.lon_min,
            origin_y: area.lat_max,
            pixel_width,
            pixel_height,
        },
        crs: Crs::Wgs84,
        nodata: Some(SYNTHETIC_NODATA),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
