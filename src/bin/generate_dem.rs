//! Synthetic DEM Generator
//!
//! Writes a smoothed, north-rising elevation surface over the study area as
//! a single-band WGS84 GeoTIFF. Useful for demos and for exercising the
//! terrain features when no real DEM is available.
//!
//! Usage:
//!   cargo run --bin generate_dem -- --output data/dem/synthetic_dem.tif
//!   cargo run --bin generate_dem -- --width 600 --height 300 --seed 7

use clap::Parser;
use std::path::PathBuf;

use georisk_service::config::{load_config, resolve_config_path};
use georisk_service::ingest::dem::{synthetic_dem, write_geotiff};
use georisk_service::model::StudyArea;

#[derive(Debug, Parser)]
#[command(name = "generate_dem", about = "Write a synthetic DEM GeoTIFF")]
struct Args {
    /// Output GeoTIFF path
    #[arg(long, default_value = "data/dem/synthetic_dem.tif")]
    output: PathBuf,

    /// Raster width in cells
    #[arg(long, default_value_t = 300)]
    width: usize,

    /// Raster height in cells
    #[arg(long, default_value_t = 150)]
    height: usize,

    /// Noise seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Configuration file supplying the study area bounds
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    println!("⛰️  Synthetic DEM Generator");
    println!("===========================\n");

    let config_path = resolve_config_path(args.config.as_deref());
    let area = match load_config(&config_path) {
        Ok(config) => config.prediction.bounds,
        Err(e) => {
            eprintln!("   Could not load {}: {}", config_path.display(), e);
            eprintln!("   Using default Lombardy bounds\n");
            StudyArea::default()
        }
    };

    if args.width < 3 || args.height < 3 {
        return Err("raster must be at least 3x3 cells".into());
    }

    println!(
        "📐 {}x{} cells over lat {}..{}, lon {}..{}",
        args.width, args.height, area.lat_min, area.lat_max, area.lon_min, area.lon_max
    );
    let raster = synthetic_dem(&area, args.width, args.height, args.seed);

    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    write_geotiff(&args.output, &raster)?;
    println!("✓ DEM written to {}", args.output.display());
    Ok(())
}
