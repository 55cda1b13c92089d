//! Georisk Service - Risk Scoring Pipeline
//!
//! A batch job that:
//! 1. Loads historical landslide/flood events (file or built-in demo set)
//! 2. Trains (or loads) the gradient-boosted risk model
//! 3. Scores a regular grid over the study area
//! 4. Classifies each point into an alert tier and labels it with the
//!    nearest provincial capital
//! 5. Writes the results as GeoJSON
//!
//! Usage:
//!   cargo run --release                              # train if needed, then predict
//!   cargo run --release -- --step train --force-retrain
//!   cargo run --release -- --step predict --offline  # no weather requests
//!
//! Environment:
//!   GEORISK_CONFIG - configuration file (default: georisk.toml)
//!   RUST_LOG       - log filter (default: info)

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use chrono::Utc;
use georisk_service::alert::AlertTier;
use georisk_service::config::{load_config, resolve_config_path};
use georisk_service::export::write_geojson;
use georisk_service::pipeline::Pipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Step {
    Train,
    Predict,
    All,
}

#[derive(Debug, Parser)]
#[command(name = "georisk_service", about = "Hydrogeological risk scoring for Lombardy")]
struct Cli {
    /// Configuration file (falls back to GEORISK_CONFIG, then georisk.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pipeline stage to run
    #[arg(long, value_enum, default_value_t = Step::All)]
    step: Step,

    /// Retrain even when a saved model exists
    #[arg(long)]
    force_retrain: bool,

    /// Skip weather requests and use fallback precipitation
    #[arg(long)]
    offline: bool,
}

fn main() {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    println!("⛰️  Georisk Sentinel");
    println!("====================\n");

    if let Err(e) = run(&cli) {
        eprintln!("\n❌ Pipeline failed: {}\n", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = resolve_config_path(cli.config.as_deref());
    println!("📋 Loading configuration from {}...", config_path.display());
    let config = load_config(&config_path)?;
    println!("✓ {} reference localities\n", config.localities.len());

    let predictions_dir = config.paths.predictions_dir.clone();
    let mut pipeline = Pipeline::from_config(config, cli.offline)?;

    // Predict alone never retrains a readable model
    let force_retrain = cli.force_retrain && cli.step != Step::Predict;
    println!("🧠 Preparing model...");
    match pipeline.train_or_load(force_retrain)? {
        Some(metrics) => print_metrics(&metrics),
        None => println!("✓ Using saved model {}\n", pipeline.config().paths.model_artifact.display()),
    }
    if cli.step == Step::Train {
        return Ok(());
    }

    let today = Utc::now().date_naive();
    println!("🗺️  Scoring prediction grid...");
    let records = pipeline.predict_grid(today)?;
    println!("✓ {} points scored\n", records.len());

    for tier in AlertTier::ALL.iter().rev() {
        let count = records.iter().filter(|r| r.alert_level == *tier).count();
        println!("   {:<7} {}", tier.as_str(), count);
    }

    let mut ranked: Vec<_> = records.iter().collect();
    ranked.sort_by(|a, b| b.risk_score.total_cmp(&a.risk_score));
    println!("\n🔝 Highest risk points:");
    for record in ranked.iter().take(5) {
        println!(
            "   {:>5.1}  {:<6} {} ({}) at {}",
            record.risk_score,
            record.alert_level.as_str(),
            record.locality,
            record.province,
            record.point
        );
    }

    let path = write_geojson(&records, &predictions_dir, today)?;
    println!("\n💾 Predictions written to {}", path.display());
    Ok(())
}

fn print_metrics(metrics: &georisk_service::risk_model::TrainingMetrics) {
    println!(
        "✓ Trained on {} samples ({} held out): R²={:.3} RMSE={:.2} MAE={:.2}\n",
        metrics.training_samples, metrics.test_samples, metrics.test_r2, metrics.test_rmse, metrics.test_mae
    );
}
