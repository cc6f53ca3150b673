// src/cli.rs
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "canopy-watch")]
#[command(about = "Deforestation change detection over satellite scene catalogs")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory for exported artifacts and reports
    #[arg(short, long, default_value = "reports", global = true)]
    pub output: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze one project site over a date window
    Run {
        /// Scene catalog directory (GeoTIFFs plus index.json)
        #[arg(long)]
        catalog: PathBuf,

        /// GeoJSON file with the project boundary polygon
        #[arg(long)]
        roi: PathBuf,

        /// Window start date (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,

        /// Window end date (YYYY-MM-DD)
        #[arg(long)]
        end: NaiveDate,

        /// Maximum acceptable per-scene cloud cover, percent
        #[arg(long, default_value = "30")]
        cloud_max: f64,

        /// NDVI delta below which a pixel counts as loss
        #[arg(long, default_value = "-0.2", allow_hyphen_values = true)]
        loss_threshold: f64,

        /// Minimum before-NDVI for a pixel to count as vegetated
        #[arg(long, default_value = "0.6")]
        min_ndvi: f64,

        /// Raster resolution in meters per pixel
        #[arg(long, default_value = "10")]
        scale: f64,

        /// Bounded wait on the catalog per sub-window query, seconds
        #[arg(long, default_value = "60")]
        query_timeout: u64,
    },

    /// Run several analyses from a JSON batch config
    Batch {
        /// Scene catalog directory (GeoTIFFs plus index.json)
        #[arg(long)]
        catalog: PathBuf,

        /// Batch configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}
