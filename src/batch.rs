// src/batch.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::acquire::SceneSource;
use crate::io::export_artifacts;
use crate::model::{Roi, RunParameters, RunRequest, TimeWindow};
use crate::pipeline::run_analysis;
use crate::risk::classify_risk;

#[derive(Deserialize, Debug)]
pub struct BatchConfig {
    #[serde(default)]
    pub global: GlobalParams,
    pub runs: Vec<RunEntry>,
}

#[derive(Deserialize, Debug, Default)]
pub struct GlobalParams {
    /// Baseline parameters for every run; per-run fields override these.
    #[serde(default)]
    pub parameters: RunParameters,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("reports")
}

#[derive(Deserialize, Debug)]
pub struct RunEntry {
    /// Label used for the run's artifact directory.
    pub name: String,
    /// GeoJSON Polygon (bare geometry or Feature).
    pub roi: serde_json::Value,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub cloud_filter_max_pct: Option<f64>,
    pub ndvi_loss_threshold: Option<f64>,
    pub min_initial_ndvi: Option<f64>,
    pub scale: Option<f64>,
}

impl RunEntry {
    fn parameters(&self, global: &RunParameters) -> RunParameters {
        RunParameters {
            cloud_filter_max_pct: self
                .cloud_filter_max_pct
                .unwrap_or(global.cloud_filter_max_pct),
            ndvi_loss_threshold: self
                .ndvi_loss_threshold
                .unwrap_or(global.ndvi_loss_threshold),
            min_initial_ndvi: self.min_initial_ndvi.unwrap_or(global.min_initial_ndvi),
            scale: self.scale.unwrap_or(global.scale),
            query_timeout_secs: global.query_timeout_secs,
        }
    }
}

/// Runs every analysis listed in a JSON batch config against one scene
/// source, exporting artifacts and a `report.json` per run.
pub fn process_batch(config_path: &Path, source: Arc<dyn SceneSource>) -> Result<()> {
    let config_content = fs::read_to_string(config_path)
        .with_context(|| format!("cannot read batch config {}", config_path.display()))?;
    let config: BatchConfig = serde_json::from_str(&config_content)
        .with_context(|| format!("malformed batch config {}", config_path.display()))?;

    println!("Starting batch processing with {} runs...", config.runs.len());

    for (i, entry) in config.runs.iter().enumerate() {
        println!("[{}/{}] Analyzing {}", i + 1, config.runs.len(), entry.name);

        let roi = Roi::from_geojson_value(&entry.roi)
            .with_context(|| format!("run {}: bad ROI", entry.name))?;
        let window = TimeWindow::new(entry.start_date, entry.end_date)
            .with_context(|| format!("run {}: bad window", entry.name))?;
        let request = RunRequest::new(roi, window, entry.parameters(&config.global.parameters));

        let result = run_analysis(Arc::clone(&source), &request)
            .with_context(|| format!("run {} failed", entry.name))?;

        let run_dir = config.global.output_dir.join(&entry.name);
        let artifacts = export_artifacts(&result, &run_dir)?;
        let report = result.to_report(&artifacts);
        fs::write(
            run_dir.join("report.json"),
            serde_json::to_string_pretty(&report)?,
        )?;

        let risk = classify_risk(result.stats.affected_area_ha)?;
        println!(
            "  {} -> {:.2} ha affected, {} polygon(s), risk {}",
            entry.name,
            result.stats.affected_area_ha,
            result.polygons.len(),
            risk
        );
    }

    println!("Batch processing complete!");
    Ok(())
}
