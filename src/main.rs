// src/main.rs
use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::{Builder, Env};
use log::info;

use canopy_watch::acquire::SceneCatalog;
use canopy_watch::batch;
use canopy_watch::cli::{Cli, Commands};
use canopy_watch::io::export_artifacts;
use canopy_watch::model::{Roi, RunParameters, RunRequest, TimeWindow};
use canopy_watch::pipeline::run_analysis;
use canopy_watch::risk::classify_risk;

fn main() -> Result<()> {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_secs();
    builder.init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Run {
            catalog,
            roi,
            start,
            end,
            cloud_max,
            loss_threshold,
            min_ndvi,
            scale,
            query_timeout,
        } => {
            let source = Arc::new(SceneCatalog::open(catalog)?);
            let roi_raw = fs::read_to_string(roi)
                .with_context(|| format!("cannot read ROI file {}", roi.display()))?;
            let request = RunRequest::new(
                Roi::from_geojson_str(&roi_raw)?,
                TimeWindow::new(*start, *end)?,
                RunParameters {
                    cloud_filter_max_pct: *cloud_max,
                    ndvi_loss_threshold: *loss_threshold,
                    min_initial_ndvi: *min_ndvi,
                    scale: *scale,
                    query_timeout_secs: *query_timeout,
                },
            );

            let result = run_analysis(source, &request)?;
            let artifacts = export_artifacts(&result, &cli.output)?;
            let report = result.to_report(&artifacts);
            let report_path = cli.output.join("report.json");
            fs::write(&report_path, serde_json::to_string_pretty(&report)?)?;

            let risk = classify_risk(result.stats.affected_area_ha)?;
            info!(
                "affected area {:.2} ha across {} polygon(s), risk {}",
                result.stats.affected_area_ha,
                result.polygons.len(),
                risk
            );
            println!("Analysis complete: {}", report_path.display());
        }
        Commands::Batch { catalog, config } => {
            let source = Arc::new(SceneCatalog::open(catalog)?);
            batch::process_batch(config, source)?;
        }
    }

    Ok(())
}
