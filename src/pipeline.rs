// src/pipeline.rs
use std::sync::Arc;
use std::thread;

use chrono::Utc;
use log::{error, info};
use uuid::Uuid;

use crate::acquire::{acquire_composite, SceneSource};
use crate::error::{AnalysisError, RunFailure, RunStage};
use crate::model::{
    AnalysisResult, Composite, OutputRasters, RunMetadata, RunRequest, TimeWindow, SATELLITE,
};
use crate::processing::{aggregate, detect_loss, extract_polygons, ndvi};
use crate::raster::GridSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowKind {
    Before,
    After,
}

impl WindowKind {
    fn stage(self) -> RunStage {
        match self {
            WindowKind::Before => RunStage::AcquiringBefore,
            WindowKind::After => RunStage::AcquiringAfter,
        }
    }
}

/// Executes one full analysis run.
///
/// State machine: `pending -> acquiring_before -> acquiring_after ->
/// computing -> done`, with `failed` absorbing from any stage. The two
/// acquisitions are issued concurrently and joined fail-fast: the first
/// failure aborts the run and the surviving acquisition's result is
/// discarded on arrival. No retries happen here; a failed run goes back to
/// the caller, who may resubmit with adjusted parameters.
pub fn run_analysis(
    source: Arc<dyn SceneSource>,
    request: &RunRequest,
) -> Result<AnalysisResult, RunFailure> {
    let run_id = Uuid::new_v4();
    let fail = |stage: RunStage, error: AnalysisError| {
        if matches!(error, AnalysisError::Internal { .. }) {
            error!("run {run_id}: {stage} -> failed: {error}");
        } else {
            info!("run {run_id}: {stage} -> failed: {error}");
        }
        RunFailure::new(stage, error)
    };

    info!("run {run_id}: pending, window {}", request.window);
    request
        .parameters
        .validate()
        .map_err(|e| fail(RunStage::Pending, e))?;
    let (before_window, after_window) = request
        .window
        .split()
        .map_err(|e| fail(RunStage::Pending, e))?;
    let grid = GridSpec::cover(&request.roi, request.parameters.scale)
        .map_err(|e| fail(RunStage::Pending, e))?;
    info!(
        "run {run_id}: pending -> acquiring ({}x{} grid, before {before_window}, after {after_window})",
        grid.width, grid.height
    );

    let (before, after) =
        acquire_both(&source, request, &grid, before_window, after_window)
            .map_err(|(kind, e)| fail(kind.stage(), e))?;

    info!("run {run_id}: acquiring_after -> computing");
    let result = compute(run_id, request, grid, before, after)
        .map_err(|e| fail(RunStage::Computing, e))?;
    info!(
        "run {run_id}: computing -> done ({} ha affected, {} polygon(s))",
        result.stats.affected_area_ha,
        result.polygons.len()
    );
    Ok(result)
}

/// Runs the two sub-window acquisitions on worker threads and joins them
/// through a channel, first failure wins.
fn acquire_both(
    source: &Arc<dyn SceneSource>,
    request: &RunRequest,
    grid: &GridSpec,
    before_window: TimeWindow,
    after_window: TimeWindow,
) -> Result<(Composite, Composite), (WindowKind, AnalysisError)> {
    let (tx, rx) = flume::unbounded();
    for (kind, window) in [
        (WindowKind::Before, before_window),
        (WindowKind::After, after_window),
    ] {
        let tx = tx.clone();
        let source = Arc::clone(source);
        let roi = request.roi.clone();
        let grid = grid.clone();
        let params = request.parameters;
        thread::spawn(move || {
            let result = acquire_composite(source, &roi, &grid, &window, &params);
            let _ = tx.send((kind, result));
        });
    }
    drop(tx);

    let mut before = None;
    let mut after = None;
    for _ in 0..2 {
        let (kind, result) = rx.recv().map_err(|_| {
            (
                WindowKind::Before,
                AnalysisError::internal("acquisition workers vanished without reporting"),
            )
        })?;
        match (kind, result) {
            (WindowKind::Before, Ok(c)) => before = Some(c),
            (WindowKind::After, Ok(c)) => after = Some(c),
            (kind, Err(e)) => return Err((kind, e)),
        }
    }
    // Both arms filled after two successful receives.
    Ok((before.unwrap(), after.unwrap()))
}

fn compute(
    run_id: Uuid,
    request: &RunRequest,
    grid: GridSpec,
    before: Composite,
    after: Composite,
) -> Result<AnalysisResult, AnalysisError> {
    if before.grid != after.grid {
        return Err(AnalysisError::internal(format!(
            "composite grids diverged: before {:?} vs after {:?}",
            before.grid.shape(),
            after.grid.shape()
        )));
    }

    let before_ndvi = ndvi(&before);
    let after_ndvi = ndvi(&after);
    let change = detect_loss(&before_ndvi, &after_ndvi, &request.parameters)?;
    let (stats, quality) = aggregate(
        &change.loss,
        &before_ndvi,
        &after_ndvi,
        &before,
        &after,
        request.parameters.scale,
    );
    let polygons = extract_polygons(&change.loss, &grid);

    let metadata = RunMetadata {
        satellite: SATELLITE.to_string(),
        run_id,
        processing_date: Utc::now(),
        before_period: before.window.to_string(),
        after_period: after.window.to_string(),
        parameters: request.parameters,
    };

    Ok(AnalysisResult {
        run_id,
        stats,
        quality,
        polygons,
        metadata,
        outputs: OutputRasters {
            grid,
            before: before.bands,
            after: after.bands,
            delta_ndvi: change.delta,
        },
    })
}
