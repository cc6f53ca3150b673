// src/acquire/mod.rs
pub mod memory;

#[cfg(feature = "catalog")]
pub mod catalog;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info};
use rayon::prelude::*;

use crate::error::AnalysisError;
use crate::model::{BandSet, Composite, Roi, RunParameters, Scene, TimeWindow};
use crate::raster::{GridSpec, Raster};

pub use memory::MemoryScenes;

#[cfg(feature = "catalog")]
pub use catalog::SceneCatalog;

/// Read-only gateway to a satellite scene archive.
///
/// Implementations resample every returned scene onto `grid` and fill its
/// per-pixel validity mask; whether they also pre-filter on `max_cloud_pct`
/// is up to them, the acquisition step re-applies the scene-level filter
/// either way.
pub trait SceneSource: Send + Sync {
    fn query(
        &self,
        grid: &GridSpec,
        window: &TimeWindow,
        max_cloud_pct: f64,
    ) -> Result<Vec<Scene>, AnalysisError>;
}

/// Queries the source with a bounded wait and builds the cloud-filtered
/// median composite for one sub-window.
///
/// Fails with `NoImageryFound` when no scene passes the scene-level cloud
/// filter, and with `UpstreamTimeout` when the source does not answer within
/// `params.query_timeout_secs`; a late answer is discarded on arrival.
pub fn acquire_composite(
    source: Arc<dyn SceneSource>,
    roi: &Roi,
    grid: &GridSpec,
    window: &TimeWindow,
    params: &RunParameters,
) -> Result<Composite, AnalysisError> {
    let (tx, rx) = flume::bounded(1);
    {
        let source = Arc::clone(&source);
        let grid = grid.clone();
        let window = *window;
        let max_cloud_pct = params.cloud_filter_max_pct;
        thread::spawn(move || {
            let _ = tx.send(source.query(&grid, &window, max_cloud_pct));
        });
    }

    let scenes = match rx.recv_timeout(Duration::from_secs(params.query_timeout_secs)) {
        Ok(result) => result?,
        Err(_) => {
            return Err(AnalysisError::UpstreamTimeout {
                window: *window,
                waited_secs: params.query_timeout_secs,
            })
        }
    };
    debug!("source returned {} candidate scenes for {window}", scenes.len());

    let kept: Vec<Scene> = scenes
        .into_iter()
        .filter(|s| s.cloud_cover_pct <= params.cloud_filter_max_pct)
        .collect();
    if kept.is_empty() {
        return Err(AnalysisError::NoImageryFound {
            window: *window,
            max_cloud_pct: params.cloud_filter_max_pct,
        });
    }
    for scene in &kept {
        if scene.bands.shape() != grid.shape() || !scene.valid.matches_grid(grid) {
            return Err(AnalysisError::internal(format!(
                "scene {} is not on the run grid: {:?} vs {:?}",
                scene.id,
                scene.bands.shape(),
                grid.shape()
            )));
        }
    }

    info!(
        "compositing {} scene(s) for {window} at {} m/px",
        kept.len(),
        grid.scale_m
    );
    Ok(composite_scenes(&kept, roi, grid, window))
}

/// Per-pixel, per-band median over the valid samples of the given scenes.
/// Pixels outside the ROI, or with zero valid samples, come out NaN.
pub fn composite_scenes(
    scenes: &[Scene],
    roi: &Roi,
    grid: &GridSpec,
    window: &TimeWindow,
) -> Composite {
    assert!(!scenes.is_empty(), "composite needs at least one scene");

    let mut roi_mask = vec![false; grid.len()];
    roi_mask
        .par_iter_mut()
        .enumerate()
        .for_each(|(i, inside)| {
            let (lon, lat) = grid.pixel_center(i % grid.width, i / grid.width);
            *inside = roi.contains(lon, lat);
        });

    let composite_band = |pick: fn(&BandSet) -> &Raster<f32>| -> Raster<f32> {
        let mut out = vec![f32::NAN; grid.len()];
        out.par_iter_mut().enumerate().for_each(|(i, value)| {
            if !roi_mask[i] {
                return;
            }
            let mut samples: Vec<f32> = Vec::with_capacity(scenes.len());
            for scene in scenes {
                if scene.valid.data()[i] {
                    let v = pick(&scene.bands).data()[i];
                    if v.is_finite() {
                        samples.push(v);
                    }
                }
            }
            if !samples.is_empty() {
                *value = median(&mut samples);
            }
        });
        Raster::from_vec(grid.width, grid.height, out)
    };

    let bands = BandSet {
        blue: composite_band(|b| &b.blue),
        green: composite_band(|b| &b.green),
        red: composite_band(|b| &b.red),
        nir: composite_band(|b| &b.nir),
    };

    let avg_cloud_cover_pct =
        scenes.iter().map(|s| s.cloud_cover_pct).sum::<f64>() / scenes.len() as f64;

    Composite {
        grid: grid.clone(),
        window: *window,
        bands,
        scene_count: scenes.len(),
        avg_cloud_cover_pct,
    }
}

/// Median of a non-empty sample set; averages the two middle values for an
/// even count. Sorts in place.
fn median(samples: &mut [f32]) -> f32 {
    samples.sort_by(|a, b| a.partial_cmp(b).expect("NaN filtered before median"));
    let n = samples.len();
    if n % 2 == 1 {
        samples[n / 2]
    } else {
        (samples[n / 2 - 1] + samples[n / 2]) / 2.0
    }
}
