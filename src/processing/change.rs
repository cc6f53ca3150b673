// src/processing/change.rs
use rayon::prelude::*;

use crate::error::AnalysisError;
use crate::model::RunParameters;
use crate::raster::Raster;

/// Delta raster and the loss mask derived from it.
#[derive(Debug, Clone)]
pub struct ChangeMaps {
    /// After-NDVI minus before-NDVI, in [-2, 2], NaN where either side has
    /// no data.
    pub delta: Raster<f32>,
    /// True only where the pixel was vegetated before AND dropped below the
    /// loss threshold; neither condition alone flags a pixel.
    pub loss: Raster<bool>,
}

/// Differences the two index rasters and applies the conjunctive loss rule
/// `before > min_initial_ndvi && delta < ndvi_loss_threshold`.
///
/// A grid mismatch between the rasters is a fatal configuration error, never
/// silently tolerated: acquisition must have built both composites over the
/// identical grid.
pub fn detect_loss(
    before: &Raster<f32>,
    after: &Raster<f32>,
    params: &RunParameters,
) -> Result<ChangeMaps, AnalysisError> {
    if before.shape() != after.shape() {
        return Err(AnalysisError::internal(format!(
            "index raster grid mismatch: before {:?} vs after {:?}",
            before.shape(),
            after.shape()
        )));
    }

    let (width, height) = before.shape();
    let before_data = before.data();
    let after_data = after.data();
    let min_initial = params.min_initial_ndvi as f32;
    let loss_threshold = params.ndvi_loss_threshold as f32;

    let mut delta = vec![f32::NAN; width * height];
    delta.par_iter_mut().enumerate().for_each(|(i, d)| {
        *d = after_data[i] - before_data[i];
    });

    let mut loss = vec![false; width * height];
    loss.par_iter_mut().enumerate().for_each(|(i, flagged)| {
        // NaN comparisons are false, so no-data pixels never register loss.
        *flagged = before_data[i] > min_initial && delta[i] < loss_threshold;
    });

    Ok(ChangeMaps {
        delta: Raster::from_vec(width, height, delta),
        loss: Raster::from_vec(width, height, loss),
    })
}
