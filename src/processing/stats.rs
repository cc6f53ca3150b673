// src/processing/stats.rs
use crate::model::{Composite, Quality, Stats};
use crate::raster::Raster;

/// Rounds to `dp` decimal places for stable, reproducible reporting.
pub fn round_dp(value: f64, dp: i32) -> f64 {
    let factor = 10f64.powi(dp);
    (value * factor).round() / factor
}

/// Arithmetic mean over the non-NaN pixels of an index raster; 0.0 when
/// every pixel is no-data (a valid-but-empty region is not a failure).
fn mean_ignoring_nodata(raster: &Raster<f32>) -> f64 {
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for &v in raster.data() {
        if !v.is_nan() {
            sum += v as f64;
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Reduces the loss mask and the two index rasters to the run's scalar
/// metrics.
///
/// Area is `true_count x scale^2` square meters converted to hectares (2
/// decimals); index means round to 3 decimals; the cloud percentage is the
/// unweighted mean of the two per-period averages (1 decimal), matching the
/// upstream reporting convention rather than a scene-weighted mean.
pub fn aggregate(
    loss: &Raster<bool>,
    before_ndvi: &Raster<f32>,
    after_ndvi: &Raster<f32>,
    before: &Composite,
    after: &Composite,
    scale_m: f64,
) -> (Stats, Quality) {
    let affected_area_m2 = loss.count_true() as f64 * scale_m * scale_m;
    let stats = Stats {
        affected_area_ha: round_dp(affected_area_m2 / 10_000.0, 2),
        mean_ndvi_before: round_dp(mean_ignoring_nodata(before_ndvi), 3),
        mean_ndvi_after: round_dp(mean_ignoring_nodata(after_ndvi), 3),
    };
    let quality = Quality {
        observations_used: before.scene_count + after.scene_count,
        avg_cloud_cover_pct: round_dp(
            (before.avg_cloud_cover_pct + after.avg_cloud_cover_pct) / 2.0,
            1,
        ),
    };
    (stats, quality)
}
