// src/io/mod.rs
pub mod geojson;

#[cfg(feature = "catalog")]
pub mod writer;

use std::path::Path;

use anyhow::Result;

use crate::model::{AnalysisResult, ArtifactPaths};

/// Writes all exportable artifacts of a finished run under `dir` and returns
/// their locations. The loss-polygon GeoJSON is always produced; the raster
/// artifacts (before/after RGB, delta NDVI) need the GDAL-backed `catalog`
/// feature.
pub fn export_artifacts(result: &AnalysisResult, dir: &Path) -> Result<ArtifactPaths> {
    std::fs::create_dir_all(dir)?;
    let mut paths = ArtifactPaths::default();

    let polygons_path = dir.join("loss_polygons.geojson");
    geojson::write_loss_polygons(&result.polygons, &polygons_path)?;
    paths.loss_polygons = Some(polygons_path);

    #[cfg(feature = "catalog")]
    {
        let before_path = dir.join("before_rgb.tif");
        writer::write_rgb_geotiff(&result.outputs.before, &result.outputs.grid, &before_path)?;
        paths.before_rgb = Some(before_path);

        let after_path = dir.join("after_rgb.tif");
        writer::write_rgb_geotiff(&result.outputs.after, &result.outputs.grid, &after_path)?;
        paths.after_rgb = Some(after_path);

        let delta_path = dir.join("delta_ndvi.tif");
        writer::write_delta_geotiff(&result.outputs.delta_ndvi, &result.outputs.grid, &delta_path)?;
        paths.delta_ndvi = Some(delta_path);
    }

    Ok(paths)
}
