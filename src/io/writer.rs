// src/io/writer.rs
use std::path::Path;

use anyhow::Result;
use gdal::raster::{Buffer, RasterCreationOptions};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};

use crate::model::BandSet;
use crate::raster::{GridSpec, Raster};

const NODATA_VALUE_FLOAT: f64 = -999.0;

fn creation_options() -> RasterCreationOptions {
    RasterCreationOptions::from_iter(["COMPRESS=DEFLATE", "TILED=YES", "NUM_THREADS=ALL_CPUS"])
}

fn apply_georeference(dataset: &mut Dataset, grid: &GridSpec) -> Result<()> {
    dataset.set_geo_transform(&[
        grid.west,
        grid.lon_step,
        0.0,
        grid.north,
        0.0,
        -grid.lat_step,
    ])?;
    dataset.set_projection(&SpatialRef::from_epsg(4326)?.to_wkt()?)?;
    Ok(())
}

/// Writes the delta-NDVI raster as a single-band float GeoTIFF; NaN pixels
/// become the nodata value.
pub fn write_delta_geotiff(delta: &Raster<f32>, grid: &GridSpec, path: &Path) -> Result<()> {
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut dataset = driver.create_with_band_type_with_options::<f32, _>(
        path,
        grid.width,
        grid.height,
        1,
        &creation_options(),
    )?;
    apply_georeference(&mut dataset, grid)?;

    let mut band = dataset.rasterband(1)?;
    band.set_no_data_value(Some(NODATA_VALUE_FLOAT))?;
    band.set_description("NDVI delta (after - before)")?;

    let data = delta
        .data()
        .iter()
        .map(|&v| if v.is_nan() { NODATA_VALUE_FLOAT as f32 } else { v })
        .collect::<Vec<_>>();
    let mut buffer = Buffer::new(grid.shape(), data);
    band.write((0, 0), grid.shape(), &mut buffer)?;

    dataset.flush_cache()?;
    Ok(())
}

/// Writes a composite's red/green/blue bands as a 3-band byte GeoTIFF,
/// reflectance [0, 1] stretched to [0, 255]; no-data pixels come out black.
pub fn write_rgb_geotiff(bands: &BandSet, grid: &GridSpec, path: &Path) -> Result<()> {
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut dataset = driver.create_with_band_type_with_options::<u8, _>(
        path,
        grid.width,
        grid.height,
        3,
        &creation_options(),
    )?;
    apply_georeference(&mut dataset, grid)?;

    for (band_idx, raster) in [(1, &bands.red), (2, &bands.green), (3, &bands.blue)] {
        let data = raster
            .data()
            .iter()
            .map(|&v| {
                if v.is_nan() {
                    0u8
                } else {
                    (v.clamp(0.0, 1.0) * 255.0).round() as u8
                }
            })
            .collect::<Vec<_>>();
        let mut band = dataset.rasterband(band_idx)?;
        let mut buffer = Buffer::new(grid.shape(), data);
        band.write((0, 0), grid.shape(), &mut buffer)?;
    }

    dataset.flush_cache()?;
    Ok(())
}
