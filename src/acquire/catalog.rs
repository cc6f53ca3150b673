// src/acquire/catalog.rs
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use gdal::raster::Buffer;
use gdal::Dataset;
use log::{debug, warn};
use parking_lot::Mutex;
use serde::Deserialize;

use crate::acquire::SceneSource;
use crate::error::AnalysisError;
use crate::model::{BandSet, Scene, TimeWindow};
use crate::raster::{GridSpec, Raster};

/// Sentinel-2 SCL classes masked out per pixel: no-data, cloud shadow,
/// cloud medium/high probability, thin cirrus.
const MASKED_SCL_CLASSES: [u8; 5] = [0, 3, 8, 9, 10];

/// Scene-classification values live in band 5 of every catalog GeoTIFF,
/// after B2, B3, B4, B8.
const SCL_BAND: usize = 5;

#[derive(Debug, Deserialize)]
struct CatalogIndex {
    #[serde(default = "default_reflectance_scale")]
    reflectance_scale: f32,
    scenes: Vec<CatalogEntry>,
}

fn default_reflectance_scale() -> f32 {
    10_000.0
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    id: String,
    date: NaiveDate,
    cloud_cover_pct: f64,
    path: String,
}

/// A directory of Sentinel-2 GeoTIFF scenes described by an `index.json`
/// sidecar. Each scene file carries bands B2/B3/B4/B8 as reflectance digital
/// numbers plus the SCL quality band, georeferenced in EPSG:4326.
pub struct SceneCatalog {
    root: PathBuf,
    index: CatalogIndex,
    // Opened datasets are kept around for repeated queries of the same run
    // or of parallel runs over one catalog.
    datasets: Mutex<HashMap<PathBuf, Arc<Mutex<Dataset>>>>,
}

impl SceneCatalog {
    pub fn open(root: &Path) -> Result<Self, AnalysisError> {
        let index_path = root.join("index.json");
        let raw = std::fs::read_to_string(&index_path).map_err(|e| {
            AnalysisError::UpstreamUnavailable(format!(
                "cannot read catalog index {}: {e}",
                index_path.display()
            ))
        })?;
        let index: CatalogIndex = serde_json::from_str(&raw).map_err(|e| {
            AnalysisError::UpstreamUnavailable(format!(
                "malformed catalog index {}: {e}",
                index_path.display()
            ))
        })?;
        debug!(
            "opened scene catalog {} with {} scene(s)",
            root.display(),
            index.scenes.len()
        );
        Ok(Self {
            root: root.to_path_buf(),
            index,
            datasets: Mutex::new(HashMap::new()),
        })
    }

    fn dataset(&self, path: &Path) -> Result<Arc<Mutex<Dataset>>, AnalysisError> {
        let mut cache = self.datasets.lock();
        if let Some(ds) = cache.get(path) {
            return Ok(Arc::clone(ds));
        }
        let ds = Dataset::open(path).map_err(|e| {
            AnalysisError::UpstreamUnavailable(format!(
                "cannot open scene {}: {e}",
                path.display()
            ))
        })?;
        let ds = Arc::new(Mutex::new(ds));
        cache.insert(path.to_path_buf(), Arc::clone(&ds));
        Ok(ds)
    }

    /// Reads one scene and resamples it (nearest neighbor) onto the run grid.
    fn load_scene(&self, entry: &CatalogEntry, grid: &GridSpec) -> Result<Scene, AnalysisError> {
        let path = self.root.join(&entry.path);
        let dataset = self.dataset(&path)?;
        let ds = dataset.lock();

        let (src_w, src_h) = ds.raster_size();
        let gt = ds.geo_transform().map_err(|e| {
            AnalysisError::UpstreamUnavailable(format!(
                "scene {} has no geotransform: {e}",
                path.display()
            ))
        })?;

        let mut src_bands: Vec<Buffer<f32>> = Vec::with_capacity(SCL_BAND);
        for band_idx in 1..=SCL_BAND {
            let band = ds.rasterband(band_idx).map_err(|e| {
                AnalysisError::UpstreamUnavailable(format!(
                    "scene {} is missing band {band_idx}: {e}",
                    path.display()
                ))
            })?;
            let buffer = band
                .read_as::<f32>((0, 0), (src_w, src_h), (src_w, src_h), None)
                .map_err(|e| {
                    AnalysisError::UpstreamUnavailable(format!(
                        "cannot read band {band_idx} of {}: {e}",
                        path.display()
                    ))
                })?;
            src_bands.push(buffer);
        }
        drop(ds);

        let scale = self.index.reflectance_scale;
        let sample = |buffer: &Buffer<f32>, sx: usize, sy: usize| buffer.data()[sy * src_w + sx];

        let mut bands = BandSet::filled(grid.width, grid.height, f32::NAN);
        let mut valid = Raster::filled(grid.width, grid.height, false);
        for y in 0..grid.height {
            for x in 0..grid.width {
                let (lon, lat) = grid.pixel_center(x, y);
                let sx = (lon - gt[0]) / gt[1];
                let sy = (lat - gt[3]) / gt[5];
                if sx < 0.0 || sy < 0.0 {
                    continue;
                }
                let (sx, sy) = (sx as usize, sy as usize);
                if sx >= src_w || sy >= src_h {
                    continue;
                }
                let scl = sample(&src_bands[4], sx, sy) as u8;
                let i = valid.idx(x, y);
                if MASKED_SCL_CLASSES.contains(&scl) {
                    continue;
                }
                valid.data_mut()[i] = true;
                bands.blue.data_mut()[i] = sample(&src_bands[0], sx, sy) / scale;
                bands.green.data_mut()[i] = sample(&src_bands[1], sx, sy) / scale;
                bands.red.data_mut()[i] = sample(&src_bands[2], sx, sy) / scale;
                bands.nir.data_mut()[i] = sample(&src_bands[3], sx, sy) / scale;
            }
        }

        Ok(Scene {
            id: entry.id.clone(),
            date: entry.date,
            cloud_cover_pct: entry.cloud_cover_pct,
            bands,
            valid,
        })
    }
}

impl SceneSource for SceneCatalog {
    fn query(
        &self,
        grid: &GridSpec,
        window: &TimeWindow,
        max_cloud_pct: f64,
    ) -> Result<Vec<Scene>, AnalysisError> {
        let mut scenes = Vec::new();
        for entry in &self.index.scenes {
            if !window.contains(entry.date) {
                continue;
            }
            // Scene-level pre-filter saves reading files the acquisition
            // step would drop anyway.
            if entry.cloud_cover_pct > max_cloud_pct {
                debug!(
                    "skipping scene {} ({}% cloud cover)",
                    entry.id, entry.cloud_cover_pct
                );
                continue;
            }
            match self.load_scene(entry, grid) {
                Ok(scene) => scenes.push(scene),
                Err(e) => {
                    warn!("failed to load scene {}: {e}", entry.id);
                    return Err(e);
                }
            }
        }
        Ok(scenes)
    }
}
