// src/raster.rs
use crate::error::AnalysisError;
use crate::model::Roi;

/// Meters per degree of latitude (WGS84 mean).
const METERS_PER_DEG_LAT: f64 = 111_320.0;

/// Pixel grid shared by every raster of a run.
///
/// Derived once from the ROI bounding box and the requested scale; both the
/// before and the after composite are built on the identical grid, which is
/// what guarantees grid alignment further down the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec {
    pub width: usize,
    pub height: usize,
    /// Longitude of the left edge.
    pub west: f64,
    /// Latitude of the top edge.
    pub north: f64,
    /// Pixel size in degrees of longitude.
    pub lon_step: f64,
    /// Pixel size in degrees of latitude (applied southwards).
    pub lat_step: f64,
    /// Nominal resolution in meters per pixel.
    pub scale_m: f64,
}

impl GridSpec {
    /// Builds the grid covering the ROI bounding box at `scale_m` meters per
    /// pixel. Longitude spacing is corrected for the ROI's center latitude.
    pub fn cover(roi: &Roi, scale_m: f64) -> Result<Self, AnalysisError> {
        if !(scale_m.is_finite() && scale_m > 0.0) {
            return Err(AnalysisError::InvalidInput(format!(
                "scale must be a positive number of meters, got {scale_m}"
            )));
        }
        let (west, south, east, north) = roi.bbox();
        let center_lat = (south + north) / 2.0;
        let cos_lat = center_lat.to_radians().cos();
        if cos_lat <= 1e-6 {
            return Err(AnalysisError::InvalidInput(
                "ROI is too close to a pole for a lon/lat grid".into(),
            ));
        }

        let lat_step = scale_m / METERS_PER_DEG_LAT;
        let lon_step = scale_m / (METERS_PER_DEG_LAT * cos_lat);
        // The 1e-9 slack keeps float jitter in the division from adding a
        // spurious extra row/column when the extent is an exact multiple.
        let width = (((east - west) / lon_step) - 1e-9).ceil().max(1.0) as usize;
        let height = (((north - south) / lat_step) - 1e-9).ceil().max(1.0) as usize;

        Ok(GridSpec {
            width,
            height,
            west,
            north,
            lon_step,
            lat_step,
            scale_m,
        })
    }

    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Lon/lat of the center of pixel (x, y).
    pub fn pixel_center(&self, x: usize, y: usize) -> (f64, f64) {
        (
            self.west + (x as f64 + 0.5) * self.lon_step,
            self.north - (y as f64 + 0.5) * self.lat_step,
        )
    }

    /// Lon/lat of the top-left corner of pixel (x, y). Valid for
    /// `x <= width` and `y <= height`, so it also addresses the grid's
    /// closing corners.
    pub fn corner(&self, x: usize, y: usize) -> (f64, f64) {
        (
            self.west + x as f64 * self.lon_step,
            self.north - y as f64 * self.lat_step,
        )
    }

    /// Area of one pixel in hectares.
    pub fn pixel_area_ha(&self) -> f64 {
        self.scale_m * self.scale_m / 10_000.0
    }
}

/// Row-major single-band raster.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster<T> {
    width: usize,
    height: usize,
    data: Vec<T>,
}

impl<T: Clone> Raster<T> {
    pub fn filled(width: usize, height: usize, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "raster data length does not match {width}x{height}"
        );
        Self {
            width,
            height,
            data,
        }
    }
}

impl<T> Raster<T> {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn idx(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.width && y < self.height);
        y * self.width + x
    }

    pub fn get(&self, x: usize, y: usize) -> &T {
        &self.data[y * self.width + x]
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn matches_grid(&self, grid: &GridSpec) -> bool {
        self.shape() == grid.shape()
    }
}

impl Raster<bool> {
    pub fn count_true(&self) -> usize {
        self.data.iter().filter(|v| **v).count()
    }
}
