// src/model.rs
use chrono::{DateTime, Duration, NaiveDate, Utc};
use geo_types::{Coord, LineString, Polygon};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AnalysisError;
use crate::raster::{GridSpec, Raster};

/// Satellite source behind every scene catalog currently supported.
pub const SATELLITE: &str = "Sentinel-2";

/// Region of interest: a lon/lat polygon defining the analysis footprint.
#[derive(Debug, Clone, PartialEq)]
pub struct Roi {
    polygon: Polygon<f64>,
}

impl Roi {
    /// Validates and wraps a polygon. The exterior ring needs at least three
    /// distinct finite vertices and a nonzero extent.
    pub fn new(polygon: Polygon<f64>) -> Result<Self, AnalysisError> {
        let exterior = polygon.exterior();
        let coords: Vec<&Coord<f64>> = exterior.0.iter().collect();
        if coords
            .iter()
            .any(|c| !c.x.is_finite() || !c.y.is_finite())
        {
            return Err(AnalysisError::InvalidInput(
                "ROI polygon contains non-finite coordinates".into(),
            ));
        }
        let mut distinct: Vec<(f64, f64)> = Vec::new();
        for c in &coords {
            if !distinct.contains(&(c.x, c.y)) {
                distinct.push((c.x, c.y));
            }
        }
        if distinct.len() < 3 {
            return Err(AnalysisError::InvalidInput(format!(
                "ROI polygon needs at least 3 distinct vertices, got {}",
                distinct.len()
            )));
        }
        let roi = Roi { polygon };
        let (west, south, east, north) = roi.bbox();
        if east <= west || north <= south {
            return Err(AnalysisError::InvalidInput(
                "ROI polygon has zero extent".into(),
            ));
        }
        Ok(roi)
    }

    /// Parses a GeoJSON string holding a Polygon geometry (bare geometry,
    /// Feature, or first feature of a FeatureCollection).
    pub fn from_geojson_str(s: &str) -> Result<Self, AnalysisError> {
        let gj: geojson::GeoJson = s
            .parse()
            .map_err(|e| AnalysisError::InvalidInput(format!("invalid GeoJSON: {e}")))?;
        Self::from_geojson(gj)
    }

    /// Same as [`Roi::from_geojson_str`] but from an already-parsed JSON value.
    pub fn from_geojson_value(value: &serde_json::Value) -> Result<Self, AnalysisError> {
        let gj: geojson::GeoJson = serde_json::from_value(value.clone())
            .map_err(|e| AnalysisError::InvalidInput(format!("invalid GeoJSON: {e}")))?;
        Self::from_geojson(gj)
    }

    fn from_geojson(gj: geojson::GeoJson) -> Result<Self, AnalysisError> {
        let geometry = match gj {
            geojson::GeoJson::Geometry(g) => g,
            geojson::GeoJson::Feature(f) => f.geometry.ok_or_else(|| {
                AnalysisError::InvalidInput("GeoJSON feature has no geometry".into())
            })?,
            geojson::GeoJson::FeatureCollection(fc) => fc
                .features
                .into_iter()
                .find_map(|f| f.geometry)
                .ok_or_else(|| {
                    AnalysisError::InvalidInput("GeoJSON collection has no geometry".into())
                })?,
        };
        let rings = match geometry.value {
            geojson::Value::Polygon(rings) => rings,
            other => {
                return Err(AnalysisError::InvalidInput(format!(
                    "ROI must be a Polygon geometry, got {}",
                    other.type_name()
                )))
            }
        };
        if rings.is_empty() {
            return Err(AnalysisError::InvalidInput(
                "ROI polygon has no rings".into(),
            ));
        }
        let mut parsed = rings
            .iter()
            .map(|ring| parse_ring(ring))
            .collect::<Result<Vec<_>, _>>()?;
        let exterior = parsed.remove(0);
        Self::new(Polygon::new(exterior, parsed))
    }

    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    /// Bounding box as (west, south, east, north).
    pub fn bbox(&self) -> (f64, f64, f64, f64) {
        let mut west = f64::INFINITY;
        let mut south = f64::INFINITY;
        let mut east = f64::NEG_INFINITY;
        let mut north = f64::NEG_INFINITY;
        for c in &self.polygon.exterior().0 {
            west = west.min(c.x);
            east = east.max(c.x);
            south = south.min(c.y);
            north = north.max(c.y);
        }
        (west, south, east, north)
    }

    /// Even-odd point-in-polygon test, honoring interior rings as holes.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        if !ring_contains(self.polygon.exterior(), lon, lat) {
            return false;
        }
        !self
            .polygon
            .interiors()
            .iter()
            .any(|hole| ring_contains(hole, lon, lat))
    }
}

fn parse_ring(ring: &[Vec<f64>]) -> Result<LineString<f64>, AnalysisError> {
    let coords = ring
        .iter()
        .map(|pos| {
            if pos.len() < 2 {
                Err(AnalysisError::InvalidInput(
                    "ROI position is missing a coordinate".into(),
                ))
            } else {
                Ok((pos[0], pos[1]))
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(LineString::from(coords))
}

fn ring_contains(ring: &LineString<f64>, lon: f64, lat: f64) -> bool {
    let pts = &ring.0;
    if pts.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = pts.len() - 1;
    for i in 0..pts.len() {
        let (xi, yi) = (pts[i].x, pts[i].y);
        let (xj, yj) = (pts[j].x, pts[j].y);
        if (yi > lat) != (yj > lat) {
            let x_cross = xi + (lat - yi) / (yj - yi) * (xj - xi);
            if lon < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Half-open analysis period with `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TimeWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, AnalysisError> {
        if end <= start {
            return Err(AnalysisError::InvalidInput(format!(
                "end date {end} must be after start date {start}"
            )));
        }
        Ok(TimeWindow { start, end })
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Splits the window at its midpoint into the non-overlapping before
    /// (start..=mid) and after (mid+1..=end) sub-windows. Needs at least
    /// three days of span so both halves satisfy `start < end`.
    pub fn split(&self) -> Result<(TimeWindow, TimeWindow), AnalysisError> {
        let total = self.days();
        if total < 3 {
            return Err(AnalysisError::InvalidInput(format!(
                "window {self} spans {total} days, too short to split into before/after periods"
            )));
        }
        let mid = self.start + Duration::days(total / 2);
        let before = TimeWindow::new(self.start, mid)?;
        let after = TimeWindow::new(mid + Duration::days(1), self.end)?;
        Ok((before, after))
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Tuning knobs of a run, all optional on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunParameters {
    /// Scenes above this cloud-cover percentage are dropped entirely.
    #[serde(default = "default_cloud_filter_max_pct")]
    pub cloud_filter_max_pct: f64,
    /// NDVI delta below which a pixel counts as loss.
    #[serde(default = "default_ndvi_loss_threshold")]
    pub ndvi_loss_threshold: f64,
    /// Minimum before-NDVI for a pixel to count as previously vegetated.
    #[serde(default = "default_min_initial_ndvi")]
    pub min_initial_ndvi: f64,
    /// Raster resolution in meters per pixel.
    #[serde(default = "default_scale")]
    pub scale: f64,
    /// Bounded wait on the imagery source per sub-window query.
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
}

fn default_cloud_filter_max_pct() -> f64 {
    30.0
}

fn default_ndvi_loss_threshold() -> f64 {
    -0.2
}

fn default_min_initial_ndvi() -> f64 {
    0.6
}

fn default_scale() -> f64 {
    10.0
}

fn default_query_timeout_secs() -> u64 {
    60
}

impl Default for RunParameters {
    fn default() -> Self {
        RunParameters {
            cloud_filter_max_pct: default_cloud_filter_max_pct(),
            ndvi_loss_threshold: default_ndvi_loss_threshold(),
            min_initial_ndvi: default_min_initial_ndvi(),
            scale: default_scale(),
            query_timeout_secs: default_query_timeout_secs(),
        }
    }
}

impl RunParameters {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !(0.0..=100.0).contains(&self.cloud_filter_max_pct) {
            return Err(AnalysisError::InvalidInput(format!(
                "cloud_filter_max_pct must be within [0, 100], got {}",
                self.cloud_filter_max_pct
            )));
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(AnalysisError::InvalidInput(format!(
                "scale must be a positive number of meters, got {}",
                self.scale
            )));
        }
        if !self.ndvi_loss_threshold.is_finite() || !self.min_initial_ndvi.is_finite() {
            return Err(AnalysisError::InvalidInput(
                "NDVI thresholds must be finite".into(),
            ));
        }
        if self.query_timeout_secs == 0 {
            return Err(AnalysisError::InvalidInput(
                "query_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// One validated inbound analysis request.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub roi: Roi,
    pub window: TimeWindow,
    pub parameters: RunParameters,
}

impl RunRequest {
    pub fn new(roi: Roi, window: TimeWindow, parameters: RunParameters) -> Self {
        RunRequest {
            roi,
            window,
            parameters,
        }
    }
}

/// The four reflectance bands the pipeline consumes (Sentinel-2 B2/B3/B4/B8),
/// each in [0, 1] with NaN marking missing data.
#[derive(Debug, Clone, PartialEq)]
pub struct BandSet {
    pub blue: Raster<f32>,
    pub green: Raster<f32>,
    pub red: Raster<f32>,
    pub nir: Raster<f32>,
}

impl BandSet {
    pub fn filled(width: usize, height: usize, value: f32) -> Self {
        BandSet {
            blue: Raster::filled(width, height, value),
            green: Raster::filled(width, height, value),
            red: Raster::filled(width, height, value),
            nir: Raster::filled(width, height, value),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.nir.shape()
    }
}

/// One source observation resampled onto the run grid.
#[derive(Debug, Clone)]
pub struct Scene {
    pub id: String,
    pub date: NaiveDate,
    /// Scene-level cloud cover as reported by the source, in percent.
    pub cloud_cover_pct: f64,
    pub bands: BandSet,
    /// False where the pixel is cloud, cloud shadow, cirrus, or outside the
    /// scene footprint; such samples never reach the median.
    pub valid: Raster<bool>,
}

/// Cloud-filtered median composite of one sub-window.
#[derive(Debug, Clone)]
pub struct Composite {
    pub grid: GridSpec,
    pub window: TimeWindow,
    pub bands: BandSet,
    /// Number of scenes that contributed; at least 1 by construction.
    pub scene_count: usize,
    /// Unweighted mean of the contributing scenes' cloud-cover percentages.
    pub avg_cloud_cover_pct: f64,
}

/// Aggregate metrics of a run, rounded for stable reporting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stats {
    pub affected_area_ha: f64,
    pub mean_ndvi_before: f64,
    pub mean_ndvi_after: f64,
}

/// Image-quality metrics of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quality {
    pub observations_used: usize,
    pub avg_cloud_cover_pct: f64,
}

/// Confidence bucket assigned to a loss polygon from its area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    /// `>= 5 ha` high, `[1, 5)` medium, below that low-confidence noise
    /// (kept, never dropped).
    pub fn for_area_ha(area_ha: f64) -> Self {
        if area_ha >= 5.0 {
            ConfidenceTier::High
        } else if area_ha >= 1.0 {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }
}

impl std::fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConfidenceTier::High => "high",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::Low => "low",
        };
        f.write_str(s)
    }
}

/// One contiguous patch of detected vegetation loss.
#[derive(Debug, Clone)]
pub struct LossPolygon {
    pub id: Uuid,
    pub area_ha: f64,
    pub confidence: ConfidenceTier,
    pub geometry: Polygon<f64>,
}

/// Run provenance echoed back to the persistence layer.
#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    pub satellite: String,
    pub run_id: Uuid,
    pub processing_date: DateTime<Utc>,
    pub before_period: String,
    pub after_period: String,
    pub parameters: RunParameters,
}

/// In-memory rasters kept for artifact export.
#[derive(Debug, Clone)]
pub struct OutputRasters {
    pub grid: GridSpec,
    pub before: BandSet,
    pub after: BandSet,
    pub delta_ndvi: Raster<f32>,
}

/// Immutable output bundle of a completed run.
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub run_id: Uuid,
    pub stats: Stats,
    pub quality: Quality,
    pub polygons: Vec<LossPolygon>,
    pub metadata: RunMetadata,
    pub outputs: OutputRasters,
}

/// Filesystem locations of exported artifacts; the external uploader turns
/// these into public URLs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ArtifactPaths {
    pub before_rgb: Option<std::path::PathBuf>,
    pub after_rgb: Option<std::path::PathBuf>,
    pub delta_ndvi: Option<std::path::PathBuf>,
    pub loss_polygons: Option<std::path::PathBuf>,
}

impl AnalysisResult {
    /// Payload handed to the external run datastore. The risk label is not
    /// part of it; persistence derives it separately via
    /// [`crate::risk::classify_risk`].
    pub fn to_report(&self, artifacts: &ArtifactPaths) -> serde_json::Value {
        serde_json::json!({
            "run_id": self.run_id,
            "stats": self.stats,
            "quality": self.quality,
            "outputs": artifacts,
            "polygon_count": self.polygons.len(),
            "metadata": self.metadata,
        })
    }
}
