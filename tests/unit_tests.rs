// tests/unit_tests.rs
use std::sync::Arc;

use chrono::NaiveDate;

use canopy_watch::acquire::{acquire_composite, composite_scenes, MemoryScenes, SceneSource};
use canopy_watch::error::AnalysisError;
use canopy_watch::model::{
    BandSet, Composite, ConfidenceTier, Roi, RunParameters, Scene, TimeWindow,
};
use canopy_watch::processing::{aggregate, detect_loss, extract_polygons, ndvi};
use canopy_watch::raster::{GridSpec, Raster};
use canopy_watch::risk::{classify_risk, RiskLabel};

const METERS_PER_DEG: f64 = 111_320.0;

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

/// Square ROI of the given side length centered on (0, 0), where one degree
/// is very close to 111.32 km in both axes.
fn square_roi(side_m: f64) -> Roi {
    let half = side_m / 2.0 / METERS_PER_DEG;
    let ring = vec![
        (-half, -half),
        (half, -half),
        (half, half),
        (-half, half),
        (-half, -half),
    ];
    Roi::new(geo_types::Polygon::new(
        geo_types::LineString::from(ring),
        vec![],
    ))
    .unwrap()
}

/// Manually specified grid for mask-level tests; `scale_m` picks the pixel
/// area (100 m -> 1 ha per pixel).
fn test_grid(width: usize, height: usize, scale_m: f64) -> GridSpec {
    let step = scale_m / METERS_PER_DEG;
    GridSpec {
        width,
        height,
        west: 0.0,
        north: height as f64 * step,
        lon_step: step,
        lat_step: step,
        scale_m,
    }
}

fn uniform_scene(
    grid: &GridSpec,
    id: &str,
    day: &str,
    cloud_cover_pct: f64,
    nir: f32,
    red: f32,
) -> Scene {
    let mut bands = BandSet::filled(grid.width, grid.height, 0.2);
    bands.nir = Raster::filled(grid.width, grid.height, nir);
    bands.red = Raster::filled(grid.width, grid.height, red);
    Scene {
        id: id.to_string(),
        date: date(day),
        cloud_cover_pct,
        bands,
        valid: Raster::filled(grid.width, grid.height, true),
    }
}

fn uniform_composite(grid: &GridSpec, window: TimeWindow, nir: &[f32], red: &[f32]) -> Composite {
    let mut bands = BandSet::filled(grid.width, grid.height, 0.2);
    bands.nir = Raster::from_vec(grid.width, grid.height, nir.to_vec());
    bands.red = Raster::from_vec(grid.width, grid.height, red.to_vec());
    Composite {
        grid: grid.clone(),
        window,
        bands,
        scene_count: 1,
        avg_cloud_cover_pct: 10.0,
    }
}

fn default_window() -> TimeWindow {
    TimeWindow::new(date("2026-01-01"), date("2026-01-14")).unwrap()
}

#[test]
fn test_window_split_at_midpoint() {
    let window = TimeWindow::new(date("2026-01-01"), date("2026-01-28")).unwrap();
    let (before, after) = window.split().unwrap();
    assert_eq!(before.start, date("2026-01-01"));
    assert_eq!(before.end, date("2026-01-14"));
    assert_eq!(after.start, date("2026-01-15"));
    assert_eq!(after.end, date("2026-01-28"));
}

#[test]
fn test_window_rejects_reversed_dates() {
    let err = TimeWindow::new(date("2026-02-01"), date("2026-01-01")).unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidInput(_)));
    // Equal dates are just as invalid.
    assert!(TimeWindow::new(date("2026-01-01"), date("2026-01-01")).is_err());
}

#[test]
fn test_window_too_short_to_split() {
    let window = TimeWindow::new(date("2026-01-01"), date("2026-01-03")).unwrap();
    assert!(matches!(
        window.split().unwrap_err(),
        AnalysisError::InvalidInput(_)
    ));
}

#[test]
fn test_ndvi_formula_and_edge_cases() {
    let grid = test_grid(2, 2, 10.0);
    let composite = uniform_composite(
        &grid,
        default_window(),
        &[0.9, 0.5, 0.0, f32::NAN],
        &[0.1, 0.5, 0.0, 0.3],
    );
    let index = ndvi(&composite);
    let values = index.data();
    assert!((values[0] - 0.8).abs() < 1e-5);
    assert_eq!(values[1], 0.0);
    // Zero denominator is defined as 0, not NaN.
    assert_eq!(values[2], 0.0);
    // Missing data propagates.
    assert!(values[3].is_nan());
}

#[test]
fn test_ndvi_is_deterministic() {
    let grid = test_grid(4, 4, 10.0);
    let nir: Vec<f32> = (0..16).map(|i| 0.3 + i as f32 * 0.01).collect();
    let red: Vec<f32> = (0..16).map(|i| 0.1 + i as f32 * 0.005).collect();
    let composite = uniform_composite(&grid, default_window(), &nir, &red);
    assert_eq!(ndvi(&composite), ndvi(&composite));
}

#[test]
fn test_loss_requires_both_conditions() {
    let grid = test_grid(2, 2, 10.0);
    // Pixel 0: vegetated and dropped -> loss.
    // Pixel 1: never vegetated, same drop -> no loss.
    // Pixel 2: vegetated, drop above threshold -> no loss.
    // Pixel 3: no data -> no loss.
    let before = Raster::from_vec(2, 2, vec![0.8, 0.5, 0.8, f32::NAN]);
    let after = Raster::from_vec(2, 2, vec![0.5, 0.2, 0.7, 0.1]);
    let params = RunParameters::default();
    let change = detect_loss(&before, &after, &params).unwrap();

    assert_eq!(change.loss.data(), &[true, false, false, false]);
    for i in 0..4 {
        if change.loss.data()[i] {
            assert!(before.data()[i] > params.min_initial_ndvi as f32);
            assert!(change.delta.data()[i] < params.ndvi_loss_threshold as f32);
        }
    }
}

#[test]
fn test_detect_loss_rejects_grid_mismatch() {
    let before = Raster::filled(2, 2, 0.8f32);
    let after = Raster::filled(3, 3, 0.5f32);
    let err = detect_loss(&before, &after, &RunParameters::default()).unwrap_err();
    assert!(matches!(err, AnalysisError::Internal { .. }));
}

#[test]
fn test_median_composite_is_outlier_robust() {
    let roi = square_roi(40.0);
    let grid = GridSpec::cover(&roi, 10.0).unwrap();
    let window = default_window();
    let scenes = vec![
        uniform_scene(&grid, "a", "2026-01-02", 5.0, 0.2, 0.1),
        uniform_scene(&grid, "b", "2026-01-05", 15.0, 0.4, 0.1),
        uniform_scene(&grid, "c", "2026-01-09", 25.0, 0.9, 0.1),
    ];
    let composite = composite_scenes(&scenes, &roi, &grid, &window);
    assert_eq!(composite.scene_count, 3);
    assert!((composite.avg_cloud_cover_pct - 15.0).abs() < 1e-9);
    // Odd sample count: middle value wins over the 0.9 outlier.
    assert_eq!(*composite.bands.nir.get(1, 1), 0.4);
}

#[test]
fn test_composite_skips_cloud_masked_pixels() {
    let roi = square_roi(40.0);
    let grid = GridSpec::cover(&roi, 10.0).unwrap();
    let window = default_window();
    let mut masked = uniform_scene(&grid, "a", "2026-01-02", 5.0, 0.9, 0.1);
    for v in masked.valid.data_mut() {
        *v = false;
    }
    let scenes = vec![
        masked,
        uniform_scene(&grid, "b", "2026-01-05", 15.0, 0.3, 0.1),
        uniform_scene(&grid, "c", "2026-01-09", 25.0, 0.5, 0.1),
    ];
    let composite = composite_scenes(&scenes, &roi, &grid, &window);
    // Even count left after masking: the two middle values average.
    assert!((*composite.bands.nir.get(0, 0) - 0.4).abs() < 1e-6);
}

#[test]
fn test_acquire_applies_scene_level_cloud_filter() {
    let roi = square_roi(40.0);
    let grid = GridSpec::cover(&roi, 10.0).unwrap();
    let source = Arc::new(MemoryScenes::new(vec![
        uniform_scene(&grid, "clear", "2026-01-02", 10.0, 0.9, 0.1),
        uniform_scene(&grid, "cloudy", "2026-01-05", 50.0, 0.2, 0.1),
    ]));
    let composite = acquire_composite(
        source,
        &roi,
        &grid,
        &default_window(),
        &RunParameters::default(),
    )
    .unwrap();
    assert_eq!(composite.scene_count, 1);
    assert!((composite.avg_cloud_cover_pct - 10.0).abs() < 1e-9);
}

#[test]
fn test_acquire_reports_no_imagery_with_remediation() {
    let roi = square_roi(40.0);
    let grid = GridSpec::cover(&roi, 10.0).unwrap();
    let source = Arc::new(MemoryScenes::new(vec![uniform_scene(
        &grid,
        "cloudy",
        "2026-01-05",
        20.0,
        0.9,
        0.1,
    )]));
    let params = RunParameters {
        cloud_filter_max_pct: 0.0,
        ..RunParameters::default()
    };
    let err = acquire_composite(source, &roi, &grid, &default_window(), &params).unwrap_err();
    assert!(matches!(err, AnalysisError::NoImageryFound { .. }));
    let message = err.to_string();
    assert!(message.contains("2026-01-01 to 2026-01-14"));
    assert!(message.contains("cloud_filter_max_pct"));
}

struct StalledSource;

impl SceneSource for StalledSource {
    fn query(
        &self,
        _grid: &GridSpec,
        _window: &TimeWindow,
        _max_cloud_pct: f64,
    ) -> Result<Vec<Scene>, AnalysisError> {
        std::thread::sleep(std::time::Duration::from_secs(5));
        Ok(vec![])
    }
}

#[test]
fn test_acquire_timeout_is_distinct_failure() {
    let roi = square_roi(40.0);
    let grid = GridSpec::cover(&roi, 10.0).unwrap();
    let params = RunParameters {
        query_timeout_secs: 1,
        ..RunParameters::default()
    };
    let err = acquire_composite(
        Arc::new(StalledSource),
        &roi,
        &grid,
        &default_window(),
        &params,
    )
    .unwrap_err();
    assert!(matches!(err, AnalysisError::UpstreamTimeout { .. }));
}

#[test]
fn test_stats_rounding_and_quality() {
    let grid = test_grid(2, 2, 10.0);
    let window = default_window();
    let mut before = uniform_composite(&grid, window, &[0.9; 4], &[0.1; 4]);
    before.scene_count = 2;
    before.avg_cloud_cover_pct = 10.26;
    let mut after = uniform_composite(&grid, window, &[0.75; 4], &[0.25; 4]);
    after.scene_count = 3;
    after.avg_cloud_cover_pct = 15.89;

    let loss = Raster::from_vec(2, 2, vec![true, true, true, false]);
    let before_ndvi = Raster::from_vec(2, 2, vec![0.8004, 0.8004, 0.8004, f32::NAN]);
    let after_ndvi = Raster::from_vec(2, 2, vec![0.5, 0.5, 0.5, 0.5]);

    let (stats, quality) = aggregate(&loss, &before_ndvi, &after_ndvi, &before, &after, 10.0);
    // 3 pixels x 100 m^2 = 300 m^2 = 0.03 ha.
    assert_eq!(stats.affected_area_ha, 0.03);
    // Mean ignores the NaN pixel and rounds to 3 decimals.
    assert_eq!(stats.mean_ndvi_before, 0.8);
    assert_eq!(stats.mean_ndvi_after, 0.5);
    assert_eq!(quality.observations_used, 5);
    // Unweighted mean of the two period averages, 1 decimal.
    assert_eq!(quality.avg_cloud_cover_pct, 13.1);
}

#[test]
fn test_stats_zero_loss_is_not_an_error() {
    let grid = test_grid(2, 2, 10.0);
    let window = default_window();
    let composite = uniform_composite(&grid, window, &[f32::NAN; 4], &[f32::NAN; 4]);
    let loss = Raster::filled(2, 2, false);
    let nodata = Raster::filled(2, 2, f32::NAN);
    let (stats, _) = aggregate(&loss, &nodata, &nodata, &composite, &composite, 10.0);
    assert_eq!(stats.affected_area_ha, 0.0);
    assert_eq!(stats.mean_ndvi_before, 0.0);
    assert_eq!(stats.mean_ndvi_after, 0.0);
}

#[test]
fn test_confidence_tier_boundaries() {
    assert_eq!(ConfidenceTier::for_area_ha(5.0), ConfidenceTier::High);
    assert_eq!(ConfidenceTier::for_area_ha(4.999), ConfidenceTier::Medium);
    assert_eq!(ConfidenceTier::for_area_ha(1.0), ConfidenceTier::Medium);
    assert_eq!(ConfidenceTier::for_area_ha(0.999), ConfidenceTier::Low);
}

#[test]
fn test_risk_thresholds() {
    assert_eq!(classify_risk(10.0).unwrap(), RiskLabel::High);
    assert_eq!(classify_risk(9.999).unwrap(), RiskLabel::Medium);
    assert_eq!(classify_risk(3.0).unwrap(), RiskLabel::Medium);
    assert_eq!(classify_risk(2.999).unwrap(), RiskLabel::Low);
    assert_eq!(classify_risk(0.0).unwrap(), RiskLabel::Unknown);
}

#[test]
fn test_risk_rejects_bad_input() {
    assert!(classify_risk(-0.1).is_err());
    assert!(classify_risk(f64::NAN).is_err());
    assert!(classify_risk(f64::INFINITY).is_err());
}

#[test]
fn test_extract_single_cell_polygon() {
    let grid = test_grid(3, 3, 100.0);
    let mut mask = Raster::filled(3, 3, false);
    let center = mask.idx(1, 1);
    mask.data_mut()[center] = true;

    let polygons = extract_polygons(&mask, &grid);
    assert_eq!(polygons.len(), 1);
    // One pixel at 100 m scale is exactly 1 ha -> medium.
    assert_eq!(polygons[0].area_ha, 1.0);
    assert_eq!(polygons[0].confidence, ConfidenceTier::Medium);

    let ring = &polygons[0].geometry.exterior().0;
    assert_eq!(ring.len(), 5);
    assert_eq!(ring.first(), ring.last());
    let expected = [
        grid.corner(1, 1),
        grid.corner(2, 1),
        grid.corner(2, 2),
        grid.corner(1, 2),
    ];
    for corner in expected {
        assert!(ring
            .iter()
            .any(|c| (c.x - corner.0).abs() < 1e-12 && (c.y - corner.1).abs() < 1e-12));
    }
}

#[test]
fn test_diagonal_cells_form_one_component() {
    let grid = test_grid(4, 4, 30.0);
    let mut mask = Raster::filled(4, 4, false);
    let a = mask.idx(0, 0);
    let b = mask.idx(1, 1);
    mask.data_mut()[a] = true;
    mask.data_mut()[b] = true;

    let polygons = extract_polygons(&mask, &grid);
    // 8-connectivity joins diagonal neighbors into one polygon.
    assert_eq!(polygons.len(), 1);
    // Two 30 m pixels: 1800 m^2 = 0.18 ha -> low-confidence noise, kept.
    assert_eq!(polygons[0].area_ha, 0.18);
    assert_eq!(polygons[0].confidence, ConfidenceTier::Low);
}

#[test]
fn test_component_hole_becomes_interior_ring() {
    let grid = test_grid(5, 5, 100.0);
    let mut mask = Raster::filled(5, 5, false);
    for y in 1..4 {
        for x in 1..4 {
            if !(x == 2 && y == 2) {
                let i = mask.idx(x, y);
                mask.data_mut()[i] = true;
            }
        }
    }

    let polygons = extract_polygons(&mask, &grid);
    assert_eq!(polygons.len(), 1);
    assert_eq!(polygons[0].area_ha, 8.0);
    assert_eq!(polygons[0].confidence, ConfidenceTier::High);
    assert_eq!(polygons[0].geometry.interiors().len(), 1);
}

#[test]
fn test_empty_mask_yields_no_polygons() {
    let grid = test_grid(4, 4, 10.0);
    let mask = Raster::filled(4, 4, false);
    assert!(extract_polygons(&mask, &grid).is_empty());
}

#[test]
fn test_roi_validation() {
    // A line is not an acceptable footprint.
    let degenerate = geo_types::Polygon::new(
        geo_types::LineString::from(vec![(0.0, 0.0), (1.0, 1.0), (0.0, 0.0)]),
        vec![],
    );
    assert!(Roi::new(degenerate).is_err());

    let err = Roi::from_geojson_str(r#"{"type":"Point","coordinates":[0.0,0.0]}"#).unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidInput(_)));

    let feature = r#"{
        "type": "Feature",
        "properties": {},
        "geometry": {
            "type": "Polygon",
            "coordinates": [[[0.0,0.0],[0.01,0.0],[0.01,0.01],[0.0,0.01],[0.0,0.0]]]
        }
    }"#;
    let roi = Roi::from_geojson_str(feature).unwrap();
    assert!(roi.contains(0.005, 0.005));
    assert!(!roi.contains(0.02, 0.005));
}

#[test]
fn test_parameter_defaults_and_validation() {
    let params: RunParameters = serde_json::from_str("{}").unwrap();
    assert_eq!(params.cloud_filter_max_pct, 30.0);
    assert_eq!(params.ndvi_loss_threshold, -0.2);
    assert_eq!(params.min_initial_ndvi, 0.6);
    assert_eq!(params.scale, 10.0);
    assert!(params.validate().is_ok());

    let bad_cloud = RunParameters {
        cloud_filter_max_pct: 120.0,
        ..RunParameters::default()
    };
    assert!(bad_cloud.validate().is_err());

    let bad_scale = RunParameters {
        scale: 0.0,
        ..RunParameters::default()
    };
    assert!(bad_scale.validate().is_err());
}
