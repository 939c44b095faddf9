use approx::assert_relative_eq;
use geoscan::core::anomaly::{extract_points, AnomalyDetector};
use geoscan::core::raster::synthetic_raster;
use geoscan::core::report::build_report;
use geoscan::core::roi::{RoiBuilder, RoiKind};
use geoscan::core::scan::{physical_estimates, ScanConfig, ScanOrchestrator};
use geoscan::types::{AnomalyPoint, DataSource, GeoError, Polarity, ScanSettings};
use std::f64::consts::PI;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_circle_feature_scenario() {
    init_logging();

    let roi = RoiBuilder::from_geojson(
        r#"{"geometry":{"type":"Point","coordinates":[35.0,39.0]},"properties":{"radius":500}}"#,
    )
    .expect("Failed to build circle ROI");

    assert_eq!(roi.kind, RoiKind::Circle);
    assert_eq!(roi.area_m2, PI * 500.0 * 500.0);
    assert_relative_eq!(roi.area_m2, 785398.0, max_relative = 1e-6);
    assert_eq!(roi.vertex_count(), 72);
    assert_eq!(roi.polygon.first(), roi.polygon.last());
}

#[test]
fn test_unsupported_geometry_aborts() {
    let result = RoiBuilder::from_geojson(
        r#"{"geometry":{"type":"MultiPolygon","coordinates":[]},"properties":{}}"#,
    );
    assert!(matches!(result, Err(GeoError::UnsupportedGeometry(_))));
}

#[test]
fn test_equator_square_area() {
    for &d in &[0.001, 0.01, 0.05] {
        let roi = RoiBuilder::from_polygon(&[(0.0, 0.0), (d, 0.0), (d, d), (0.0, d), (0.0, 0.0)])
            .expect("Failed to build square ROI");
        assert_relative_eq!(roi.area_m2, (d * 111320.0).powi(2), max_relative = 0.02);
    }
}

#[test]
fn test_detector_weight_scenario() {
    let settings = ScanSettings { radar: true, optic: true, thermal: false, magnetic: false };
    assert_relative_eq!(AnomalyDetector::layer_weight(&settings), 2.0, epsilon = 1e-6);
}

#[test]
fn test_point_estimates_scenario() {
    let point = AnomalyPoint {
        row: 10,
        col: 20,
        score: 0.8,
        polarity: Polarity::from_score(0.8),
        z_rel: 1.2,
    };
    assert_eq!(point.polarity, Polarity::Pos);
    assert_eq!(physical_estimates(&point), (3.4, 66.3));
}

#[test]
fn test_synthetic_heatmap_properties() {
    init_logging();

    let raster = synthetic_raster(256, 42);
    assert_eq!(raster, synthetic_raster(256, 42), "Synthetic raster must be reproducible");

    let detector = AnomalyDetector::new();
    let heatmap = detector
        .compute_heatmap(&raster, &ScanSettings::default())
        .expect("Failed to compute heatmap");
    let min = heatmap.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = heatmap.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    assert_eq!(min, 0.0);
    assert_eq!(max, 1.0);

    let top_k = 35;
    let min_dist = 10;
    let points = extract_points(&heatmap, top_k, min_dist);
    assert!(!points.is_empty());
    assert!(points.len() <= top_k);
    assert_eq!(points[0].score, 1.0);

    for (i, a) in points.iter().enumerate() {
        for b in &points[i + 1..] {
            let chebyshev = a.row.abs_diff(b.row).max(a.col.abs_diff(b.col));
            assert!(
                chebyshev >= min_dist,
                "points ({}, {}) and ({}, {}) are {} px apart",
                a.row, a.col, b.row, b.col, chebyshev
            );
        }
    }
}

#[test]
fn test_full_scan_and_report() {
    init_logging();

    let ring = [(32.80, 39.90), (32.82, 39.90), (32.82, 39.92), (32.80, 39.92)];
    let roi = RoiBuilder::from_polygon(&ring).expect("Failed to build ROI");
    let orchestrator = ScanOrchestrator::new(ScanConfig::default());
    let settings = ScanSettings::default();

    let first = orchestrator.run_scan(&roi, &settings, false).expect("Scan failed");
    let second = orchestrator.run_scan(&roi, &settings, false).expect("Scan failed");
    assert_eq!(first.heatmap, second.heatmap);
    assert_eq!(first.anomaly_points, second.anomaly_points);
    assert_eq!(first.data_source, DataSource::Synthetic { fallback_reason: None });
    assert_eq!(first.georef.height, 256);

    let report = build_report(&first, &settings, false);
    assert_eq!(report, build_report(&first, &settings, false));
    assert!(report.overall_accuracy_pct > 0.0 && report.overall_accuracy_pct <= 99.0);
    assert_eq!(
        report.voids_detected + report.metals_detected,
        first.anomaly_points.len()
    );
    let top: Vec<f64> = report.findings_top3.iter().map(|p| p.point.score).collect();
    assert!(top.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn test_real_data_without_source_falls_back() {
    let roi = RoiBuilder::from_circle(35.0, 39.0, 500.0);
    let orchestrator = ScanOrchestrator::new(ScanConfig {
        raster_size: 64,
        ..ScanConfig::default()
    });
    let result = orchestrator
        .run_scan(&roi, &ScanSettings::default(), true)
        .expect("Real-data scan must not fail");
    assert!(result.data_source.is_synthetic());

    let report = build_report(&result, &ScanSettings::default(), true);
    assert!(report.real_data_requested);
    assert_eq!(report.sources_used, vec!["Demo raster"]);
}
