use geoscan::core::roi::RoiBuilder;
use geoscan::core::scan::{ScanConfig, ScanSession, ScanOrchestrator};
use geoscan::io::export::ExportFormat;
use geoscan::types::ScanSettings;
use tempfile::TempDir;

#[test]
fn test_session_export_all_formats() {
    let _ = env_logger::builder().is_test(true).try_init();

    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let out_dir = temp_dir.path().join("exports");

    let mut session = ScanSession::new(ScanOrchestrator::new(ScanConfig {
        raster_size: 48,
        ..ScanConfig::default()
    }));
    assert!(session.export(&out_dir).is_err(), "Export without a scan must fail");

    session.set_roi(RoiBuilder::from_circle(29.0, 41.0, 250.0));
    let point_count = session
        .run_scan(ScanSettings::default(), false)
        .expect("Scan failed")
        .anomaly_points
        .len();

    let written = session.export(&out_dir).expect("Export failed");
    let expected = if cfg!(feature = "geotiff") { 7 } else { 6 };
    assert_eq!(written.len(), expected);

    for (format, path) in &written {
        assert!(path.exists(), "{} was not written", format);
        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some(format.file_name()));
    }

    let csv = std::fs::read_to_string(&written[&ExportFormat::XyzCsv]).expect("Failed to read CSV");
    assert_eq!(csv.lines().count(), point_count + 1);

    let asc =
        std::fs::read_to_string(&written[&ExportFormat::EsriAscii]).expect("Failed to read grid");
    assert_eq!(asc.lines().count(), 6 + 48);

    let geojson: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(&written[&ExportFormat::GeoJson]).expect("Failed to read GeoJSON"),
    )
    .expect("Invalid GeoJSON");
    assert_eq!(geojson["type"], "FeatureCollection");
    assert_eq!(geojson["features"].as_array().map(|f| f.len()), Some(point_count + 1));
}

#[test]
fn test_format_labels() {
    let labels: Vec<&str> = ExportFormat::ALL.iter().map(|f| f.label()).collect();
    assert_eq!(
        labels,
        vec!["GeoTIFF", "ESRI_ASCII", "Surfer_GRD", "XYZ_CSV", "KML", "GeoJSON", "DXF"]
    );
}
