use crate::core::scan::ScanResult;
use crate::types::{round_to, DataSource, GeoAnomaly, GeoResult, Heatmap, Polarity, ScanSettings};
use serde::{Deserialize, Serialize};

const METHODS_USED: [&str; 4] = [
    "Multi-layer acquisition over the ROI",
    "Normalization + DoG (Difference of Gaussians) anomaly map",
    "Peak selection with minimum distance constraint",
    "Cluster-based summary (heuristic)",
];

const SOFTWARE_TARGETS: [&str; 6] = [
    "QGIS",
    "Surfer",
    "ArcMap",
    "Voxler",
    "Global Mapper",
    "RockWorks",
];

/// Summary of a completed scan for the front end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Scan completion time, `%Y-%m-%d %H:%M:%S` UTC
    pub timestamp: String,
    pub overall_accuracy_pct: f64,
    /// NEG anomalies
    pub voids_detected: usize,
    /// POS anomalies
    pub metals_detected: usize,
    pub findings_top3: Vec<GeoAnomaly>,
    pub models_used: usize,
    pub methods_used: Vec<String>,
    pub sources_used: Vec<String>,
    pub software_targets: Vec<String>,
    pub patterns: Vec<String>,
    pub data_type: String,
    pub scan_mode: String,
    pub real_data_requested: bool,
    pub enabled_layers: Vec<String>,
}

impl Report {
    pub fn to_json(&self) -> GeoResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Heuristic confidence in [0.15 * 0.75, 0.99] from heatmap contrast and layer count
pub fn confidence(heatmap: &Heatmap, enabled_layers: usize) -> f64 {
    let contrast = population_std(heatmap);
    let base = (0.35 + 0.55 * (contrast / 0.25)).clamp(0.15, 0.95);
    (base * (0.75 + 0.08 * enabled_layers as f64)).min(0.99)
}

fn population_std(grid: &Heatmap) -> f64 {
    let n = grid.len();
    if n == 0 {
        return 0.0;
    }
    let mean = grid.iter().map(|&v| v as f64).sum::<f64>() / n as f64;
    let var = grid.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n as f64;
    var.sqrt()
}

/// Derive the report of a scan. Pure: the same inputs give the same report.
pub fn build_report(result: &ScanResult, settings: &ScanSettings, use_real_data: bool) -> Report {
    let layer_count = settings.enabled_count();
    let accuracy = confidence(&result.heatmap, layer_count);

    let points = &result.anomaly_points;
    let voids = points.iter().filter(|p| p.point.polarity == Polarity::Neg).count();
    let metals = points.iter().filter(|p| p.point.polarity == Polarity::Pos).count();

    let mut top = points.clone();
    top.sort_by(|a, b| b.point.score.total_cmp(&a.point.score));
    top.truncate(3);

    let mut patterns = Vec::new();
    if voids > 0 {
        patterns.push("Void / negative anomaly clusters".to_string());
    }
    if metals > 0 {
        patterns.push("Positive anomaly clusters".to_string());
    }
    if patterns.is_empty() {
        patterns.push("No distinct pattern".to_string());
    }

    let (data_type, sources_used) = match &result.data_source {
        DataSource::Imagery { layers } => (
            "Real data (Sentinel Hub)".to_string(),
            layers.iter().map(|l| l.description().to_string()).collect(),
        ),
        DataSource::Synthetic { fallback_reason: Some(reason) } => (
            format!("Demo (synthetic raster, real data unavailable: {})", reason),
            vec!["Demo raster".to_string()],
        ),
        DataSource::Synthetic { fallback_reason: None } => (
            "Demo (synthetic raster)".to_string(),
            vec!["Demo raster".to_string()],
        ),
    };

    Report {
        timestamp: result.completed_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        overall_accuracy_pct: round_to(accuracy * 100.0, 1),
        voids_detected: voids,
        metals_detected: metals,
        findings_top3: top,
        models_used: layer_count.max(1),
        methods_used: METHODS_USED.iter().map(|s| s.to_string()).collect(),
        sources_used,
        software_targets: SOFTWARE_TARGETS.iter().map(|s| s.to_string()).collect(),
        patterns,
        data_type,
        scan_mode: "Comprehensive scan".to_string(),
        real_data_requested: use_real_data,
        enabled_layers: settings.enabled_layers(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scan::{ScanConfig, ScanOrchestrator};
    use crate::core::roi::RoiBuilder;
    use crate::types::DataSourceUnavailable;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    fn scan() -> ScanResult {
        let roi = RoiBuilder::from_circle(35.0, 39.0, 500.0);
        let config = ScanConfig { raster_size: 64, ..ScanConfig::default() };
        ScanOrchestrator::new(config)
            .run_scan(&roi, &ScanSettings::default(), false)
            .unwrap()
    }

    #[test]
    fn test_confidence_bounds() {
        let flat = Array2::<f32>::zeros((4, 4));
        // contrast 0 -> base 0.35, one layer -> 0.35 * 0.83
        assert_abs_diff_eq!(confidence(&flat, 1), 0.35 * 0.83, epsilon = 1e-12);

        let mut split = Array2::<f32>::zeros((4, 4));
        split.slice_mut(ndarray::s![..2, ..]).fill(1.0);
        // contrast 0.5 -> base clamps to 0.95, capped at 0.99
        assert_abs_diff_eq!(confidence(&split, 4), 0.99, epsilon = 1e-12);
    }

    #[test]
    fn test_report_is_idempotent() {
        let result = scan();
        let settings = ScanSettings::default();
        let a = build_report(&result, &settings, false);
        let b = build_report(&result, &settings, false);
        assert_eq!(a, b);
    }

    #[test]
    fn test_report_counts() {
        let result = scan();
        let report = build_report(&result, &ScanSettings::default(), false);
        assert_eq!(
            report.voids_detected + report.metals_detected,
            result.anomaly_points.len()
        );
        assert!(report.findings_top3.len() <= 3);
        assert_eq!(report.findings_top3[0], result.anomaly_points[0]);
        assert_eq!(report.models_used, 2);
        assert_eq!(report.sources_used, vec!["Demo raster"]);
        assert_eq!(report.software_targets.len(), 6);
    }

    #[test]
    fn test_report_records_fallback() {
        let mut result = scan();
        result.data_source = DataSource::Synthetic {
            fallback_reason: Some(DataSourceUnavailable::NoCredentials),
        };
        let report = build_report(&result, &ScanSettings::default(), true);
        assert!(report.real_data_requested);
        assert!(report.data_type.contains("credentials"));

        let json = report.to_json().unwrap();
        assert!(json.contains("\"overall_accuracy_pct\""));
    }

    #[test]
    fn test_models_used_minimum() {
        let result = scan();
        let none = ScanSettings { radar: false, optic: false, thermal: false, magnetic: false };
        assert_eq!(build_report(&result, &none, false).models_used, 1);
    }
}
