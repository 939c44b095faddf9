use crate::core::anomaly::{AnomalyDetector, DetectorParams};
use crate::core::georef::{build_georef, Georef};
use crate::core::raster::{RasterProvider, DEFAULT_SEED};
use crate::core::report::{build_report, Report};
use crate::core::roi::{Roi, RoiBuilder};
use crate::io::export::{export_all, ExportFormat};
use crate::io::imagery::ImagerySource;
use crate::types::{
    round_to, AnomalyPoint, DataSource, GeoAnomaly, GeoError, GeoResult, Heatmap, Raster,
    ScanSettings, Timestamp,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Scan pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Raster edge length in pixels
    pub raster_size: usize,
    /// Seed of the synthetic raster generator
    pub synthetic_seed: u64,
    pub detector: DetectorParams,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            raster_size: 256,
            synthetic_seed: DEFAULT_SEED,
            detector: DetectorParams::default(),
        }
    }
}

impl ScanConfig {
    /// Load a configuration from JSON; missing fields take their defaults
    pub fn from_json(text: &str) -> GeoResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Everything a completed scan produced
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub roi: Roi,
    pub roi_area_m2: f64,
    pub heatmap: Heatmap,
    pub raster: Raster,
    /// Ordered by descending score
    pub anomaly_points: Vec<GeoAnomaly>,
    pub georef: Georef,
    pub settings: ScanSettings,
    /// Source the raster actually came from
    pub data_source: DataSource,
    pub completed_at: Timestamp,
}

/// Heuristic (depth_m, volume_m3) for a peak; uncalibrated model output
pub fn physical_estimates(point: &AnomalyPoint) -> (f64, f64) {
    let depth_m = round_to(point.z_rel.abs() * 2.0 + 1.0, 2);
    let volume_m3 = round_to(depth_m * (3.5 + point.score * 20.0), 2);
    (depth_m, volume_m3)
}

/// Attach geographic position and heuristic estimates to a peak
pub fn georeference_point(point: AnomalyPoint, georef: &Georef) -> GeoAnomaly {
    let (lat, lon) = georef.pixel_to_latlon(point.row, point.col);
    let (depth_m, volume_m3) = physical_estimates(&point);
    GeoAnomaly {
        point,
        lat: round_to(lat, 8),
        lon: round_to(lon, 8),
        depth_m,
        volume_m3,
    }
}

/// Runs raster acquisition, detection and georeferencing as one call
pub struct ScanOrchestrator {
    config: ScanConfig,
    provider: RasterProvider,
    detector: AnomalyDetector,
}

impl ScanOrchestrator {
    /// Synthetic-only orchestrator
    pub fn new(config: ScanConfig) -> Self {
        let provider = RasterProvider::synthetic(config.synthetic_seed);
        Self::with_provider(config, provider)
    }

    /// Orchestrator that tries `imagery` in real-data mode
    pub fn with_imagery(config: ScanConfig, imagery: Box<dyn ImagerySource>) -> Self {
        let provider = RasterProvider::with_imagery(imagery, config.synthetic_seed);
        Self::with_provider(config, provider)
    }

    fn with_provider(config: ScanConfig, provider: RasterProvider) -> Self {
        let detector = AnomalyDetector::with_params(config.detector.clone());
        Self {
            config,
            provider,
            detector,
        }
    }

    /// Orchestrator using the Sentinel Hub client when its credentials are set
    pub fn from_env(config: ScanConfig) -> Self {
        #[cfg(feature = "sentinel-hub")]
        {
            use crate::io::sentinel_hub::{SentinelHubClient, SentinelHubConfig};
            match SentinelHubClient::from_env(SentinelHubConfig::default()) {
                Ok(Some(client)) => return Self::with_imagery(config, Box::new(client)),
                Ok(None) => log::debug!("Sentinel Hub credentials not set, synthetic rasters only"),
                Err(e) => log::warn!("Could not create Sentinel Hub client: {}", e),
            }
        }
        Self::new(config)
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Run the full pipeline over an ROI
    pub fn run_scan(
        &self,
        roi: &Roi,
        settings: &ScanSettings,
        use_real_data: bool,
    ) -> GeoResult<ScanResult> {
        let size = self.config.raster_size;
        if size == 0 {
            return Err(GeoError::Processing("Raster size must be positive".to_string()));
        }
        log::info!(
            "Starting scan: {:?} ROI, {:.1} m2, layers {:?}, real data {}",
            roi.kind, roi.area_m2, settings.enabled_layers(), use_real_data
        );

        let acquisition = self.provider.get_raster(roi, size, settings, use_real_data);
        let heatmap = self.detector.compute_heatmap(&acquisition.raster, settings)?;
        let (height, width) = heatmap.dim();
        let georef = build_georef(roi, height, width);

        let anomaly_points: Vec<GeoAnomaly> = self
            .detector
            .extract_points(&heatmap)
            .into_iter()
            .map(|p| georeference_point(p, &georef))
            .collect();

        log::info!("Scan completed: {} anomaly points", anomaly_points.len());

        Ok(ScanResult {
            roi: roi.clone(),
            roi_area_m2: roi.area_m2,
            heatmap,
            raster: acquisition.raster,
            anomaly_points,
            georef,
            settings: *settings,
            data_source: acquisition.source,
            completed_at: Utc::now(),
        })
    }
}

impl Default for ScanOrchestrator {
    fn default() -> Self {
        Self::new(ScanConfig::default())
    }
}

/// Run a scan with the default configuration
pub fn run_scan(roi: &Roi, settings: &ScanSettings, use_real_data: bool) -> GeoResult<ScanResult> {
    ScanOrchestrator::from_env(ScanConfig::default()).run_scan(roi, settings, use_real_data)
}

/// Per-user scan context: the current ROI and the outputs of the last scan.
///
/// Holds no state shared across sessions; callers must not run overlapping
/// scans on one session.
pub struct ScanSession {
    orchestrator: ScanOrchestrator,
    roi: Option<Roi>,
    last_settings: Option<ScanSettings>,
    last_result: Option<ScanResult>,
    last_report: Option<Report>,
}

impl ScanSession {
    pub fn new(orchestrator: ScanOrchestrator) -> Self {
        Self {
            orchestrator,
            roi: None,
            last_settings: None,
            last_result: None,
            last_report: None,
        }
    }

    /// Replace the ROI from a drawn GeoJSON feature; previous outputs are dropped
    pub fn set_roi_from_feature(&mut self, geojson: &str) -> GeoResult<&Roi> {
        let roi = RoiBuilder::from_geojson(geojson)?;
        self.set_roi(roi);
        self.roi.as_ref().ok_or_else(|| GeoError::Processing("ROI was not stored".to_string()))
    }

    pub fn set_roi(&mut self, roi: Roi) {
        self.clear_outputs();
        self.roi = Some(roi);
    }

    pub fn roi(&self) -> Option<&Roi> {
        self.roi.as_ref()
    }

    /// Scan the current ROI and build its report
    pub fn run_scan(
        &mut self,
        settings: ScanSettings,
        use_real_data: bool,
    ) -> GeoResult<&ScanResult> {
        let roi = self.roi.as_ref().ok_or_else(|| {
            GeoError::Processing("No ROI selected; draw a polygon or circle first".to_string())
        })?;

        let result = self.orchestrator.run_scan(roi, &settings, use_real_data)?;
        self.last_report = Some(build_report(&result, &settings, use_real_data));
        self.last_settings = Some(settings);
        self.last_result = Some(result);

        self.last_result
            .as_ref()
            .ok_or_else(|| GeoError::Processing("Scan result was not stored".to_string()))
    }

    pub fn last_result(&self) -> Option<&ScanResult> {
        self.last_result.as_ref()
    }

    pub fn last_settings(&self) -> Option<&ScanSettings> {
        self.last_settings.as_ref()
    }

    pub fn report(&self) -> Option<&Report> {
        self.last_report.as_ref()
    }

    /// Export the last scan into `dir`
    pub fn export<P: AsRef<Path>>(&self, dir: P) -> GeoResult<BTreeMap<ExportFormat, PathBuf>> {
        let result = self
            .last_result
            .as_ref()
            .ok_or_else(|| GeoError::Processing("No scan result to export".to_string()))?;
        export_all(result, dir)
    }

    /// Forget the ROI and all scan outputs
    pub fn clear(&mut self) {
        self.roi = None;
        self.clear_outputs();
    }

    fn clear_outputs(&mut self) {
        self.last_settings = None;
        self.last_result = None;
        self.last_report = None;
    }
}

impl Default for ScanSession {
    fn default() -> Self {
        Self::new(ScanOrchestrator::default())
    }
}
