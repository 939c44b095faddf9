//! Core scan pipeline modules

pub mod roi;
pub mod raster;
pub mod anomaly;
pub mod georef;
pub mod scan;
pub mod report;

// Re-export main types
pub use roi::{Roi, RoiBuilder, RoiKind, meters_per_degree};
pub use raster::{RasterProvider, RasterAcquisition, synthetic_raster};
pub use anomaly::{AnomalyDetector, DetectorParams, extract_points, gaussian_blur};
pub use georef::{Georef, build_georef, pixel_to_latlon};
pub use scan::{ScanConfig, ScanOrchestrator, ScanResult, ScanSession, run_scan};
pub use report::{Report, build_report};
