use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Real-valued raster sample
pub type GridValue = f32;

/// Square input raster (row 0 = north edge)
pub type Raster = Array2<GridValue>;

/// Anomaly intensity map, same shape as the raster, every cell in [0, 1]
pub type Heatmap = Array2<GridValue>;

/// Geographic bounding box in EPSG:4326 degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Bounding box of a (lon, lat) ring
    pub fn from_lon_lat(points: &[(f64, f64)]) -> Option<Self> {
        let first = points.first()?;
        let mut bbox = Self {
            min_lon: first.0,
            max_lon: first.0,
            min_lat: first.1,
            max_lat: first.1,
        };
        for &(lon, lat) in &points[1..] {
            bbox.min_lon = bbox.min_lon.min(lon);
            bbox.max_lon = bbox.max_lon.max(lon);
            bbox.min_lat = bbox.min_lat.min(lat);
            bbox.max_lat = bbox.max_lat.max(lat);
        }
        Some(bbox)
    }

    /// (min_lon, min_lat, max_lon, max_lat), the order imagery services expect
    pub fn as_lon_lat_tuple(&self) -> (f64, f64, f64, f64) {
        (self.min_lon, self.min_lat, self.max_lon, self.max_lat)
    }
}

/// Geospatial transformation parameters (GDAL order)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn to_array(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }
}

/// Sensing layers the user can toggle for a scan.
///
/// Each flag adds a fixed bonus to the detector contrast weight. Radar, optic
/// and thermal also select which imagery bands are requested in real-data mode;
/// magnetic has no imagery band and only affects the weight and report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Sentinel-1 VV/VH backscatter (+0.6)
    pub radar: bool,
    /// Sentinel-2 spectral indices (+0.4)
    pub optic: bool,
    /// Landsat surface temperature (+0.8)
    pub thermal: bool,
    /// Magnetic layer (+0.5)
    pub magnetic: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            radar: true,
            optic: true,
            thermal: false,
            magnetic: false,
        }
    }
}

impl ScanSettings {
    /// Number of enabled flags
    pub fn enabled_count(&self) -> usize {
        [self.radar, self.optic, self.thermal, self.magnetic]
            .iter()
            .filter(|&&on| on)
            .count()
    }

    /// Names of the enabled flags, in declaration order
    pub fn enabled_layers(&self) -> Vec<String> {
        let mut layers = Vec::new();
        if self.radar {
            layers.push("radar".to_string());
        }
        if self.optic {
            layers.push("optic".to_string());
        }
        if self.thermal {
            layers.push("thermal".to_string());
        }
        if self.magnetic {
            layers.push("magnetic".to_string());
        }
        layers
    }
}

/// Anomaly polarity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarity {
    /// High signal (score >= 0.5)
    #[serde(rename = "POS")]
    Pos,
    /// Low signal, void-like
    #[serde(rename = "NEG")]
    Neg,
}

impl Polarity {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.5 {
            Polarity::Pos
        } else {
            Polarity::Neg
        }
    }
}

impl std::fmt::Display for Polarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Polarity::Pos => write!(f, "POS"),
            Polarity::Neg => write!(f, "NEG"),
        }
    }
}

/// A detected heatmap peak in pixel space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyPoint {
    pub row: usize,
    pub col: usize,
    /// Heatmap value at the peak, 5 decimals
    pub score: f64,
    pub polarity: Polarity,
    /// Relative depth indicator, 3 decimals (uncalibrated)
    pub z_rel: f64,
}

/// A peak enriched with geographic position and heuristic physical estimates.
///
/// `depth_m` and `volume_m3` are uncalibrated model output, not measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoAnomaly {
    #[serde(flatten)]
    pub point: AnomalyPoint,
    pub lat: f64,
    pub lon: f64,
    pub depth_m: f64,
    pub volume_m3: f64,
}

/// Imagery layers that can feed the fused raster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageryLayer {
    Radar,
    Optical,
    Thermal,
}

impl ImageryLayer {
    /// Human readable collection description
    pub fn description(&self) -> &'static str {
        match self {
            ImageryLayer::Radar => "Sentinel-1 (VV/VH)",
            ImageryLayer::Optical => "Sentinel-2 (NDVI/NDWI/NDBI/brightness)",
            ImageryLayer::Thermal => "Landsat L2 Thermal (ST_B10)",
        }
    }
}

/// Reasons the real-imagery path could not produce a raster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum DataSourceUnavailable {
    #[error("no imagery source configured")]
    NoCollaborator,

    #[error("imagery credentials are not available")]
    NoCredentials,

    #[error("no imagery layers enabled")]
    NoLayersEnabled,

    #[error("imagery request failed: {0}")]
    Request(String),

    #[error("invalid imagery response: {0}")]
    InvalidResponse(String),
}

/// Where the scan raster actually came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataSource {
    /// Fused, z-scored imagery bands
    Imagery { layers: Vec<ImageryLayer> },
    /// Seeded synthetic raster; `fallback_reason` is set when real data was
    /// requested but could not be used
    Synthetic {
        fallback_reason: Option<DataSourceUnavailable>,
    },
}

impl DataSource {
    pub fn is_synthetic(&self) -> bool {
        matches!(self, DataSource::Synthetic { .. })
    }
}

/// Scan completion stamp carried into reports
pub type Timestamp = DateTime<Utc>;

/// Error types for scanning and export
#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    #[error("Unsupported ROI geometry: {0}")]
    UnsupportedGeometry(String),

    #[error("Invalid ROI geometry: {0}")]
    InvalidGeometry(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML writing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[cfg(feature = "geotiff")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

/// Result type for scan operations
pub type GeoResult<T> = Result<T, GeoError>;

/// Round to a fixed number of decimals
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enabled_count() {
        let settings = ScanSettings { radar: true, optic: false, thermal: true, magnetic: true };
        assert_eq!(settings.enabled_count(), 3);
        assert_eq!(settings.enabled_layers(), vec!["radar", "thermal", "magnetic"]);
    }

    #[test]
    fn test_settings_deserialize_partial() {
        let settings: ScanSettings = serde_json::from_str(r#"{"thermal": true}"#).unwrap();
        assert!(settings.radar);
        assert!(settings.optic);
        assert!(settings.thermal);
        assert!(!settings.magnetic);
    }

    #[test]
    fn test_polarity_threshold() {
        assert_eq!(Polarity::from_score(0.5), Polarity::Pos);
        assert_eq!(Polarity::from_score(0.49999), Polarity::Neg);
        assert_eq!(serde_json::to_string(&Polarity::Neg).unwrap(), "\"NEG\"");
    }

    #[test]
    fn test_bounding_box() {
        let bbox = BoundingBox::from_lon_lat(&[(1.0, 5.0), (3.0, 2.0), (2.0, 7.0)]).unwrap();
        assert_eq!(bbox.as_lon_lat_tuple(), (1.0, 2.0, 3.0, 7.0));
        assert!(BoundingBox::from_lon_lat(&[]).is_none());
    }
}
