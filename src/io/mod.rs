//! I/O modules: drawn ROI input, imagery collaborators and GIS exports

pub mod drawn_feature;
pub mod imagery;
pub mod export;
#[cfg(feature = "sentinel-hub")]
pub mod sentinel_hub;

pub use drawn_feature::{DrawnFeature, DrawnGeometry};
pub use imagery::{BandStack, ImageryCredentials, ImagerySource};
pub use export::{export_all, ExportFormat};
#[cfg(feature = "sentinel-hub")]
pub use sentinel_hub::{SentinelHubClient, SentinelHubConfig};
