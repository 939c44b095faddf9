//! Imagery collaborator interface for real-data scans

use crate::types::{BoundingBox, DataSourceUnavailable};
use ndarray::Array3;

/// Band stack returned by an imagery source (height x width x bands)
pub type BandStack = Array3<f32>;

/// Result of an imagery request
pub type ImageryResult<T> = Result<T, DataSourceUnavailable>;

/// External provider of per-layer feature bands over a bounding box.
///
/// Implementations must bound every request with a timeout and report
/// failures as [`DataSourceUnavailable`] rather than panicking.
pub trait ImagerySource: Send {
    /// Whether credentials are configured; checked before any request
    fn has_credentials(&self) -> bool;

    /// Radar backscatter, 2 bands: VV, VH
    fn fetch_radar(&self, bbox: &BoundingBox, size: (usize, usize)) -> ImageryResult<BandStack>;

    /// Optical indices, 4 bands: NDVI, NDWI, NDBI, brightness
    fn fetch_optical(&self, bbox: &BoundingBox, size: (usize, usize)) -> ImageryResult<BandStack>;

    /// Thermal, 1 band
    fn fetch_thermal(&self, bbox: &BoundingBox, size: (usize, usize)) -> ImageryResult<BandStack>;
}

/// Check a returned stack against the requested shape
pub fn validate_stack(
    stack: &BandStack,
    size: (usize, usize),
    expected_bands: usize,
) -> ImageryResult<()> {
    let (height, width, bands) = stack.dim();
    if (width, height) != size || bands != expected_bands {
        return Err(DataSourceUnavailable::InvalidResponse(format!(
            "expected {}x{}x{} stack, got {}x{}x{}",
            size.1, size.0, expected_bands, height, width, bands
        )));
    }
    Ok(())
}

/// Client credentials read from the environment
#[derive(Clone)]
pub struct ImageryCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl ImageryCredentials {
    pub const CLIENT_ID_VAR: &'static str = "SH_CLIENT_ID";
    pub const CLIENT_SECRET_VAR: &'static str = "SH_CLIENT_SECRET";

    /// Read `SH_CLIENT_ID` / `SH_CLIENT_SECRET`; `None` if either is missing or empty
    pub fn from_env() -> Option<Self> {
        let client_id = std::env::var(Self::CLIENT_ID_VAR).ok().filter(|v| !v.is_empty())?;
        let client_secret = std::env::var(Self::CLIENT_SECRET_VAR).ok().filter(|v| !v.is_empty())?;
        Some(Self { client_id, client_secret })
    }
}

impl std::fmt::Debug for ImageryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageryCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_stack_shape() {
        let stack = BandStack::zeros((4, 6, 2));
        assert!(validate_stack(&stack, (6, 4), 2).is_ok());
        assert!(matches!(
            validate_stack(&stack, (4, 6), 2),
            Err(DataSourceUnavailable::InvalidResponse(_))
        ));
        assert!(validate_stack(&stack, (6, 4), 4).is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let creds = ImageryCredentials {
            client_id: "id".to_string(),
            client_secret: "hunter2".to_string(),
        };
        let text = format!("{:?}", creds);
        assert!(!text.contains("hunter2"));
    }
}
