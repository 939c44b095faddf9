//! Sentinel Hub Process API client

use crate::io::imagery::{
    validate_stack, BandStack, ImageryCredentials, ImageryResult, ImagerySource,
};
use crate::types::{BoundingBox, DataSourceUnavailable, GeoError, GeoResult};
use gdal::Dataset;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const RADAR_EVALSCRIPT: &str = r#"//VERSION=3
function setup() {
  return {input: [{bands: ["VV", "VH"], units: "LINEAR"}], output: {bands: 2, sampleType: "FLOAT32"}};
}
function evaluatePixel(s) { return [s.VV, s.VH]; }
"#;

const OPTICAL_EVALSCRIPT: &str = r#"//VERSION=3
function setup() {
  return {
    input: [{bands: ["B02","B03","B04","B08","B11","SCL"], units: "REFLECTANCE"}],
    output: {bands: 4, sampleType: "FLOAT32"}
  };
}
function evaluatePixel(s) {
  var scl = s.SCL;
  var invalid = (scl==3 || scl==8 || scl==9 || scl==10 || scl==11);
  if (invalid) { return [0,0,0,0]; }
  var ndvi = (s.B08 - s.B04) / (s.B08 + s.B04 + 1e-6);
  var ndwi = (s.B03 - s.B08) / (s.B03 + s.B08 + 1e-6);
  var ndbi = (s.B11 - s.B08) / (s.B11 + s.B08 + 1e-6);
  var bright = (s.B02 + s.B03 + s.B04) / 3.0;
  return [ndvi, ndwi, ndbi, bright];
}
"#;

const THERMAL_EVALSCRIPT: &str = r#"//VERSION=3
function setup() {
  return {input: [{bands: ["ST_B10"], units: "DN"}], output: {bands: 1, sampleType: "FLOAT32"}};
}
function evaluatePixel(s) { return [s.ST_B10]; }
"#;

/// Distinguishes concurrent in-memory TIFF names
static MEM_FILE_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Sentinel Hub endpoints and request parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelHubConfig {
    pub token_url: String,
    pub process_url: String,
    /// RFC 3339 acquisition window
    pub time_from: String,
    pub time_to: String,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for SentinelHubConfig {
    fn default() -> Self {
        Self {
            token_url:
                "https://services.sentinel-hub.com/auth/realms/main/protocol/openid-connect/token"
                    .to_string(),
            process_url: "https://services.sentinel-hub.com/api/v1/process".to_string(),
            time_from: "2024-01-01T00:00:00Z".to_string(),
            time_to: "2026-12-31T23:59:59Z".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Blocking Sentinel Hub client implementing [`ImagerySource`]
pub struct SentinelHubClient {
    config: SentinelHubConfig,
    credentials: Option<ImageryCredentials>,
    client: reqwest::blocking::Client,
}

impl SentinelHubClient {
    pub fn new(
        config: SentinelHubConfig,
        credentials: Option<ImageryCredentials>,
    ) -> GeoResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("geoscan/0.2.0")
            .build()
            .map_err(|e| GeoError::Processing(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            credentials,
            client,
        })
    }

    /// Client with credentials from the environment; `None` when they are not set
    pub fn from_env(config: SentinelHubConfig) -> GeoResult<Option<Self>> {
        match ImageryCredentials::from_env() {
            Some(credentials) => Self::new(config, Some(credentials)).map(Some),
            None => Ok(None),
        }
    }

    fn access_token(&self) -> ImageryResult<String> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(DataSourceUnavailable::NoCredentials)?;

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
            ])
            .send()
            .map_err(|e| DataSourceUnavailable::Request(format!("token request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(DataSourceUnavailable::Request(format!(
                "token request returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let token: TokenResponse = response
            .json()
            .map_err(|e| DataSourceUnavailable::InvalidResponse(format!("token response: {}", e)))?;
        Ok(token.access_token)
    }

    fn process_request(
        &self,
        collection: &str,
        evalscript: &str,
        bbox: &BoundingBox,
        size: (usize, usize),
        bands: usize,
    ) -> ImageryResult<BandStack> {
        log::info!("Requesting {} {}x{} over {:?}", collection, size.0, size.1, bbox);
        let token = self.access_token()?;

        let body = json!({
            "input": {
                "bounds": {
                    "bbox": [bbox.min_lon, bbox.min_lat, bbox.max_lon, bbox.max_lat],
                    "properties": {"crs": "http://www.opengis.net/def/crs/OGC/1.3/CRS84"},
                },
                "data": [{
                    "type": collection,
                    "dataFilter": {
                        "timeRange": {"from": self.config.time_from, "to": self.config.time_to},
                    },
                }],
            },
            "output": {
                "width": size.0,
                "height": size.1,
                "responses": [{"identifier": "default", "format": {"type": "image/tiff"}}],
            },
            "evalscript": evalscript,
        });

        let response = self
            .client
            .post(&self.config.process_url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "image/tiff")
            .json(&body)
            .send()
            .map_err(|e| {
                DataSourceUnavailable::Request(format!("{} request failed: {}", collection, e))
            })?;

        if !response.status().is_success() {
            return Err(DataSourceUnavailable::Request(format!(
                "{} request returned HTTP {}",
                collection,
                response.status().as_u16()
            )));
        }

        let content = response
            .bytes()
            .map_err(|e| {
                DataSourceUnavailable::Request(format!("failed to read response body: {}", e))
            })?;
        log::debug!("Received {} bytes for {}", content.len(), collection);

        let stack = decode_tiff(content.to_vec())?;
        validate_stack(&stack, size, bands)?;
        Ok(stack)
    }
}

/// Decode a multi-band float TIFF through GDAL's in-memory filesystem
fn decode_tiff(bytes: Vec<u8>) -> ImageryResult<BandStack> {
    let id = MEM_FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mem_path = format!("/vsimem/geoscan_{}_{}.tif", std::process::id(), id);

    gdal::vsi::create_mem_file(&mem_path, bytes)
        .map_err(|e| DataSourceUnavailable::InvalidResponse(format!("cannot stage TIFF: {}", e)))?;
    let stack = read_band_stack(&mem_path);
    if let Err(e) = gdal::vsi::unlink_mem_file(&mem_path) {
        log::warn!("Failed to release {}: {}", mem_path, e);
    }
    stack
}

fn read_band_stack(path: &str) -> ImageryResult<BandStack> {
    let invalid =
        |e: gdal::errors::GdalError| DataSourceUnavailable::InvalidResponse(e.to_string());

    let dataset = Dataset::open(path).map_err(invalid)?;
    let (width, height) = dataset.raster_size();
    let count = dataset.raster_count() as usize;

    let mut stack = BandStack::zeros((height, width, count));
    for b in 0..count {
        let band = dataset.rasterband((b + 1) as isize).map_err(invalid)?;
        let data = band
            .read_as::<f32>((0, 0), (width, height), (width, height), None)
            .map_err(invalid)?;
        for (idx, value) in data.data.into_iter().enumerate() {
            stack[[idx / width, idx % width, b]] = value;
        }
    }
    Ok(stack)
}

impl ImagerySource for SentinelHubClient {
    fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    fn fetch_radar(&self, bbox: &BoundingBox, size: (usize, usize)) -> ImageryResult<BandStack> {
        self.process_request("sentinel-1-grd", RADAR_EVALSCRIPT, bbox, size, 2)
    }

    fn fetch_optical(&self, bbox: &BoundingBox, size: (usize, usize)) -> ImageryResult<BandStack> {
        self.process_request("sentinel-2-l2a", OPTICAL_EVALSCRIPT, bbox, size, 4)
    }

    fn fetch_thermal(&self, bbox: &BoundingBox, size: (usize, usize)) -> ImageryResult<BandStack> {
        self.process_request("landsat-ot-l2", THERMAL_EVALSCRIPT, bbox, size, 1)
    }
}
