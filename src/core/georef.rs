use crate::core::roi::Roi;
use crate::types::{BoundingBox, GeoTransform};
use serde::{Deserialize, Serialize};

/// Linear bounding-box mapping between the pixel grid and EPSG:4326.
///
/// Row 0 is the north edge (max latitude), column 0 the west edge. Only valid
/// for small ROIs where curvature is negligible.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Georef {
    pub lon_min: f64,
    pub lon_max: f64,
    pub lat_min: f64,
    pub lat_max: f64,
    pub height: usize,
    pub width: usize,
}

/// Build the georeference of an `height` x `width` grid over the ROI bounds
pub fn build_georef(roi: &Roi, height: usize, width: usize) -> Georef {
    Georef::from_bounds(&roi.bounds(), height, width)
}

impl Georef {
    pub fn from_bounds(bbox: &BoundingBox, height: usize, width: usize) -> Self {
        Self {
            lon_min: bbox.min_lon,
            lon_max: bbox.max_lon,
            lat_min: bbox.min_lat,
            lat_max: bbox.max_lat,
            height,
            width,
        }
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox {
            min_lon: self.lon_min,
            max_lon: self.lon_max,
            min_lat: self.lat_min,
            max_lat: self.lat_max,
        }
    }

    /// Map a pixel to (lat, lon)
    pub fn pixel_to_latlon(&self, row: usize, col: usize) -> (f64, f64) {
        pixel_to_latlon(self, row, col)
    }

    /// Cell size in degrees along (lon, lat), pixel centers spanning the bounds
    pub fn cell_size(&self) -> (f64, f64) {
        (
            (self.lon_max - self.lon_min) / span(self.width),
            (self.lat_max - self.lat_min) / span(self.height),
        )
    }

    /// GDAL-style transform with the bounds as the outer raster edges
    pub fn geo_transform(&self) -> GeoTransform {
        GeoTransform {
            top_left_x: self.lon_min,
            pixel_width: (self.lon_max - self.lon_min) / self.width.max(1) as f64,
            rotation_x: 0.0,
            top_left_y: self.lat_max,
            rotation_y: 0.0,
            pixel_height: -(self.lat_max - self.lat_min) / self.height.max(1) as f64,
        }
    }
}

/// Pixel centers are spread over n - 1 intervals; a single pixel sits on the min edge
fn span(n: usize) -> f64 {
    n.saturating_sub(1).max(1) as f64
}

/// Map a pixel to (lat, lon) under the georef's linear model
pub fn pixel_to_latlon(georef: &Georef, row: usize, col: usize) -> (f64, f64) {
    let fr = if georef.height > 1 { row as f64 / span(georef.height) } else { 0.0 };
    let fc = if georef.width > 1 { col as f64 / span(georef.width) } else { 0.0 };
    let lat = georef.lat_max - fr * (georef.lat_max - georef.lat_min);
    let lon = georef.lon_min + fc * (georef.lon_max - georef.lon_min);
    (lat, lon)
}
