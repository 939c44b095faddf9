use crate::io::drawn_feature::{DrawnFeature, DrawnGeometry};
use crate::types::{BoundingBox, GeoError, GeoResult};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Number of vertices used to approximate a circle ROI (5 degree step)
pub const CIRCLE_VERTICES: usize = 72;

/// ROI shape as drawn by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoiKind {
    Polygon,
    Circle,
}

/// Normalized region of interest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Roi {
    pub kind: RoiKind,
    /// Closed (lon, lat) ring, first vertex == last vertex
    pub polygon: Vec<(f64, f64)>,
    /// (lat, lon)
    pub center: (f64, f64),
    pub area_m2: f64,
}

impl Roi {
    /// Bounding box of the ROI ring
    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::from_lon_lat(&self.polygon).unwrap_or(BoundingBox {
            min_lon: self.center.1,
            max_lon: self.center.1,
            min_lat: self.center.0,
            max_lat: self.center.0,
        })
    }

    /// Distinct vertices of the ring (the closing vertex is not counted)
    pub fn vertex_count(&self) -> usize {
        self.polygon.len().saturating_sub(1)
    }
}

/// Meters per degree of latitude and longitude at `lat` degrees.
///
/// WGS84 meridian/parallel arc-length series, returned as (lat, lon).
pub fn meters_per_degree(lat: f64) -> (f64, f64) {
    let phi = lat.to_radians();
    let m_per_deg_lat = 111132.92 - 559.82 * (2.0 * phi).cos() + 1.175 * (4.0 * phi).cos();
    let m_per_deg_lon = 111412.84 * phi.cos() - 93.5 * (3.0 * phi).cos();
    (m_per_deg_lat, m_per_deg_lon)
}

/// Builds [`Roi`]s from drawn map features
pub struct RoiBuilder;

impl RoiBuilder {
    /// Build an ROI from a drawn feature
    pub fn build_roi(feature: &DrawnFeature) -> GeoResult<Roi> {
        match &feature.geometry {
            DrawnGeometry::Polygon { ring } => Self::from_polygon(ring),
            DrawnGeometry::Circle { lon, lat, radius_m } => {
                Ok(Self::from_circle(*lon, *lat, *radius_m))
            }
        }
    }

    /// Parse GeoJSON text and build the ROI in one step
    pub fn from_geojson(text: &str) -> GeoResult<Roi> {
        let feature = DrawnFeature::from_json(text)?;
        Self::build_roi(&feature)
    }

    /// Polygon ROI; the ring is closed if needed
    pub fn from_polygon(ring: &[(f64, f64)]) -> GeoResult<Roi> {
        let mut ring = ring.to_vec();
        if let (Some(&first), Some(&last)) = (ring.first(), ring.last()) {
            if first != last {
                ring.push(first);
            }
        }

        let distinct = ring.len().saturating_sub(1);
        if distinct < 3 {
            return Err(GeoError::InvalidGeometry(format!(
                "polygon ring needs at least 3 distinct vertices, got {}",
                distinct
            )));
        }

        let (c_lon, c_lat) = ring_centroid(&ring);
        let area_m2 = polygon_area_m2(&ring, c_lon, c_lat);

        log::debug!(
            "Polygon ROI: {} vertices, centroid ({:.6}, {:.6}), area {:.1} m2",
            distinct, c_lat, c_lon, area_m2
        );

        Ok(Roi {
            kind: RoiKind::Polygon,
            polygon: ring,
            center: (c_lat, c_lon),
            area_m2,
        })
    }

    /// Circle ROI approximated by a 72-vertex ring; area is analytic.
    /// `lat` must lie strictly between the poles.
    pub fn from_circle(lon: f64, lat: f64, radius_m: f64) -> Roi {
        let (m_lat, m_lon) = meters_per_degree(lat);
        let r_lat = radius_m / m_lat;
        let r_lon = radius_m / m_lon;

        let mut ring: Vec<(f64, f64)> = (0..CIRCLE_VERTICES)
            .map(|i| {
                let a = ((i * 5) as f64).to_radians();
                (lon + r_lon * a.cos(), lat + r_lat * a.sin())
            })
            .collect();
        ring.push(ring[0]);

        let area_m2 = PI * radius_m * radius_m;
        log::debug!(
            "Circle ROI: center ({}, {}), radius {} m, area {:.1} m2",
            lat,
            lon,
            radius_m,
            area_m2
        );

        Roi {
            kind: RoiKind::Circle,
            polygon: ring,
            center: (lat, lon),
            area_m2,
        }
    }
}

/// Area-weighted centroid of a closed ring as (lon, lat)
fn ring_centroid(ring: &[(f64, f64)]) -> (f64, f64) {
    // Shift to the first vertex to keep the cross products well conditioned
    let (x0, y0) = ring[0];
    let mut twice_area = 0.0;
    let mut cx = 0.0;
    let mut cy = 0.0;

    for pair in ring.windows(2) {
        let (x1, y1) = (pair[0].0 - x0, pair[0].1 - y0);
        let (x2, y2) = (pair[1].0 - x0, pair[1].1 - y0);
        let cross = x1 * y2 - x2 * y1;
        twice_area += cross;
        cx += (x1 + x2) * cross;
        cy += (y1 + y2) * cross;
    }

    if twice_area.abs() > f64::EPSILON {
        (x0 + cx / (3.0 * twice_area), y0 + cy / (3.0 * twice_area))
    } else {
        let distinct = &ring[..ring.len() - 1];
        let n = distinct.len() as f64;
        (
            distinct.iter().map(|p| p.0).sum::<f64>() / n,
            distinct.iter().map(|p| p.1).sum::<f64>() / n,
        )
    }
}

/// Shoelace area in a local tangent plane around the centroid
fn polygon_area_m2(ring: &[(f64, f64)], c_lon: f64, c_lat: f64) -> f64 {
    let (m_lat, m_lon) = meters_per_degree(c_lat);
    let local: Vec<(f64, f64)> = ring
        .iter()
        .map(|&(lon, lat)| ((lon - c_lon) * m_lon, (lat - c_lat) * m_lat))
        .collect();

    let twice_area: f64 = local
        .windows(2)
        .map(|pair| pair[0].0 * pair[1].1 - pair[1].0 * pair[0].1)
        .sum();
    twice_area.abs() * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_meters_per_degree_equator() {
        let (m_lat, m_lon) = meters_per_degree(0.0);
        assert_relative_eq!(m_lat, 111132.92 - 559.82 + 1.175, epsilon = 1e-9);
        assert_relative_eq!(m_lon, 111412.84 - 93.5, epsilon = 1e-9);
    }

    #[test]
    fn test_square_area_at_equator() {
        let d = 0.01;
        let roi = RoiBuilder::from_polygon(&[(0.0, 0.0), (d, 0.0), (d, d), (0.0, d)]).unwrap();
        let expected = (d * 111320.0).powi(2);
        assert_eq!(roi.kind, RoiKind::Polygon);
        assert_relative_eq!(roi.area_m2, expected, max_relative = 0.02);
        assert_eq!(roi.polygon.len(), 5);
        assert_eq!(roi.polygon.first(), roi.polygon.last());
        assert_relative_eq!(roi.center.0, d / 2.0, epsilon = 1e-12);
        assert_relative_eq!(roi.center.1, d / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_clockwise_ring_area_is_positive() {
        let ring = [(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0), (0.0, 0.0)];
        let roi = RoiBuilder::from_polygon(&ring).unwrap();
        assert!(roi.area_m2 > 0.0);
    }

    #[test]
    fn test_degenerate_polygon_rejected() {
        let result = RoiBuilder::from_polygon(&[(0.0, 0.0), (1.0, 1.0), (0.0, 0.0)]);
        assert!(matches!(result, Err(GeoError::InvalidGeometry(_))));
    }

    #[test]
    fn test_circle_roi() {
        let roi = RoiBuilder::from_circle(35.0, 39.0, 500.0);
        assert_eq!(roi.kind, RoiKind::Circle);
        assert_eq!(roi.area_m2, PI * 500.0 * 500.0);
        assert_relative_eq!(roi.area_m2, 785398.16, epsilon = 0.01);
        assert_eq!(roi.vertex_count(), 72);
        assert_eq!(roi.center, (39.0, 35.0));

        // Latitude and longitude radii differ away from the equator
        let bbox = roi.bounds();
        let lat_span = bbox.max_lat - bbox.min_lat;
        let lon_span = bbox.max_lon - bbox.min_lon;
        assert!(lon_span > lat_span);
    }
}
