use crate::types::{GeoError, GeoResult};
use serde::Deserialize;
use serde_json::Value;

/// Geometry of a feature drawn on the map front end
#[derive(Debug, Clone, PartialEq)]
pub enum DrawnGeometry {
    /// First ring of a GeoJSON polygon, as (lon, lat) pairs
    Polygon { ring: Vec<(f64, f64)> },
    /// Point with a radius in meters
    Circle { lon: f64, lat: f64, radius_m: f64 },
}

/// A GeoJSON-like feature produced by the drawing tools
#[derive(Debug, Clone, PartialEq)]
pub struct DrawnFeature {
    pub geometry: DrawnGeometry,
}

#[derive(Debug, Deserialize)]
struct RawFeature {
    #[serde(default)]
    geometry: Option<RawGeometry>,
    #[serde(default)]
    properties: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct RawGeometry {
    #[serde(rename = "type", default)]
    geometry_type: Option<String>,
    #[serde(default)]
    coordinates: Value,
}

impl DrawnFeature {
    /// Parse a drawn feature from GeoJSON text
    pub fn from_json(text: &str) -> GeoResult<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }

    /// Parse a drawn feature from an already decoded JSON value
    pub fn from_value(value: &Value) -> GeoResult<Self> {
        let raw = RawFeature::deserialize(value)
            .map_err(|e| GeoError::InvalidGeometry(format!("malformed feature: {}", e)))?;

        let geometry = raw.geometry.ok_or_else(|| {
            GeoError::UnsupportedGeometry("feature has no geometry".to_string())
        })?;
        let radius = raw
            .properties
            .as_ref()
            .and_then(|props| props.get("radius"))
            .filter(|r| !r.is_null());

        match geometry.geometry_type.as_deref() {
            Some("Polygon") => {
                let ring = parse_polygon_ring(&geometry.coordinates)?;
                Ok(Self { geometry: DrawnGeometry::Polygon { ring } })
            }
            Some("Point") if radius.is_some() => {
                let (lon, lat) = parse_position(&geometry.coordinates)?;
                if lat.abs() >= 90.0 {
                    return Err(GeoError::InvalidGeometry(format!(
                        "circle center latitude must be within (-90, 90), got {}",
                        lat
                    )));
                }
                let radius_m = radius.and_then(parse_radius).ok_or_else(|| {
                    GeoError::InvalidGeometry("radius must be a number".to_string())
                })?;
                if !radius_m.is_finite() || radius_m < 0.0 {
                    return Err(GeoError::InvalidGeometry(format!(
                        "radius must be a finite non-negative number, got {}",
                        radius_m
                    )));
                }
                Ok(Self { geometry: DrawnGeometry::Circle { lon, lat, radius_m } })
            }
            Some("Point") => Err(GeoError::UnsupportedGeometry(
                "Point without a radius property is not a circle".to_string(),
            )),
            Some(other) => Err(GeoError::UnsupportedGeometry(format!(
                "geometry type '{}' (expected Polygon or circle)",
                other
            ))),
            None => Err(GeoError::UnsupportedGeometry("missing geometry type".to_string())),
        }
    }
}

fn parse_polygon_ring(coordinates: &Value) -> GeoResult<Vec<(f64, f64)>> {
    let rings = coordinates.as_array().ok_or_else(|| {
        GeoError::InvalidGeometry("polygon coordinates must be an array".to_string())
    })?;
    let outer = rings
        .first()
        .and_then(Value::as_array)
        .ok_or_else(|| GeoError::InvalidGeometry("polygon has no outer ring".to_string()))?;

    outer.iter().map(parse_position).collect()
}

/// Radius as a JSON number or a numeric string
fn parse_radius(value: &Value) -> Option<f64> {
    match value {
        Value::String(text) => text.trim().parse().ok(),
        other => other.as_f64(),
    }
}

fn parse_position(value: &Value) -> GeoResult<(f64, f64)> {
    let pair = value
        .as_array()
        .filter(|p| p.len() >= 2)
        .ok_or_else(|| GeoError::InvalidGeometry(format!("expected [lon, lat], got {}", value)))?;

    match (pair[0].as_f64(), pair[1].as_f64()) {
        (Some(lon), Some(lat)) if lon.is_finite() && lat.is_finite() => Ok((lon, lat)),
        _ => Err(GeoError::InvalidGeometry(format!("non-numeric position {}", value))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_polygon() {
        let feature = DrawnFeature::from_json(concat!(
            r#"{"type":"Feature","geometry":{"type":"Polygon","#,
            r#""coordinates":[[[30,40],[31,40],[31,41],[30,40]]]},"properties":{}}"#,
        ))
        .unwrap();
        match feature.geometry {
            DrawnGeometry::Polygon { ring } => {
                assert_eq!(ring.len(), 4);
                assert_eq!(ring[1], (31.0, 40.0));
            }
            other => panic!("expected polygon, got {:?}", other),
        }
    }

    const CIRCLE_FEATURE: &str =
        r#"{"geometry":{"type":"Point","coordinates":[35.0,39.0]},"properties":{"radius":500}}"#;

    #[test]
    fn test_parse_circle() {
        let feature = DrawnFeature::from_json(CIRCLE_FEATURE).unwrap();
        assert_eq!(
            feature.geometry,
            DrawnGeometry::Circle { lon: 35.0, lat: 39.0, radius_m: 500.0 }
        );
    }

    #[test]
    fn test_point_without_radius_is_unsupported() {
        let result = DrawnFeature::from_json(
            r#"{"geometry":{"type":"Point","coordinates":[35.0,39.0]},"properties":null}"#,
        );
        assert!(matches!(result, Err(GeoError::UnsupportedGeometry(_))));
    }

    #[test]
    fn test_linestring_is_unsupported() {
        let result = DrawnFeature::from_json(
            r#"{"geometry":{"type":"LineString","coordinates":[[0,0],[1,1]]}}"#,
        );
        assert!(matches!(result, Err(GeoError::UnsupportedGeometry(_))));
    }

    #[test]
    fn test_bad_coordinates_are_invalid() {
        let result = DrawnFeature::from_json(
            r#"{"geometry":{"type":"Polygon","coordinates":[[["a",1],[2,3],[4,5]]]}}"#,
        );
        assert!(matches!(result, Err(GeoError::InvalidGeometry(_))));

        let negative = DrawnFeature::from_json(
            r#"{"geometry":{"type":"Point","coordinates":[1,2]},"properties":{"radius":-3}}"#,
        );
        assert!(matches!(negative, Err(GeoError::InvalidGeometry(_))));
    }

    fn point_feature(lat: f64, radius: Value) -> Value {
        json!({
            "geometry": {"type": "Point", "coordinates": [35.0, lat]},
            "properties": {"radius": radius},
        })
    }

    #[test]
    fn test_numeric_string_radius() {
        let feature = DrawnFeature::from_value(&point_feature(39.0, json!("500"))).unwrap();
        assert_eq!(
            feature.geometry,
            DrawnGeometry::Circle { lon: 35.0, lat: 39.0, radius_m: 500.0 }
        );

        let garbage = DrawnFeature::from_value(&point_feature(39.0, json!("far")));
        assert!(matches!(garbage, Err(GeoError::InvalidGeometry(_))));
    }

    #[test]
    fn test_polar_circle_rejected() {
        for lat in [90.0, -90.0, 91.5] {
            let result = DrawnFeature::from_value(&point_feature(lat, json!(100)));
            assert!(matches!(result, Err(GeoError::InvalidGeometry(_))), "lat {}", lat);
        }
        assert!(DrawnFeature::from_value(&point_feature(89.9, json!(100))).is_ok());
    }
}
