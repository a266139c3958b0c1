//! Geographic primitives: coordinates, geometries and features.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// A longitude/latitude pair in degrees.
///
/// Serialized GeoJSON-style as `[lng, lat]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    /// Create a new coordinate.
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// Great-circle distance to another coordinate, in meters.
    pub fn distance_m(self, other: LngLat) -> f64 {
        haversine_m(self, other)
    }
}

impl From<[f64; 2]> for LngLat {
    fn from([lng, lat]: [f64; 2]) -> Self {
        Self { lng, lat }
    }
}

impl From<LngLat> for [f64; 2] {
    fn from(c: LngLat) -> Self {
        [c.lng, c.lat]
    }
}

/// Great-circle distance between two coordinates using the haversine formula.
pub fn haversine_m(a: LngLat, b: LngLat) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = lat2 - lat1;
    let dlng = (b.lng - a.lng).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Geometry type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryKind {
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
}

impl GeometryKind {
    /// GeoJSON type name.
    pub fn as_str(self) -> &'static str {
        match self {
            GeometryKind::Point => "Point",
            GeometryKind::MultiPoint => "MultiPoint",
            GeometryKind::LineString => "LineString",
            GeometryKind::MultiLineString => "MultiLineString",
            GeometryKind::Polygon => "Polygon",
            GeometryKind::MultiPolygon => "MultiPolygon",
        }
    }

    /// Whether this is a point or multipoint.
    pub fn is_point_like(self) -> bool {
        matches!(self, GeometryKind::Point | GeometryKind::MultiPoint)
    }

    /// The multi-geometry kind that collects this kind, if any.
    pub fn multi(self) -> Option<GeometryKind> {
        match self {
            GeometryKind::Point => Some(GeometryKind::MultiPoint),
            GeometryKind::LineString => Some(GeometryKind::MultiLineString),
            GeometryKind::Polygon => Some(GeometryKind::MultiPolygon),
            _ => None,
        }
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A GeoJSON-shaped geometry in longitude/latitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(LngLat),
    MultiPoint(Vec<LngLat>),
    LineString(Vec<LngLat>),
    MultiLineString(Vec<Vec<LngLat>>),
    Polygon(Vec<Vec<LngLat>>),
    MultiPolygon(Vec<Vec<Vec<LngLat>>>),
}

impl Geometry {
    /// The geometry type tag.
    pub fn kind(&self) -> GeometryKind {
        match self {
            Geometry::Point(_) => GeometryKind::Point,
            Geometry::MultiPoint(_) => GeometryKind::MultiPoint,
            Geometry::LineString(_) => GeometryKind::LineString,
            Geometry::MultiLineString(_) => GeometryKind::MultiLineString,
            Geometry::Polygon(_) => GeometryKind::Polygon,
            Geometry::MultiPolygon(_) => GeometryKind::MultiPolygon,
        }
    }

    /// All vertices in document order.
    pub fn vertices(&self) -> Vec<LngLat> {
        match self {
            Geometry::Point(p) => vec![*p],
            Geometry::MultiPoint(points) | Geometry::LineString(points) => points.clone(),
            Geometry::MultiLineString(parts) | Geometry::Polygon(parts) => {
                parts.iter().flatten().copied().collect()
            }
            Geometry::MultiPolygon(polygons) => {
                polygons.iter().flatten().flatten().copied().collect()
            }
        }
    }

    /// Line parts of the geometry: rings for areas, the line itself for lines.
    ///
    /// Points yield no parts.
    pub fn boundary(&self) -> Vec<Vec<LngLat>> {
        match self {
            Geometry::Point(_) | Geometry::MultiPoint(_) => Vec::new(),
            Geometry::LineString(line) => vec![line.clone()],
            Geometry::MultiLineString(parts) | Geometry::Polygon(parts) => parts.clone(),
            Geometry::MultiPolygon(polygons) => polygons.iter().flatten().cloned().collect(),
        }
    }

    /// Translate every vertex by the given delta in degrees.
    pub fn translate(&mut self, dlng: f64, dlat: f64) {
        let shift = |c: &mut LngLat| {
            c.lng += dlng;
            c.lat += dlat;
        };
        match self {
            Geometry::Point(p) => shift(p),
            Geometry::MultiPoint(points) | Geometry::LineString(points) => {
                points.iter_mut().for_each(shift)
            }
            Geometry::MultiLineString(parts) | Geometry::Polygon(parts) => {
                parts.iter_mut().flatten().for_each(shift)
            }
            Geometry::MultiPolygon(polygons) => {
                polygons.iter_mut().flatten().flatten().for_each(shift)
            }
        }
    }
}

/// Identifier of a feature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureId(pub String);

impl FeatureId {
    /// Generate a fresh random identifier.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FeatureId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for FeatureId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A plain feature: identifier, geometry and free-form properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: FeatureId,
    pub geometry: Geometry,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Feature {
    /// Create a feature without properties.
    pub fn new(id: impl Into<FeatureId>, geometry: Geometry) -> Self {
        Self {
            id: id.into(),
            geometry,
            properties: Map::new(),
        }
    }

    /// Read a string property.
    pub fn str_property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }
}
