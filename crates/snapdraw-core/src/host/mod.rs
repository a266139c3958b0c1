//! Host map abstraction.
//!
//! The drawing core never renders or indexes anything itself. It asks a
//! [`MapHost`] for hit-tests, projection and style mutations, and a
//! [`GeometryService`] for authoritative geometry.

pub mod filter;
mod memory;
mod service;

pub use memory::{MemoryHost, Viewport};
pub use service::MemoryGeometryService;

use crate::cursor::Cursor;
use crate::geo::{Feature, FeatureId, Geometry, GeometryKind, LngLat};
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Geometry service errors.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Feature not found: {0}")]
    NotFound(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Service error: {0}")]
    Other(String),
}

/// Result type for geometry service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Boxed future for async operations (single-threaded, not `Send`).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Style layer types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayerKind {
    Fill,
    Line,
    Symbol,
    Circle,
    Heatmap,
    FillExtrusion,
    Raster,
    Hillshade,
    Background,
}

/// A style layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: LayerKind,
    #[serde(default)]
    pub source: String,
    #[serde(rename = "source-layer", default, skip_serializing_if = "Option::is_none")]
    pub source_layer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(default)]
    pub paint: Map<String, Value>,
}

impl LayerSpec {
    /// Numeric paint property, if set.
    pub fn paint_f64(&self, name: &str) -> Option<f64> {
        self.paint.get(name).and_then(Value::as_f64)
    }
}

/// Screen-space area for hit-testing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QueryArea {
    Point(Point),
    Box(Rect),
}

impl QueryArea {
    pub fn rect(&self) -> Rect {
        match *self {
            QueryArea::Point(p) => Rect::from_points(p, p),
            QueryArea::Box(r) => r,
        }
    }

    pub fn center(&self) -> Point {
        self.rect().center()
    }
}

/// A feature as rendered by the host at query time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedFeature {
    /// Render-level id, if the source assigns one.
    pub id: Option<FeatureId>,
    pub source: String,
    pub source_layer: Option<String>,
    pub layer_id: String,
    /// Rendered copy of the geometry; may be simplified or tile-clipped.
    pub geometry: Geometry,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl RenderedFeature {
    pub fn kind(&self) -> GeometryKind {
        self.geometry.kind()
    }

    /// Property as a string; numbers are formatted.
    pub fn property_string(&self, key: &str) -> Option<String> {
        match self.properties.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Weak reference to this feature.
    pub fn to_ref(&self, id_property: &str) -> FeatureRef {
        FeatureRef {
            id: self.id.clone(),
            source: self.source.clone(),
            source_layer: self.source_layer.clone(),
            layer_id: self.layer_id.clone(),
            kind: self.kind(),
            feature_id: self.property_string(id_property),
        }
    }
}

/// Weak reference to a rendered feature. Never holds geometry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureRef {
    pub id: Option<FeatureId>,
    pub source: String,
    pub source_layer: Option<String>,
    pub layer_id: String,
    pub kind: GeometryKind,
    /// Authoritative id used by the geometry service.
    pub feature_id: Option<String>,
}

impl FeatureRef {
    /// Whether both references name the same underlying feature.
    pub fn same_feature(&self, other: &FeatureRef) -> bool {
        self.source == other.source
            && self.source_layer == other.source_layer
            && match (&self.id, &other.id) {
                (Some(a), Some(b)) => a == b,
                _ => self.feature_id.is_some() && self.feature_id == other.feature_id,
            }
    }

    /// Feature-state address, if the feature has a render id.
    pub fn state_target(&self) -> Option<FeatureStateTarget> {
        self.id.as_ref().map(|id| FeatureStateTarget {
            source: self.source.clone(),
            source_layer: self.source_layer.clone(),
            id: id.clone(),
        })
    }
}

/// Address of a feature for `set_feature_state`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureStateTarget {
    pub source: String,
    pub source_layer: Option<String>,
    pub id: FeatureId,
}

/// The interactive map the drawing core runs against.
///
/// Methods take `&self`; implementations use interior mutability.
pub trait MapHost {
    /// Rendered features in the area, top-most first. `layers` restricts the
    /// query to the given layer ids; unknown ids are ignored.
    fn query_rendered_features(
        &self,
        area: QueryArea,
        layers: Option<&[String]>,
    ) -> Vec<RenderedFeature>;

    /// Geographic to pixel coordinates.
    fn project(&self, lng_lat: LngLat) -> Point;

    /// Pixel to geographic coordinates.
    fn unproject(&self, point: Point) -> LngLat;

    /// All style layers, bottom to top.
    fn style_layers(&self) -> Vec<LayerSpec>;

    fn layer(&self, id: &str) -> Option<LayerSpec>;

    fn add_layer(&self, layer: LayerSpec);

    fn remove_layer(&self, id: &str);

    fn has_source(&self, id: &str) -> bool;

    /// Add an empty GeoJSON source.
    fn add_source(&self, id: &str);

    fn remove_source(&self, id: &str);

    /// Replace the features of a GeoJSON source.
    fn set_source_data(&self, id: &str, features: Vec<Feature>);

    fn set_filter(&self, layer_id: &str, filter: Option<Value>);

    fn set_feature_state(&self, target: &FeatureStateTarget, key: &str, value: bool);

    fn set_paint_property(&self, layer_id: &str, name: &str, value: Value);

    fn set_cursor(&self, cursor: Cursor);

    /// Whether a drag-pan gesture is currently engaged.
    fn is_drag_panning(&self) -> bool;

    fn set_drag_pan(&self, enabled: bool);

    fn set_double_click_zoom(&self, enabled: bool);
}

/// Async access to authoritative geometry.
pub trait GeometryService {
    /// Full geometry of a rendered feature. `None` when unknown.
    fn fetch_snap_geometry(
        &self,
        feature: &RenderedFeature,
    ) -> BoxFuture<'_, ServiceResult<Option<Geometry>>>;

    /// Geometries for several features, in order.
    fn fetch_snap_geometries(
        &self,
        features: &[RenderedFeature],
    ) -> BoxFuture<'_, ServiceResult<Vec<Option<Geometry>>>> {
        let features = features.to_vec();
        Box::pin(async move {
            let mut geometries = Vec::with_capacity(features.len());
            for feature in &features {
                geometries.push(self.fetch_snap_geometry(feature).await?);
            }
            Ok(geometries)
        })
    }

    /// Closest point on the authoritative geometry of `feature_id`.
    fn get_closest_point(
        &self,
        feature_id: &str,
        near: LngLat,
    ) -> BoxFuture<'_, ServiceResult<Option<LngLat>>>;

    /// Full-precision source geometry for editing, if available.
    fn fetch_source_geometry(
        &self,
        _feature_id: &str,
    ) -> BoxFuture<'_, ServiceResult<Option<Geometry>>> {
        Box::pin(async { Ok(None) })
    }
}
