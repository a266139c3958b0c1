//! In-memory geometry service for testing and ephemeral use.

use super::{BoxFuture, GeometryService, RenderedFeature, ServiceError, ServiceResult};
use crate::geo::{Geometry, LngLat};
use crate::snap::geometry::{nearest_point_on_curve, nearest_vertex};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

/// Serves geometries registered by authoritative feature id.
///
/// Snap geometry falls back to the rendered copy when nothing is registered.
#[derive(Debug)]
pub struct MemoryGeometryService {
    id_property: String,
    snap_geometries: RefCell<HashMap<String, Geometry>>,
    source_geometries: RefCell<HashMap<String, Geometry>>,
    unavailable: Cell<bool>,
    requests: Cell<usize>,
}

impl Default for MemoryGeometryService {
    fn default() -> Self {
        Self::new("id")
    }
}

impl MemoryGeometryService {
    /// Create a service reading authoritative ids from `id_property`.
    pub fn new(id_property: impl Into<String>) -> Self {
        Self {
            id_property: id_property.into(),
            snap_geometries: RefCell::new(HashMap::new()),
            source_geometries: RefCell::new(HashMap::new()),
            unavailable: Cell::new(false),
            requests: Cell::new(0),
        }
    }

    /// Register the geometry returned for snapping.
    pub fn insert_snap_geometry(&self, feature_id: impl Into<String>, geometry: Geometry) {
        self.snap_geometries.borrow_mut().insert(feature_id.into(), geometry);
    }

    /// Register the full-precision geometry used for closest-point queries
    /// and editing.
    pub fn insert_source_geometry(&self, feature_id: impl Into<String>, geometry: Geometry) {
        self.source_geometries.borrow_mut().insert(feature_id.into(), geometry);
    }

    /// Make every request fail with `ServiceError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.set(unavailable);
    }

    /// Number of requests served so far.
    pub fn request_count(&self) -> usize {
        self.requests.get()
    }

    fn begin(&self) -> ServiceResult<()> {
        self.requests.set(self.requests.get() + 1);
        if self.unavailable.get() {
            return Err(ServiceError::Unavailable("memory service disabled".to_string()));
        }
        Ok(())
    }

    fn lookup_snap(&self, feature: &RenderedFeature) -> Option<Geometry> {
        feature
            .property_string(&self.id_property)
            .and_then(|id| self.snap_geometries.borrow().get(&id).cloned())
            .or_else(|| Some(feature.geometry.clone()))
    }

    /// Closest point on a geometry; vertices for point geometries.
    pub fn closest_point(geometry: &Geometry, near: LngLat) -> Option<LngLat> {
        if geometry.kind().is_point_like() {
            nearest_vertex(&geometry.vertices(), near)
        } else {
            nearest_point_on_curve(&geometry.boundary(), near)
        }
    }
}

impl GeometryService for MemoryGeometryService {
    fn fetch_snap_geometry(
        &self,
        feature: &RenderedFeature,
    ) -> BoxFuture<'_, ServiceResult<Option<Geometry>>> {
        let result = self.begin().map(|_| self.lookup_snap(feature));
        Box::pin(async move { result })
    }

    fn fetch_snap_geometries(
        &self,
        features: &[RenderedFeature],
    ) -> BoxFuture<'_, ServiceResult<Vec<Option<Geometry>>>> {
        let result = self
            .begin()
            .map(|_| features.iter().map(|f| self.lookup_snap(f)).collect());
        Box::pin(async move { result })
    }

    fn get_closest_point(
        &self,
        feature_id: &str,
        near: LngLat,
    ) -> BoxFuture<'_, ServiceResult<Option<LngLat>>> {
        let feature_id = feature_id.to_string();
        Box::pin(async move {
            self.begin()?;
            let geometry = self
                .source_geometries
                .borrow()
                .get(&feature_id)
                .or(self.snap_geometries.borrow().get(&feature_id))
                .cloned();
            Ok(geometry.and_then(|g| Self::closest_point(&g, near)))
        })
    }

    fn fetch_source_geometry(
        &self,
        feature_id: &str,
    ) -> BoxFuture<'_, ServiceResult<Option<Geometry>>> {
        let feature_id = feature_id.to_string();
        Box::pin(async move {
            self.begin()?;
            Ok(self.source_geometries.borrow().get(&feature_id).cloned())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    fn rendered(feature_id: &str) -> RenderedFeature {
        let mut properties = Map::new();
        properties.insert("id".to_string(), json!(feature_id));
        RenderedFeature {
            id: Some("r".into()),
            source: "roads".to_string(),
            source_layer: None,
            layer_id: "roads".to_string(),
            geometry: Geometry::LineString(vec![LngLat::new(0.0, 0.0), LngLat::new(1.0, 0.0)]),
            properties,
        }
    }

    #[test]
    fn test_snap_geometry_falls_back_to_rendered() {
        let service = MemoryGeometryService::default();
        let feature = rendered("a");
        let geometry = pollster::block_on(service.fetch_snap_geometry(&feature)).unwrap();
        assert_eq!(geometry, Some(feature.geometry.clone()));

        let registered = Geometry::LineString(vec![LngLat::new(0.0, 0.0), LngLat::new(2.0, 0.0)]);
        service.insert_snap_geometry("a", registered.clone());
        let geometry = pollster::block_on(service.fetch_snap_geometry(&feature)).unwrap();
        assert_eq!(geometry, Some(registered));
    }

    #[test]
    fn test_closest_point_prefers_source_geometry() {
        let service = MemoryGeometryService::default();
        service.insert_snap_geometry(
            "a",
            Geometry::LineString(vec![LngLat::new(0.0, 0.0), LngLat::new(2.0, 0.0)]),
        );
        let point = pollster::block_on(service.get_closest_point("a", LngLat::new(1.0, 0.5)))
            .unwrap()
            .unwrap();
        assert!((point.lng - 1.0).abs() < 1e-6);
        assert!(point.lat.abs() < 1e-9);

        service.insert_source_geometry("a", Geometry::Point(LngLat::new(3.0, 3.0)));
        let point = pollster::block_on(service.get_closest_point("a", LngLat::new(1.0, 0.5))).unwrap();
        assert_eq!(point, Some(LngLat::new(3.0, 3.0)));

        assert_eq!(
            pollster::block_on(service.get_closest_point("zzz", LngLat::new(0.0, 0.0))).unwrap(),
            None
        );
    }

    #[test]
    fn test_unavailable_service_fails() {
        let service = MemoryGeometryService::default();
        service.set_unavailable(true);
        let err = pollster::block_on(service.fetch_snap_geometry(&rendered("a"))).unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));
        assert_eq!(service.request_count(), 1);
    }
}
