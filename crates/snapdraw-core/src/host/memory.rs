//! In-memory map host for testing and ephemeral use.

use super::filter;
use super::{FeatureStateTarget, LayerKind, LayerSpec, MapHost, QueryArea, RenderedFeature};
use crate::cursor::Cursor;
use crate::geo::{Feature, Geometry, LngLat};
use kurbo::{Line, ParamCurveNearest, Point, Rect};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

/// Linear (plate carrée) viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Coordinate at pixel (0, 0).
    pub origin: LngLat,
    pub pixels_per_degree: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            origin: LngLat::new(0.0, 0.0),
            pixels_per_degree: 100.0,
        }
    }
}

#[derive(Debug, Default)]
struct HostState {
    viewport: Viewport,
    layers: Vec<LayerSpec>,
    sources: BTreeSet<String>,
    /// Features keyed by (source, source-layer or "").
    data: BTreeMap<(String, String), Vec<Feature>>,
    feature_states: BTreeMap<FeatureStateTarget, BTreeMap<String, bool>>,
    cursor: Cursor,
    drag_panning: bool,
    drag_pan_enabled: bool,
    double_click_zoom: bool,
}

/// A map host that keeps its style and data in memory and hit-tests in
/// pixel space.
#[derive(Debug)]
pub struct MemoryHost {
    state: RefCell<HostState>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    /// Create an empty host with the default viewport.
    pub fn new() -> Self {
        Self::with_viewport(Viewport::default())
    }

    pub fn with_viewport(viewport: Viewport) -> Self {
        Self {
            state: RefCell::new(HostState {
                viewport,
                drag_pan_enabled: true,
                double_click_zoom: true,
                ..Default::default()
            }),
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.state.borrow().viewport
    }

    /// Store features for a source and source-layer, creating the source.
    pub fn set_source_layer_data(&self, source: &str, source_layer: Option<&str>, features: Vec<Feature>) {
        let mut state = self.state.borrow_mut();
        state.sources.insert(source.to_string());
        state
            .data
            .insert((source.to_string(), source_layer.unwrap_or_default().to_string()), features);
    }

    /// Features of a GeoJSON source.
    pub fn source_data(&self, source: &str) -> Vec<Feature> {
        self.state
            .borrow()
            .data
            .get(&(source.to_string(), String::new()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn layer_ids(&self) -> Vec<String> {
        self.state.borrow().layers.iter().map(|l| l.id.clone()).collect()
    }

    pub fn feature_state(&self, target: &FeatureStateTarget, key: &str) -> bool {
        self.state
            .borrow()
            .feature_states
            .get(target)
            .and_then(|s| s.get(key).copied())
            .unwrap_or(false)
    }

    /// Targets whose `key` state is currently on.
    pub fn features_with_state(&self, key: &str) -> Vec<FeatureStateTarget> {
        self.state
            .borrow()
            .feature_states
            .iter()
            .filter(|(_, s)| s.get(key).copied().unwrap_or(false))
            .map(|(t, _)| t.clone())
            .collect()
    }

    pub fn cursor(&self) -> Cursor {
        self.state.borrow().cursor
    }

    /// Simulate an engaged drag-pan gesture.
    pub fn set_drag_panning(&self, panning: bool) {
        self.state.borrow_mut().drag_panning = panning;
    }

    pub fn drag_pan_enabled(&self) -> bool {
        self.state.borrow().drag_pan_enabled
    }

    pub fn double_click_zoom_enabled(&self) -> bool {
        self.state.borrow().double_click_zoom
    }

    fn to_pixel(viewport: &Viewport, c: LngLat) -> Point {
        Point::new(
            (c.lng - viewport.origin.lng) * viewport.pixels_per_degree,
            (viewport.origin.lat - c.lat) * viewport.pixels_per_degree,
        )
    }

    fn hit(layer: &LayerSpec, geometry: &Geometry, area: Rect, viewport: &Viewport) -> bool {
        let px = |c: &LngLat| Self::to_pixel(viewport, *c);
        match layer.kind {
            LayerKind::Circle | LayerKind::Symbol | LayerKind::Heatmap => {
                let radius = layer
                    .paint_f64("circle-radius")
                    .or_else(|| layer.paint_f64("icon-size").map(|s| s * 8.0))
                    .unwrap_or(5.0);
                geometry
                    .vertices()
                    .iter()
                    .any(|c| rect_distance(area, px(c)) <= radius)
            }
            LayerKind::Line => {
                if geometry.kind().is_point_like() {
                    return false;
                }
                let half_width = layer.paint_f64("line-width").unwrap_or(1.0) / 2.0;
                geometry.boundary().iter().any(|part| {
                    part.windows(2)
                        .any(|w| segment_rect_distance(Line::new(px(&w[0]), px(&w[1])), area) <= half_width)
                })
            }
            LayerKind::Fill | LayerKind::FillExtrusion => {
                let polygons: Vec<Vec<Vec<LngLat>>> = match geometry {
                    Geometry::Polygon(rings) => vec![rings.clone()],
                    Geometry::MultiPolygon(polygons) => polygons.clone(),
                    _ => return false,
                };
                polygons.iter().any(|rings| {
                    let pixel_rings: Vec<Vec<Point>> =
                        rings.iter().map(|r| r.iter().map(px).collect()).collect();
                    contains(&pixel_rings, area.center())
                        || pixel_rings.iter().any(|ring| {
                            closed_segments(ring).any(|seg| segment_rect_distance(seg, area) <= 0.0)
                        })
                })
            }
            LayerKind::Raster | LayerKind::Hillshade | LayerKind::Background => false,
        }
    }
}

fn rect_distance(rect: Rect, p: Point) -> f64 {
    let dx = (rect.x0 - p.x).max(0.0).max(p.x - rect.x1);
    let dy = (rect.y0 - p.y).max(0.0).max(p.y - rect.y1);
    dx.hypot(dy)
}

fn cross(o: Point, a: Point, b: Point) -> f64 {
    (a - o).cross(b - o)
}

fn segments_intersect(a: Line, b: Line) -> bool {
    let d1 = cross(b.p0, b.p1, a.p0);
    let d2 = cross(b.p0, b.p1, a.p1);
    let d3 = cross(a.p0, a.p1, b.p0);
    let d4 = cross(a.p0, a.p1, b.p1);
    ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0)) && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
}

fn segment_rect_distance(seg: Line, rect: Rect) -> f64 {
    if rect.contains(seg.p0) || rect.contains(seg.p1) {
        return 0.0;
    }
    let corners = [
        Point::new(rect.x0, rect.y0),
        Point::new(rect.x1, rect.y0),
        Point::new(rect.x1, rect.y1),
        Point::new(rect.x0, rect.y1),
    ];
    let mut edges = (0..4).map(|i| Line::new(corners[i], corners[(i + 1) % 4]));
    if rect.area() > 0.0 && edges.any(|e| segments_intersect(seg, e)) {
        return 0.0;
    }
    let from_corners = corners
        .iter()
        .map(|c| seg.nearest(*c, 1e-9).distance_sq.sqrt())
        .fold(f64::INFINITY, f64::min);
    let from_ends = rect_distance(rect, seg.p0).min(rect_distance(rect, seg.p1));
    from_corners.min(from_ends)
}

/// Segments of a ring, closing it if needed.
fn closed_segments(ring: &[Point]) -> impl Iterator<Item = Line> + '_ {
    let n = ring.len();
    let closing = match (ring.first(), ring.last()) {
        (Some(a), Some(b)) if n > 2 && a != b => Some(Line::new(*b, *a)),
        _ => None,
    };
    ring.windows(2)
        .map(|w| Line::new(w[0], w[1]))
        .chain(closing)
}

/// Even-odd containment over all rings.
fn contains(rings: &[Vec<Point>], p: Point) -> bool {
    let mut inside = false;
    for ring in rings {
        for seg in closed_segments(ring) {
            let (a, b) = (seg.p0, seg.p1);
            if (a.y > p.y) != (b.y > p.y) {
                let x = a.x + (p.y - a.y) / (b.y - a.y) * (b.x - a.x);
                if p.x < x {
                    inside = !inside;
                }
            }
        }
    }
    inside
}

impl MapHost for MemoryHost {
    fn query_rendered_features(
        &self,
        area: QueryArea,
        layers: Option<&[String]>,
    ) -> Vec<RenderedFeature> {
        let state = self.state.borrow();
        let rect = area.rect();
        let mut hits = Vec::new();
        for layer in state.layers.iter().rev() {
            if layers.is_some_and(|ids| !ids.iter().any(|id| id == &layer.id)) {
                continue;
            }
            let key = (
                layer.source.clone(),
                layer.source_layer.clone().unwrap_or_default(),
            );
            let Some(features) = state.data.get(&key) else {
                continue;
            };
            for feature in features.iter().rev() {
                let kind = feature.geometry.kind();
                if !filter::evaluate(layer.filter.as_ref(), kind, &feature.properties) {
                    continue;
                }
                if Self::hit(layer, &feature.geometry, rect, &state.viewport) {
                    hits.push(RenderedFeature {
                        id: Some(feature.id.clone()),
                        source: layer.source.clone(),
                        source_layer: layer.source_layer.clone(),
                        layer_id: layer.id.clone(),
                        geometry: feature.geometry.clone(),
                        properties: feature.properties.clone(),
                    });
                }
            }
        }
        hits
    }

    fn project(&self, lng_lat: LngLat) -> Point {
        Self::to_pixel(&self.state.borrow().viewport, lng_lat)
    }

    fn unproject(&self, point: Point) -> LngLat {
        let viewport = self.state.borrow().viewport;
        LngLat::new(
            viewport.origin.lng + point.x / viewport.pixels_per_degree,
            viewport.origin.lat - point.y / viewport.pixels_per_degree,
        )
    }

    fn style_layers(&self) -> Vec<LayerSpec> {
        self.state.borrow().layers.clone()
    }

    fn layer(&self, id: &str) -> Option<LayerSpec> {
        self.state.borrow().layers.iter().find(|l| l.id == id).cloned()
    }

    fn add_layer(&self, layer: LayerSpec) {
        let mut state = self.state.borrow_mut();
        if state.layers.iter().any(|l| l.id == layer.id) {
            log::warn!("Layer already exists: {}", layer.id);
            return;
        }
        state.layers.push(layer);
    }

    fn remove_layer(&self, id: &str) {
        self.state.borrow_mut().layers.retain(|l| l.id != id);
    }

    fn has_source(&self, id: &str) -> bool {
        self.state.borrow().sources.contains(id)
    }

    fn add_source(&self, id: &str) {
        let mut state = self.state.borrow_mut();
        state.sources.insert(id.to_string());
        state.data.entry((id.to_string(), String::new())).or_default();
    }

    fn remove_source(&self, id: &str) {
        let mut state = self.state.borrow_mut();
        state.sources.remove(id);
        state.data.retain(|(source, _), _| source != id);
    }

    fn set_source_data(&self, id: &str, features: Vec<Feature>) {
        let mut state = self.state.borrow_mut();
        if !state.sources.contains(id) {
            log::warn!("set_source_data on missing source: {}", id);
            return;
        }
        state.data.insert((id.to_string(), String::new()), features);
    }

    fn set_filter(&self, layer_id: &str, filter: Option<Value>) {
        if let Some(layer) = self.state.borrow_mut().layers.iter_mut().find(|l| l.id == layer_id) {
            layer.filter = filter;
        }
    }

    fn set_feature_state(&self, target: &FeatureStateTarget, key: &str, value: bool) {
        self.state
            .borrow_mut()
            .feature_states
            .entry(target.clone())
            .or_default()
            .insert(key.to_string(), value);
    }

    fn set_paint_property(&self, layer_id: &str, name: &str, value: Value) {
        if let Some(layer) = self.state.borrow_mut().layers.iter_mut().find(|l| l.id == layer_id) {
            layer.paint.insert(name.to_string(), value);
        }
    }

    fn set_cursor(&self, cursor: Cursor) {
        self.state.borrow_mut().cursor = cursor;
    }

    fn is_drag_panning(&self) -> bool {
        self.state.borrow().drag_panning
    }

    fn set_drag_pan(&self, enabled: bool) {
        self.state.borrow_mut().drag_pan_enabled = enabled;
    }

    fn set_double_click_zoom(&self, enabled: bool) {
        self.state.borrow_mut().double_click_zoom = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    fn layer(id: &str, kind: LayerKind, source: &str, paint: Value) -> LayerSpec {
        LayerSpec {
            id: id.to_string(),
            kind,
            source: source.to_string(),
            source_layer: None,
            filter: None,
            paint: match paint {
                Value::Object(m) => m,
                _ => Map::new(),
            },
        }
    }

    fn road() -> Feature {
        Feature::new(
            "r1",
            Geometry::LineString(vec![LngLat::new(0.0, 0.0), LngLat::new(10.0, 0.0)]),
        )
    }

    #[test]
    fn test_project_roundtrip() {
        let host = MemoryHost::new();
        let p = host.project(LngLat::new(1.5, -2.0));
        assert_eq!(p, Point::new(150.0, 200.0));
        assert_eq!(host.unproject(p), LngLat::new(1.5, -2.0));
    }

    #[test]
    fn test_line_hit_uses_line_width() {
        let host = MemoryHost::new();
        host.set_source_layer_data("roads", None, vec![road()]);
        host.add_layer(layer("roads", LayerKind::Line, "roads", json!({"line-width": 30.0})));

        let near = host.query_rendered_features(QueryArea::Point(Point::new(500.0, 14.0)), None);
        assert_eq!(near.len(), 1);
        assert_eq!(near[0].layer_id, "roads");
        let far = host.query_rendered_features(QueryArea::Point(Point::new(500.0, 16.0)), None);
        assert!(far.is_empty());
    }

    #[test]
    fn test_fill_hit_and_layer_restriction() {
        let host = MemoryHost::new();
        let square = Feature::new(
            "s",
            Geometry::Polygon(vec![vec![
                LngLat::new(0.0, 0.0),
                LngLat::new(1.0, 0.0),
                LngLat::new(1.0, -1.0),
                LngLat::new(0.0, -1.0),
            ]]),
        );
        host.set_source_layer_data("areas", None, vec![square]);
        host.add_layer(layer("areas", LayerKind::Fill, "areas", json!({})));

        let inside = QueryArea::Point(Point::new(50.0, 50.0));
        assert_eq!(host.query_rendered_features(inside, None).len(), 1);
        let only_other = ["other".to_string()];
        assert!(host.query_rendered_features(inside, Some(&only_other)).is_empty());
        let outside = QueryArea::Point(Point::new(150.0, 50.0));
        assert!(host.query_rendered_features(outside, None).is_empty());
    }

    #[test]
    fn test_box_query_hits_line_crossing_box() {
        let host = MemoryHost::new();
        host.set_source_layer_data("roads", None, vec![road()]);
        host.add_layer(layer("roads", LayerKind::Line, "roads", json!({"line-width": 0.0})));
        let area = QueryArea::Box(Rect::new(100.0, -2.0, 104.0, 2.0));
        assert_eq!(host.query_rendered_features(area, None).len(), 1);
    }

    #[test]
    fn test_filter_and_top_first_order() {
        let host = MemoryHost::new();
        let mut a = Feature::new("a", Geometry::Point(LngLat::new(0.0, 0.0)));
        a.properties.insert("kind".to_string(), json!("a"));
        let mut b = Feature::new("b", Geometry::Point(LngLat::new(0.0, 0.0)));
        b.properties.insert("kind".to_string(), json!("b"));
        host.set_source_layer_data("pts", None, vec![a, b]);
        let mut bottom = layer("bottom", LayerKind::Circle, "pts", json!({}));
        bottom.filter = Some(json!(["==", "kind", "a"]));
        host.add_layer(bottom);
        host.add_layer(layer("top", LayerKind::Circle, "pts", json!({})));

        let hits = host.query_rendered_features(QueryArea::Point(Point::ZERO), None);
        let ids: Vec<_> = hits.iter().map(|h| (h.layer_id.as_str(), h.id.clone().unwrap().0)).collect();
        assert_eq!(
            ids,
            vec![
                ("top", "b".to_string()),
                ("top", "a".to_string()),
                ("bottom", "a".to_string())
            ]
        );
    }

    #[test]
    fn test_sources_and_state() {
        let host = MemoryHost::new();
        host.set_source_data("missing", vec![road()]);
        assert!(host.source_data("missing").is_empty());

        host.add_source("draw");
        host.set_source_data("draw", vec![road()]);
        assert_eq!(host.source_data("draw").len(), 1);
        host.remove_source("draw");
        assert!(!host.has_source("draw"));

        let target = FeatureStateTarget {
            source: "roads".to_string(),
            source_layer: None,
            id: "r1".into(),
        };
        host.set_feature_state(&target, "snap-hover", true);
        assert!(host.feature_state(&target, "snap-hover"));
        assert_eq!(host.features_with_state("snap-hover"), vec![target]);
    }
}
