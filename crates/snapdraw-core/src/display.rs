//! Vertex and midpoint features rendered alongside a selected feature.

use crate::geo::{Feature, FeatureId, Geometry, LngLat};
use crate::store::CoordPath;
use serde_json::Value;

fn supplementary(meta: &str, parent: &FeatureId, path: &CoordPath, at: LngLat, active: bool) -> Feature {
    let tag = if meta == "vertex" { "v" } else { "m" };
    let mut feature = Feature::new(format!("{parent}/{tag}/{path}"), Geometry::Point(at));
    let properties = &mut feature.properties;
    properties.insert("meta".to_string(), Value::from(meta));
    properties.insert("parent".to_string(), Value::from(parent.as_str()));
    properties.insert("coord_path".to_string(), Value::from(path.to_string()));
    properties.insert("active".to_string(), Value::from(if active { "true" } else { "false" }));
    feature
}

/// A vertex handle.
pub fn vertex_feature(parent: &FeatureId, path: &CoordPath, at: LngLat, active: bool) -> Feature {
    supplementary("vertex", parent, path, at, active)
}

/// A midpoint handle; `path` is where a vertex would be inserted.
pub fn midpoint_feature(parent: &FeatureId, path: &CoordPath, a: LngLat, b: LngLat) -> Feature {
    let mid = LngLat::new((a.lng + b.lng) / 2.0, (a.lat + b.lat) / 2.0);
    supplementary("midpoint", parent, path, mid, false)
}

/// Vertex handles for every vertex of `feature`, and midpoints between
/// consecutive vertices when requested.
pub fn supplementary_features(
    feature: &Feature,
    selected: &[CoordPath],
    midpoints: bool,
) -> Vec<Feature> {
    let geometry = feature.geometry.clone().open_rings();
    let closed = matches!(geometry, Geometry::Polygon(_) | Geometry::MultiPolygon(_));
    let vertices = geometry.coord_paths();
    let mut out = Vec::with_capacity(vertices.len() * 2);

    for (i, (path, at)) in vertices.iter().enumerate() {
        if midpoints && !geometry.kind().is_point_like() {
            let same_part = |other: &CoordPath| other.parent() == path.parent();
            if let Some((prev_path, prev)) = i.checked_sub(1).map(|j| &vertices[j]) {
                if same_part(prev_path) {
                    out.push(midpoint_feature(&feature.id, path, *prev, *at));
                }
            }
            let is_ring_end = vertices.get(i + 1).is_none_or(|(next, _)| !same_part(next));
            if closed && is_ring_end {
                let first = vertices.iter().find(|(p, _)| same_part(p));
                if let Some((first_path, first)) = first {
                    if first_path != path {
                        let append = path.with_last(path.last().unwrap_or(0) + 1);
                        out.push(midpoint_feature(&feature.id, &append, *at, *first));
                    }
                }
            }
        }
        out.push(vertex_feature(&feature.id, path, *at, selected.contains(path)));
    }
    out
}

/// Parent feature id and path of a vertex or midpoint handle.
pub fn handle_target(properties: &serde_json::Map<String, Value>) -> Option<(FeatureId, CoordPath)> {
    let parent = properties.get("parent")?.as_str()?;
    let path = properties.get("coord_path")?.as_str()?.parse().ok()?;
    Some((FeatureId::from(parent), path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(f: &Feature) -> &str {
        f.str_property("meta").unwrap_or_default()
    }

    #[test]
    fn test_line_handles() {
        let line = Feature::new(
            "l",
            Geometry::LineString(vec![
                LngLat::new(0.0, 0.0),
                LngLat::new(2.0, 0.0),
                LngLat::new(4.0, 0.0),
            ]),
        );
        let handles = supplementary_features(&line, &[CoordPath::new(vec![1])], true);
        let vertices: Vec<_> = handles.iter().filter(|f| meta(f) == "vertex").collect();
        let midpoints: Vec<_> = handles.iter().filter(|f| meta(f) == "midpoint").collect();
        assert_eq!(vertices.len(), 3);
        assert_eq!(midpoints.len(), 2);
        assert_eq!(vertices[1].str_property("active"), Some("true"));
        assert_eq!(midpoints[0].geometry, Geometry::Point(LngLat::new(1.0, 0.0)));
        assert_eq!(midpoints[0].str_property("coord_path"), Some("1"));
    }

    #[test]
    fn test_polygon_handles_close_the_ring() {
        let polygon = Feature::new(
            "p",
            Geometry::Polygon(vec![vec![
                LngLat::new(0.0, 0.0),
                LngLat::new(2.0, 0.0),
                LngLat::new(2.0, 2.0),
                LngLat::new(0.0, 0.0),
            ]]),
        );
        let handles = supplementary_features(&polygon, &[], true);
        assert_eq!(handles.iter().filter(|f| meta(f) == "vertex").count(), 3);
        let midpoints: Vec<_> = handles.iter().filter(|f| meta(f) == "midpoint").collect();
        assert_eq!(midpoints.len(), 3);
        assert!(midpoints.iter().any(|m| m.str_property("coord_path") == Some("0.3")));
    }

    #[test]
    fn test_handle_target() {
        let v = vertex_feature(&FeatureId::from("a"), &CoordPath::new(vec![0, 2]), LngLat::default(), false);
        assert_eq!(
            handle_target(&v.properties),
            Some((FeatureId::from("a"), CoordPath::new(vec![0, 2])))
        );
    }
}
