//! Snap-point computation on resolved target geometry.

use crate::geo::{Geometry, LngLat, haversine_m};
use kurbo::{Line, ParamCurve, ParamCurveNearest, Point};

/// Resolved geometry a coordinate can snap onto.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapTarget {
    Point(LngLat),
    Points(Vec<LngLat>),
    /// Lines and polygon boundary rings.
    Curve(Vec<Vec<LngLat>>),
}

impl SnapTarget {
    /// Convert a geometry; areas become their boundary rings.
    pub fn from_geometry(geometry: &Geometry) -> Option<Self> {
        match geometry {
            Geometry::Point(p) => Some(SnapTarget::Point(*p)),
            Geometry::MultiPoint(points) if points.is_empty() => None,
            Geometry::MultiPoint(points) => Some(SnapTarget::Points(points.clone())),
            other => {
                let parts: Vec<Vec<LngLat>> = other
                    .boundary()
                    .into_iter()
                    .filter(|part| !part.is_empty())
                    .collect();
                (!parts.is_empty()).then_some(SnapTarget::Curve(parts))
            }
        }
    }

    pub fn is_point(&self) -> bool {
        matches!(self, SnapTarget::Point(_) | SnapTarget::Points(_))
    }
}

/// Vertex preference parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexPull {
    /// A vertex wins when its distance is below `factor` times the distance
    /// to the nearest point on the curve.
    pub factor: f64,
    /// A vertex within this ground distance of the pointer always wins.
    pub capture_radius_m: f64,
}

/// Nearest member of a point set.
pub fn nearest_vertex(points: &[LngLat], p: LngLat) -> Option<LngLat> {
    points
        .iter()
        .copied()
        .map(|v| (haversine_m(p, v), v))
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, v)| v)
}

/// Nearest point on a set of polylines.
///
/// Segments are measured in a local equirectangular frame centred on `p`.
pub fn nearest_point_on_curve(parts: &[Vec<LngLat>], p: LngLat) -> Option<LngLat> {
    let scale = p.lat.to_radians().cos().max(1e-12);
    let to_local = |c: LngLat| Point::new((c.lng - p.lng) * scale, c.lat - p.lat);
    let from_local = |q: Point| LngLat::new(q.x / scale + p.lng, q.y + p.lat);

    let mut best: Option<(f64, Point)> = None;
    let mut consider = |d: f64, q: Point| {
        if best.is_none_or(|(bd, _)| d < bd) {
            best = Some((d, q));
        }
    };
    for part in parts {
        if let [only] = part.as_slice() {
            let q = to_local(*only);
            consider(q.to_vec2().hypot2(), q);
            continue;
        }
        for w in part.windows(2) {
            let segment = Line::new(to_local(w[0]), to_local(w[1]));
            let nearest = segment.nearest(Point::ZERO, 1e-12);
            consider(nearest.distance_sq, segment.eval(nearest.t));
        }
    }
    best.map(|(_, q)| from_local(q))
}

/// Corrected coordinate for `pointer` on `target`.
///
/// Curves resolve to the nearest point unless a vertex qualifies under
/// `pull`; the first qualifying vertex in document order wins.
pub fn resolve_snap_point(target: &SnapTarget, pointer: LngLat, pull: &VertexPull) -> LngLat {
    match target {
        SnapTarget::Point(p) => *p,
        SnapTarget::Points(points) => nearest_vertex(points, pointer).unwrap_or(pointer),
        SnapTarget::Curve(parts) => {
            let Some(nearest) = nearest_point_on_curve(parts, pointer) else {
                return pointer;
            };
            let to_nearest = haversine_m(pointer, nearest);
            parts
                .iter()
                .flatten()
                .copied()
                .find(|v| {
                    let to_vertex = haversine_m(pointer, *v);
                    to_vertex <= pull.capture_radius_m || to_vertex < pull.factor * to_nearest
                })
                .unwrap_or(nearest)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment() -> SnapTarget {
        SnapTarget::Curve(vec![vec![LngLat::new(0.0, 0.0), LngLat::new(10.0, 0.0)]])
    }

    fn pull(capture_radius_m: f64) -> VertexPull {
        VertexPull {
            factor: std::f64::consts::SQRT_2,
            capture_radius_m,
        }
    }

    fn assert_close(a: LngLat, b: LngLat) {
        assert!(
            (a.lng - b.lng).abs() < 1e-9 && (a.lat - b.lat).abs() < 1e-9,
            "{a:?} != {b:?}"
        );
    }

    #[test]
    fn test_vertex_within_capture_radius_wins() {
        let at = resolve_snap_point(&segment(), LngLat::new(0.1, 0.05), &pull(20_000.0));
        assert_eq!(at, LngLat::new(0.0, 0.0));
    }

    #[test]
    fn test_mid_segment_resolves_to_nearest_point() {
        let at = resolve_snap_point(&segment(), LngLat::new(5.0, 0.5), &pull(20_000.0));
        assert_close(at, LngLat::new(5.0, 0.0));
    }

    #[test]
    fn test_vertex_pull_ratio() {
        // Vertex is 1.118x as far as the nearest point: pulled.
        let at = resolve_snap_point(&segment(), LngLat::new(0.5, 1.0), &pull(0.0));
        assert_eq!(at, LngLat::new(0.0, 0.0));
        // 2.2x as far: not pulled.
        let at = resolve_snap_point(&segment(), LngLat::new(2.0, 1.0), &pull(0.0));
        assert_close(at, LngLat::new(2.0, 0.0));
    }

    #[test]
    fn test_point_targets() {
        let p = LngLat::new(1.0, 1.0);
        assert_eq!(resolve_snap_point(&SnapTarget::Point(p), LngLat::new(0.0, 0.0), &pull(0.0)), p);
        let points = SnapTarget::Points(vec![LngLat::new(0.0, 0.0), LngLat::new(3.0, 0.0)]);
        assert_eq!(
            resolve_snap_point(&points, LngLat::new(2.0, 0.0), &pull(0.0)),
            LngLat::new(3.0, 0.0)
        );
    }

    #[test]
    fn test_polygon_becomes_boundary() {
        let ring = vec![
            LngLat::new(0.0, 0.0),
            LngLat::new(4.0, 0.0),
            LngLat::new(4.0, 4.0),
            LngLat::new(0.0, 0.0),
        ];
        let target = SnapTarget::from_geometry(&Geometry::Polygon(vec![ring.clone()])).unwrap();
        assert_eq!(target, SnapTarget::Curve(vec![ring]));
        // Inside the polygon snaps to the nearest edge, not the interior.
        let at = resolve_snap_point(&target, LngLat::new(3.0, 1.5), &pull(0.0));
        assert!((at.lng - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_geometry_has_no_target() {
        assert!(SnapTarget::from_geometry(&Geometry::MultiPoint(vec![])).is_none());
        assert!(SnapTarget::from_geometry(&Geometry::MultiLineString(vec![])).is_none());
    }
}
