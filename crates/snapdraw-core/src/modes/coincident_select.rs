//! Point selection that drags connected host lines along.
//!
//! On entry the selected point is matched against the lines rendered under
//! it. Every line with a vertex at exactly the point's coordinate is
//! remembered, and each move of the point reports those lines with the
//! shared vertex relocated.

use super::simple_select::SimpleSelect;
use super::{
    CommitPhase, EditTarget, Mode, ModeClass, ModeContext, ModeDescriptor, ModeOptions, ModeSetup,
};
use crate::config::DRAW_SOURCE;
use crate::cursor::{Cursor, HoverFacts};
use crate::error::DrawResult;
use crate::events::CoincidentLine;
use crate::geo::{Geometry, LngLat};
use crate::host::QueryArea;
use crate::snap::{BUFFER_PREFIX, SNAP_VERTEX};
use kurbo::Rect;
use std::rc::Rc;

/// Half size of the pixel box searched for lines touching the point.
const SEARCH_HALF_PX: f64 = 5.0;

/// A line vertex that shares the selected point's coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct CoincidentVertex {
    /// Authoritative id of the line.
    pub feature_id: String,
    pub layer_id: String,
    /// Line coordinates when the mode was entered.
    pub line: Vec<LngLat>,
    pub index: usize,
    /// Neighbours of the shared vertex along the line.
    pub adjacent: Vec<LngLat>,
}

impl CoincidentVertex {
    /// The line with the shared vertex placed at `at`.
    pub fn moved_to(&self, at: LngLat) -> CoincidentLine {
        let mut line = self.line.clone();
        if let Some(vertex) = line.get_mut(self.index) {
            *vertex = at;
        }
        CoincidentLine {
            feature_id: self.feature_id.clone(),
            layer_id: self.layer_id.clone(),
            geometry: Geometry::LineString(line),
        }
    }
}

/// Index of `at` in `line` together with its neighbours.
///
/// The first vertex wins over the last, so a closed line reports index 0.
pub fn adjacent_line_data(line: &[LngLat], at: LngLat) -> Option<(usize, Vec<LngLat>)> {
    let last = line.len().checked_sub(1).filter(|&last| last > 0)?;
    if line[0] == at {
        return Some((0, vec![line[1]]));
    }
    if let Some(i) = (1..last).find(|&i| line[i] == at) {
        return Some((i, vec![line[i - 1], line[i + 1]]));
    }
    (line[last] == at).then(|| (last, vec![line[last - 1]]))
}

/// Entry point of the `coincident_select` mode.
pub struct CoincidentSelect;

impl CoincidentSelect {
    pub const DESCRIPTOR: ModeDescriptor =
        ModeDescriptor::new(ModeClass::Select, EditTarget::Point, Some(CommitPhase::PointerUp));

    pub fn setup(ctx: &mut ModeContext<'_>, options: &ModeOptions) -> DrawResult<ModeSetup> {
        SimpleSelect::enter(ctx, options);
        ctx.set_snap_to_selected(false);
        ctx.set_cursor_logic(Some(Rc::new(|facts: &HoverFacts| {
            Some(if facts.over_features && !facts.is_over_selected {
                Cursor::Pointer
            } else {
                Cursor::Grab
            })
        })));

        let id_property = ctx.options().snapping.id_property.clone();
        let point = options.feature_ids.first().and_then(|id| {
            let store = ctx.store();
            let feature = store.get(id)?;
            let found = match feature.geometry {
                Geometry::Point(at) => {
                    Some((at, feature.str_property(&id_property).map(str::to_string)))
                }
                _ => None,
            };
            found
        });
        let Some((at, point_id)) = point else {
            log::debug!("No point selected; coincident_select behaves as simple_select");
            return Ok(ModeSetup::Ready(Box::new(SimpleSelect::default())));
        };

        let lines = lines_under(ctx, at, &id_property);
        if lines.is_empty() {
            return Ok(ModeSetup::Ready(Box::new(SimpleSelect::default())));
        }

        let shared = ctx.shared().clone();
        Ok(ModeSetup::Pending(Box::pin(async move {
            let services = &shared.services;
            let at = match &point_id {
                Some(id) => match services.fetch_source_geometry(id).await {
                    Ok(Some(Geometry::Point(source))) => source,
                    Ok(_) => at,
                    Err(err) => {
                        log::warn!("Source geometry for {} unavailable: {}", id, err);
                        at
                    }
                },
                None => at,
            };

            let mut vertices = Vec::new();
            for (feature_id, layer_id, rendered) in lines {
                let line = match services.fetch_source_geometry(&feature_id).await {
                    Ok(Some(Geometry::LineString(coords))) if !coords.is_empty() => coords,
                    Ok(_) => rendered,
                    Err(err) => {
                        log::warn!("Source geometry for {} unavailable: {}", feature_id, err);
                        rendered
                    }
                };
                if let Some((index, adjacent)) = adjacent_line_data(&line, at) {
                    vertices.push(CoincidentVertex {
                        feature_id,
                        layer_id,
                        line,
                        index,
                        adjacent,
                    });
                }
            }
            log::debug!("{} lines share the selected point", vertices.len());
            let mode: DrawResult<Box<dyn Mode>> =
                Ok(Box::new(SimpleSelect::with_coincident(vertices)));
            mode
        })))
    }
}

/// Host lines rendered around `at`, one entry per authoritative id.
fn lines_under(
    ctx: &ModeContext<'_>,
    at: LngLat,
    id_property: &str,
) -> Vec<(String, String, Vec<LngLat>)> {
    let center = ctx.host().project(at);
    let area = QueryArea::Box(Rect::new(
        center.x - SEARCH_HALF_PX,
        center.y - SEARCH_HALF_PX,
        center.x + SEARCH_HALF_PX,
        center.y + SEARCH_HALF_PX,
    ));
    let mut lines: Vec<(String, String, Vec<LngLat>)> = Vec::new();
    for rendered in ctx.host().query_rendered_features(area, None) {
        if rendered.source == DRAW_SOURCE
            || rendered.source == SNAP_VERTEX
            || rendered.layer_id.starts_with(BUFFER_PREFIX)
        {
            continue;
        }
        let Some(feature_id) = rendered.property_string(id_property) else {
            continue;
        };
        if lines.iter().any(|(seen, _, _)| *seen == feature_id) {
            continue;
        }
        if let Geometry::LineString(coords) = rendered.geometry {
            lines.push((feature_id, rendered.layer_id, coords));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coords(points: &[(f64, f64)]) -> Vec<LngLat> {
        points.iter().map(|&(lng, lat)| LngLat::new(lng, lat)).collect()
    }

    #[test]
    fn test_adjacent_line_data_ends_and_interior() {
        let line = coords(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (3.0, 0.0)]);
        assert_eq!(
            adjacent_line_data(&line, LngLat::new(0.0, 0.0)),
            Some((0, coords(&[(1.0, 0.0)])))
        );
        assert_eq!(
            adjacent_line_data(&line, LngLat::new(2.0, 0.0)),
            Some((2, coords(&[(1.0, 0.0), (3.0, 0.0)])))
        );
        assert_eq!(
            adjacent_line_data(&line, LngLat::new(3.0, 0.0)),
            Some((3, coords(&[(2.0, 0.0)])))
        );
        assert_eq!(adjacent_line_data(&line, LngLat::new(1.5, 0.0)), None);
    }

    #[test]
    fn test_adjacent_line_data_degenerate_lines() {
        assert_eq!(adjacent_line_data(&[], LngLat::new(0.0, 0.0)), None);
        assert_eq!(adjacent_line_data(&coords(&[(0.0, 0.0)]), LngLat::new(0.0, 0.0)), None);

        let ring = coords(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)]);
        assert_eq!(
            adjacent_line_data(&ring, LngLat::new(0.0, 0.0)),
            Some((0, coords(&[(1.0, 0.0)])))
        );
    }

    #[test]
    fn test_moved_to_replaces_shared_vertex_only() {
        let line = coords(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]);
        let (index, adjacent) = adjacent_line_data(&line, LngLat::new(1.0, 0.0)).unwrap();
        let vertex = CoincidentVertex {
            feature_id: "road-1".to_string(),
            layer_id: "roads".to_string(),
            line,
            index,
            adjacent,
        };
        let moved = vertex.moved_to(LngLat::new(1.0, 0.5));
        assert_eq!(moved.feature_id, "road-1");
        assert_eq!(
            moved.geometry,
            Geometry::LineString(coords(&[(0.0, 0.0), (1.0, 0.5), (2.0, 0.0)]))
        );
    }
}
