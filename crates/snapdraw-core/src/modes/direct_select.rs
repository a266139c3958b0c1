use super::selectors::{
    is_midpoint, is_shift_down, is_vertex, no_target, target_feature_id, target_handle,
};
use super::{
    CommitPhase, DRAW_LINE_STRING, EditTarget, Mode, ModeClass, ModeContext, ModeDescriptor,
    ModeOptions, ModeSetup, SIMPLE_SELECT,
};
use crate::actionable::ActionableDelta;
use crate::cursor::{Cursor, HoverFacts};
use crate::display::supplementary_features;
use crate::error::{DrawError, DrawResult};
use crate::events::{DrawEvent, UpdateAction};
use crate::geo::{Feature, FeatureId, Geometry, LngLat};
use crate::input::PointerEvent;
use crate::store::CoordPath;
use kurbo::Point;
use std::rc::Rc;

/// Vertex editing of a single line or polygon.
#[derive(Debug)]
pub struct DirectSelect {
    feature_id: FeatureId,
    selected: Vec<CoordPath>,
    drag_from: Option<LngLat>,
    can_drag_move: bool,
    dragging: bool,
    /// Geometry when the drag started.
    before_drag: Option<Geometry>,
}

impl DirectSelect {
    pub const DESCRIPTOR: ModeDescriptor =
        ModeDescriptor::new(ModeClass::Select, EditTarget::Line, Some(CommitPhase::PointerUp));

    pub fn setup(ctx: &mut ModeContext<'_>, options: &ModeOptions) -> DrawResult<ModeSetup> {
        let id = options
            .feature_id
            .clone()
            .ok_or_else(|| DrawError::InvalidOption("direct_select requires feature_id".to_string()))?;
        let id_property = ctx.options().snapping.id_property.clone();
        let (kind, source_id) = {
            let store = ctx.store();
            let feature = store
                .get(&id)
                .ok_or_else(|| DrawError::FeatureNotFound(id.to_string()))?;
            let source_id = feature
                .properties
                .get(&id_property)
                .and_then(|v| v.as_str())
                .map(str::to_string);
            (feature.geometry.kind(), source_id)
        };
        if kind.is_point_like() {
            return Err(DrawError::InvalidOption(format!(
                "direct_select cannot edit {kind} feature {id}"
            )));
        }

        let selected: Vec<CoordPath> = options.coord_path.iter().cloned().collect();
        {
            let mut store = ctx.store();
            store.clear_selection();
            store.select(&id);
            store.set_selected_coordinates(selected.iter().map(|p| (id.clone(), p.clone())).collect());
        }
        ctx.set_actionable(ActionableDelta::all(true, false, false));
        ctx.set_cursor_logic(Some(Rc::new(|facts: &HoverFacts| {
            Some(if facts.is_over_selected {
                Cursor::Move
            } else if facts.over_features {
                Cursor::Pointer
            } else {
                Cursor::Grab
            })
        })));

        let mode = DirectSelect {
            feature_id: id,
            selected,
            drag_from: None,
            can_drag_move: false,
            dragging: false,
            before_drag: None,
        };
        let Some(source_id) = source_id else {
            return Ok(ModeSetup::Ready(Box::new(mode)));
        };

        let shared = ctx.shared().clone();
        Ok(ModeSetup::Pending(Box::pin(async move {
            match shared.services.fetch_source_geometry(&source_id).await {
                Ok(Some(geometry)) => {
                    if let Some(feature) = shared.store.borrow_mut().get_mut(&mode.feature_id) {
                        log::debug!("Editing source geometry of {}", source_id);
                        feature.geometry = geometry.open_rings();
                    }
                }
                Ok(None) => {}
                Err(err) => log::warn!("Source geometry for {} unavailable: {}", source_id, err),
            }
            let ready: DrawResult<Box<dyn Mode>> = Ok(Box::new(mode));
            ready
        })))
    }

    fn set_selection(&mut self, ctx: &mut ModeContext<'_>, paths: Vec<CoordPath>) {
        let coords = paths
            .iter()
            .map(|p| (self.feature_id.clone(), p.clone()))
            .collect();
        ctx.store().set_selected_coordinates(coords);
        self.selected = paths;
    }

    fn begin_drag(&mut self, ctx: &mut ModeContext<'_>, e: &PointerEvent) {
        self.can_drag_move = true;
        self.drag_from = Some(e.lng_lat);
        self.before_drag = ctx.store().get(&self.feature_id).map(|f| f.geometry.clone());
        ctx.host().set_drag_pan(false);
    }

    fn press(&mut self, ctx: &mut ModeContext<'_>, e: &PointerEvent) {
        let handle = target_handle(e).filter(|(parent, _)| *parent == self.feature_id);
        if let Some((_, path)) = handle {
            if is_midpoint(e) {
                let at = match e.feature_target.as_ref().map(|t| &t.geometry) {
                    Some(Geometry::Point(p)) => *p,
                    _ => e.lng_lat,
                };
                let inserted = ctx
                    .store()
                    .get_mut(&self.feature_id)
                    .is_some_and(|f| f.geometry.add_coordinate(&path, at));
                if inserted {
                    self.emit_update(ctx, UpdateAction::ChangeCoordinates);
                    self.set_selection(ctx, vec![path]);
                }
            } else if is_shift_down(e) {
                let mut paths = self.selected.clone();
                match paths.iter().position(|p| *p == path) {
                    Some(i) => {
                        paths.remove(i);
                    }
                    None => paths.push(path),
                }
                self.set_selection(ctx, paths);
            } else if !self.selected.contains(&path) {
                self.set_selection(ctx, vec![path]);
            }
            self.begin_drag(ctx, e);
        } else if target_feature_id(e).as_ref() == Some(&self.feature_id) {
            self.set_selection(ctx, Vec::new());
            self.begin_drag(ctx, e);
        }
    }

    fn emit_update(&self, ctx: &mut ModeContext<'_>, action: UpdateAction) {
        let features: Vec<Feature> = ctx.store().export(&self.feature_id).into_iter().collect();
        ctx.emit(DrawEvent::FeaturesUpdated {
            action,
            features,
            coincident: Vec::new(),
        });
    }

    fn release(&mut self, ctx: &mut ModeContext<'_>) {
        if self.dragging {
            let reverted = {
                let mut store = ctx.store();
                match (store.get_mut(&self.feature_id), self.before_drag.take()) {
                    (Some(feature), Some(before)) if self_intersects(&feature.geometry) => {
                        feature.geometry = before;
                        true
                    }
                    _ => false,
                }
            };
            if reverted {
                log::debug!("Reverted self-intersecting edit of {}", self.feature_id);
            }
            let action = if self.selected.is_empty() {
                UpdateAction::Move
            } else {
                UpdateAction::ChangeCoordinates
            };
            self.emit_update(ctx, action);
        }
        if self.can_drag_move {
            ctx.host().set_drag_pan(true);
        }
        self.can_drag_move = false;
        self.dragging = false;
        self.drag_from = None;
        self.before_drag = None;
    }

    fn click(&mut self, ctx: &mut ModeContext<'_>, e: &PointerEvent) {
        self.release(ctx);
        if no_target(e) {
            ctx.change_mode(SIMPLE_SELECT, ModeOptions::default());
        } else if let Some(other) = target_feature_id(e).filter(|t| *t != self.feature_id) {
            ctx.change_mode(SIMPLE_SELECT, ModeOptions::select(vec![other]));
        }
    }
}

/// Whether any ring of an area crosses itself.
pub(crate) fn self_intersects(geometry: &Geometry) -> bool {
    let rings: Vec<&Vec<LngLat>> = match geometry {
        Geometry::Polygon(rings) => rings.iter().collect(),
        Geometry::MultiPolygon(polygons) => polygons.iter().flatten().collect(),
        _ => return false,
    };
    rings.into_iter().any(|ring| ring_self_intersects(ring))
}

/// Proper crossings between non-adjacent edges of an open ring.
fn ring_self_intersects(ring: &[LngLat]) -> bool {
    let n = ring.len();
    if n < 4 {
        return false;
    }
    let at = |i: usize| Point::new(ring[i % n].lng, ring[i % n].lat);
    for i in 0..n {
        for j in (i + 2)..n {
            if i == 0 && j == n - 1 {
                continue;
            }
            if segments_cross(at(i), at(i + 1), at(j), at(j + 1)) {
                return true;
            }
        }
    }
    false
}

fn segments_cross(a: Point, b: Point, c: Point, d: Point) -> bool {
    let side = |p: Point, q: Point, r: Point| (q - p).cross(r - p);
    let straddles = |s1: f64, s2: f64| (s1 > 0.0 && s2 < 0.0) || (s1 < 0.0 && s2 > 0.0);
    straddles(side(c, d, a), side(c, d, b)) && straddles(side(a, b, c), side(a, b, d))
}

impl Mode for DirectSelect {
    fn on_stop(&mut self, ctx: &mut ModeContext<'_>) -> DrawResult<()> {
        self.release(ctx);
        ctx.store().set_selected_coordinates(Vec::new());
        Ok(())
    }

    fn on_mouse_down(&mut self, ctx: &mut ModeContext<'_>, e: &PointerEvent) -> DrawResult<()> {
        self.press(ctx, e);
        Ok(())
    }

    fn on_touch_start(&mut self, ctx: &mut ModeContext<'_>, e: &PointerEvent) -> DrawResult<()> {
        self.press(ctx, e);
        Ok(())
    }

    fn on_drag(&mut self, ctx: &mut ModeContext<'_>, e: &PointerEvent) -> DrawResult<()> {
        let Some(from) = self.drag_from.filter(|_| self.can_drag_move) else {
            return Ok(());
        };
        self.dragging = true;
        match self.selected.as_slice() {
            [path] => {
                let snapped = ctx.snap_coord_excluding(e, &self.feature_id);
                if let Some(feature) = ctx.store().get_mut(&self.feature_id) {
                    feature.geometry.update_coordinate(path, snapped.lng_lat);
                }
            }
            [] => {
                if let Some(feature) = ctx.store().get_mut(&self.feature_id) {
                    feature
                        .geometry
                        .translate(e.lng_lat.lng - from.lng, e.lng_lat.lat - from.lat);
                }
            }
            paths => {
                let mut store = ctx.store();
                if let Some(feature) = store.get_mut(&self.feature_id) {
                    for path in paths {
                        if let Some(c) = feature.geometry.coordinate(path) {
                            let moved = LngLat::new(
                                c.lng + e.lng_lat.lng - from.lng,
                                c.lat + e.lng_lat.lat - from.lat,
                            );
                            feature.geometry.update_coordinate(path, moved);
                        }
                    }
                }
            }
        }
        self.drag_from = Some(e.lng_lat);
        Ok(())
    }

    fn on_mouse_up(&mut self, ctx: &mut ModeContext<'_>, _e: &PointerEvent) -> DrawResult<()> {
        self.release(ctx);
        Ok(())
    }

    fn on_touch_end(&mut self, ctx: &mut ModeContext<'_>, _e: &PointerEvent) -> DrawResult<()> {
        self.release(ctx);
        Ok(())
    }

    fn on_mouse_out(&mut self, ctx: &mut ModeContext<'_>, _e: &PointerEvent) -> DrawResult<()> {
        self.release(ctx);
        Ok(())
    }

    fn on_click(&mut self, ctx: &mut ModeContext<'_>, e: &PointerEvent) -> DrawResult<()> {
        self.click(ctx, e);
        Ok(())
    }

    fn on_tap(&mut self, ctx: &mut ModeContext<'_>, e: &PointerEvent) -> DrawResult<()> {
        self.click(ctx, e);
        Ok(())
    }

    fn on_dbl_click(&mut self, ctx: &mut ModeContext<'_>, e: &PointerEvent) -> DrawResult<()> {
        if !is_vertex(e) {
            return Ok(());
        }
        let Some((_, path)) = target_handle(e).filter(|(parent, _)| *parent == self.feature_id)
        else {
            return Ok(());
        };
        let end = match ctx.store().get(&self.feature_id).map(|f| &f.geometry) {
            Some(Geometry::LineString(coords)) => path
                .last()
                .filter(|&i| i == 0 || i + 1 == coords.len())
                .and_then(|i| coords.get(i).copied()),
            _ => None,
        };
        if let Some(from) = end {
            ctx.change_mode(
                DRAW_LINE_STRING,
                ModeOptions {
                    from: Some(from),
                    ..ModeOptions::feature(self.feature_id.clone())
                },
            );
        }
        Ok(())
    }

    fn on_trash(&mut self, ctx: &mut ModeContext<'_>) -> DrawResult<()> {
        if self.selected.is_empty() {
            return Ok(());
        }
        let mut paths = self.selected.clone();
        paths.sort_unstable_by(|a, b| b.cmp(a));
        let valid = {
            let mut store = ctx.store();
            let Some(feature) = store.get_mut(&self.feature_id) else {
                return Ok(());
            };
            for path in &paths {
                feature.geometry.remove_coordinate(path);
            }
            feature.geometry.is_valid()
        };
        self.set_selection(ctx, Vec::new());
        if valid {
            self.emit_update(ctx, UpdateAction::ChangeCoordinates);
        } else {
            let deleted = ctx.store().delete(std::slice::from_ref(&self.feature_id));
            ctx.emit(DrawEvent::FeaturesDeleted { features: deleted });
            ctx.change_mode(SIMPLE_SELECT, ModeOptions::default());
        }
        Ok(())
    }

    fn to_display_features(&self, feature: Feature, push: &mut dyn FnMut(Feature)) {
        if feature.id != self.feature_id {
            push(feature);
            return;
        }
        let handles = supplementary_features(&feature, &self.selected, true);
        push(feature);
        handles.into_iter().for_each(push);
    }

    fn edited_feature(&self) -> Option<FeatureId> {
        (self.dragging && self.selected.len() == 1).then(|| self.feature_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(coords: &[(f64, f64)]) -> Geometry {
        Geometry::Polygon(vec![coords.iter().map(|&(x, y)| LngLat::new(x, y)).collect()])
    }

    #[test]
    fn test_square_does_not_self_intersect() {
        let square = ring(&[(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 2.0)]);
        assert!(!self_intersects(&square));
    }

    #[test]
    fn test_bowtie_self_intersects() {
        let bowtie = ring(&[(0.0, 0.0), (2.0, 2.0), (2.0, 0.0), (0.0, 2.0)]);
        assert!(self_intersects(&bowtie));
    }

    #[test]
    fn test_lines_never_self_intersect() {
        let line = Geometry::LineString(vec![
            LngLat::new(0.0, 0.0),
            LngLat::new(2.0, 2.0),
            LngLat::new(2.0, 0.0),
            LngLat::new(0.0, 2.0),
        ]);
        assert!(!self_intersects(&line));
    }
}
