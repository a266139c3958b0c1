use super::coincident_select::CoincidentVertex;
use super::selectors::{is_active_feature, is_shift_down, target_feature_id, target_handle};
use super::{
    CommitPhase, DIRECT_SELECT, EditTarget, Mode, ModeClass, ModeContext, ModeDescriptor,
    ModeOptions, ModeSetup,
};
use crate::actionable::ActionableDelta;
use crate::cursor::{Cursor, HoverFacts};
use crate::display::supplementary_features;
use crate::error::DrawResult;
use crate::events::{DrawEvent, UpdateAction};
use crate::geo::{Feature, FeatureId, Geometry, GeometryKind, LngLat};
use crate::input::PointerEvent;
use crate::store::FeatureStore;
use std::rc::Rc;

/// Whole-feature selection and editing.
#[derive(Debug, Default)]
pub struct SimpleSelect {
    drag_from: Option<LngLat>,
    can_drag_move: bool,
    dragging: bool,
    /// Single point being dragged; receives snapped coordinates.
    dragged_point: Option<FeatureId>,
    /// Line vertices that follow a moved point.
    coincident: Vec<CoincidentVertex>,
}

impl SimpleSelect {
    pub const DESCRIPTOR: ModeDescriptor =
        ModeDescriptor::new(ModeClass::Select, EditTarget::Point, Some(CommitPhase::PointerUp));

    pub fn setup(ctx: &mut ModeContext<'_>, options: &ModeOptions) -> DrawResult<ModeSetup> {
        Self::enter(ctx, options);
        Ok(ModeSetup::Ready(Box::new(SimpleSelect::default())))
    }

    /// Selection that also reports `coincident` line vertices on every move.
    pub fn with_coincident(coincident: Vec<CoincidentVertex>) -> Self {
        Self {
            coincident,
            ..Self::default()
        }
    }

    /// Apply the initial selection, cursor and actionable state.
    pub(crate) fn enter(ctx: &mut ModeContext<'_>, options: &ModeOptions) {
        {
            let mut store = ctx.store();
            store.clear_selection();
            for id in &options.feature_ids {
                let admitted = store.get(id).is_some_and(|f| options.admits(f));
                if admitted {
                    store.select(id);
                } else {
                    log::debug!("Not selecting {}", id);
                }
            }
        }
        ctx.set_cursor_logic(Some(Rc::new(|facts: &HoverFacts| {
            Some(if facts.is_over_selected {
                Cursor::Move
            } else if facts.over_features {
                Cursor::Pointer
            } else {
                Cursor::Grab
            })
        })));
        refresh_actionable(ctx);
    }

    fn start_drag(&mut self, ctx: &mut ModeContext<'_>, e: &PointerEvent) {
        if !is_active_feature(e) {
            return;
        }
        self.can_drag_move = true;
        self.drag_from = Some(e.lng_lat);
        ctx.host().set_drag_pan(false);
    }

    fn finish_drag(&mut self, ctx: &mut ModeContext<'_>) {
        if self.dragging {
            let features = ctx.store().selected_features();
            let coincident = match features.as_slice() {
                [moved] => match moved.geometry {
                    Geometry::Point(at) => self.coincident.iter().map(|v| v.moved_to(at)).collect(),
                    _ => Vec::new(),
                },
                _ => Vec::new(),
            };
            ctx.emit(DrawEvent::FeaturesUpdated {
                action: UpdateAction::Move,
                features,
                coincident,
            });
        }
        if self.can_drag_move {
            ctx.host().set_drag_pan(true);
        }
        self.can_drag_move = false;
        self.dragging = false;
        self.drag_from = None;
        self.dragged_point = None;
    }

    fn click(&mut self, ctx: &mut ModeContext<'_>, e: &PointerEvent) -> DrawResult<()> {
        if let Some((parent, path)) = target_handle(e) {
            ctx.change_mode(
                DIRECT_SELECT,
                ModeOptions {
                    coord_path: Some(path),
                    ..ModeOptions::feature(parent)
                },
            );
            return Ok(());
        }
        let Some(id) = target_feature_id(e) else {
            ctx.store().clear_selection();
            refresh_actionable(ctx);
            return Ok(());
        };

        let (selected, count, kind) = {
            let store = ctx.store();
            let kind = store.get(&id).map(|f| f.geometry.kind());
            (store.is_selected(&id), store.selected_ids().len(), kind)
        };
        if is_shift_down(e) {
            let mut store = ctx.store();
            if selected {
                store.deselect(&id);
            } else {
                store.select(&id);
            }
        } else if selected && count == 1 && kind.is_some_and(|k| !k.is_point_like()) {
            ctx.change_mode(DIRECT_SELECT, ModeOptions::feature(id));
            return Ok(());
        } else {
            let mut store = ctx.store();
            store.clear_selection();
            store.select(&id);
        }
        refresh_actionable(ctx);
        Ok(())
    }
}

/// Actionable flags implied by the current selection.
fn actionable_for(store: &FeatureStore) -> ActionableDelta {
    let selected: Vec<Feature> = store.selected_features();
    let first_base = selected.first().map(|f| base_kind(f.geometry.kind()));
    let combinable = selected.len() > 1
        && selected
            .iter()
            .all(|f| Some(base_kind(f.geometry.kind())) == first_base);
    let uncombinable = selected.iter().any(|f| is_multi(f.geometry.kind()));
    ActionableDelta::all(!selected.is_empty(), combinable, uncombinable)
}

fn refresh_actionable(ctx: &mut ModeContext<'_>) {
    let delta = actionable_for(&ctx.store());
    ctx.set_actionable(delta);
}

fn base_kind(kind: GeometryKind) -> GeometryKind {
    match kind {
        GeometryKind::MultiPoint => GeometryKind::Point,
        GeometryKind::MultiLineString => GeometryKind::LineString,
        GeometryKind::MultiPolygon => GeometryKind::Polygon,
        other => other,
    }
}

fn is_multi(kind: GeometryKind) -> bool {
    base_kind(kind) != kind
}

/// Merge same-typed geometries into one multi-geometry.
pub(crate) fn combine(geometries: &[Geometry]) -> Option<Geometry> {
    let mut points = Vec::new();
    let mut lines = Vec::new();
    let mut polygons = Vec::new();
    for geometry in geometries {
        match geometry.clone() {
            Geometry::Point(p) => points.push(p),
            Geometry::MultiPoint(ps) => points.extend(ps),
            Geometry::LineString(l) => lines.push(l),
            Geometry::MultiLineString(ls) => lines.extend(ls),
            Geometry::Polygon(p) => polygons.push(p),
            Geometry::MultiPolygon(ps) => polygons.extend(ps),
        }
    }
    match (points.is_empty(), lines.is_empty(), polygons.is_empty()) {
        (false, true, true) => Some(Geometry::MultiPoint(points)),
        (true, false, true) => Some(Geometry::MultiLineString(lines)),
        (true, true, false) => Some(Geometry::MultiPolygon(polygons)),
        _ => None,
    }
}

/// Split a multi-geometry into its parts.
pub(crate) fn uncombine(geometry: &Geometry) -> Vec<Geometry> {
    match geometry {
        Geometry::MultiPoint(ps) => ps.iter().copied().map(Geometry::Point).collect(),
        Geometry::MultiLineString(ls) => ls.iter().cloned().map(Geometry::LineString).collect(),
        Geometry::MultiPolygon(ps) => ps.iter().cloned().map(Geometry::Polygon).collect(),
        _ => Vec::new(),
    }
}

impl Mode for SimpleSelect {
    fn on_stop(&mut self, ctx: &mut ModeContext<'_>) -> DrawResult<()> {
        self.finish_drag(ctx);
        Ok(())
    }

    fn on_mouse_down(&mut self, ctx: &mut ModeContext<'_>, e: &PointerEvent) -> DrawResult<()> {
        self.start_drag(ctx, e);
        Ok(())
    }

    fn on_touch_start(&mut self, ctx: &mut ModeContext<'_>, e: &PointerEvent) -> DrawResult<()> {
        self.start_drag(ctx, e);
        Ok(())
    }

    fn on_drag(&mut self, ctx: &mut ModeContext<'_>, e: &PointerEvent) -> DrawResult<()> {
        let Some(from) = self.drag_from.filter(|_| self.can_drag_move) else {
            return Ok(());
        };
        self.dragging = true;

        let selected = ctx.store().selected_ids();
        let single_point = match selected.as_slice() {
            [only] => ctx
                .store()
                .get(only)
                .is_some_and(|f| matches!(f.geometry, Geometry::Point(_)))
                .then(|| only.clone()),
            _ => None,
        };
        if let Some(id) = single_point {
            let snapped = ctx.snap_coord_excluding(e, &id);
            if let Some(feature) = ctx.store().get_mut(&id) {
                feature.geometry = Geometry::Point(snapped.lng_lat);
            }
            self.dragged_point = Some(id);
        } else {
            let (dlng, dlat) = (e.lng_lat.lng - from.lng, e.lng_lat.lat - from.lat);
            let mut store = ctx.store();
            for id in &selected {
                if let Some(feature) = store.get_mut(id) {
                    feature.geometry.translate(dlng, dlat);
                }
            }
        }
        self.drag_from = Some(e.lng_lat);
        Ok(())
    }

    fn on_mouse_up(&mut self, ctx: &mut ModeContext<'_>, _e: &PointerEvent) -> DrawResult<()> {
        self.finish_drag(ctx);
        Ok(())
    }

    fn on_touch_end(&mut self, ctx: &mut ModeContext<'_>, _e: &PointerEvent) -> DrawResult<()> {
        self.finish_drag(ctx);
        Ok(())
    }

    fn on_mouse_out(&mut self, ctx: &mut ModeContext<'_>, _e: &PointerEvent) -> DrawResult<()> {
        self.finish_drag(ctx);
        Ok(())
    }

    fn on_click(&mut self, ctx: &mut ModeContext<'_>, e: &PointerEvent) -> DrawResult<()> {
        self.finish_drag(ctx);
        self.click(ctx, e)
    }

    fn on_tap(&mut self, ctx: &mut ModeContext<'_>, e: &PointerEvent) -> DrawResult<()> {
        self.finish_drag(ctx);
        self.click(ctx, e)
    }

    fn on_trash(&mut self, ctx: &mut ModeContext<'_>) -> DrawResult<()> {
        let selected = ctx.store().selected_ids();
        let deleted = ctx.store().delete(&selected);
        if !deleted.is_empty() {
            ctx.emit(DrawEvent::FeaturesDeleted { features: deleted });
        }
        refresh_actionable(ctx);
        Ok(())
    }

    fn on_combine_features(&mut self, ctx: &mut ModeContext<'_>) -> DrawResult<()> {
        let selected = ctx.store().selected_features();
        if selected.len() < 2 {
            return Ok(());
        }
        let geometries: Vec<Geometry> = selected.iter().map(|f| f.geometry.clone()).collect();
        let Some(geometry) = combine(&geometries) else {
            log::debug!("Cannot combine features of different types");
            return Ok(());
        };

        let mut combined = Feature::new(FeatureId::new_v4(), geometry);
        combined.properties = selected[0].properties.clone();
        let ids: Vec<FeatureId> = selected.iter().map(|f| f.id.clone()).collect();
        let created = {
            let mut store = ctx.store();
            store.delete(&ids);
            let id = store.add(combined);
            store.select(&id);
            store.export(&id)
        };
        ctx.emit(DrawEvent::FeaturesCombined {
            created: created.into_iter().collect(),
            deleted: selected,
        });
        refresh_actionable(ctx);
        Ok(())
    }

    fn on_uncombine_features(&mut self, ctx: &mut ModeContext<'_>) -> DrawResult<()> {
        let selected = ctx.store().selected_features();
        let mut created = Vec::new();
        let mut deleted = Vec::new();
        {
            let mut store = ctx.store();
            for feature in selected {
                let parts = uncombine(&feature.geometry);
                if parts.is_empty() {
                    continue;
                }
                store.delete(std::slice::from_ref(&feature.id));
                for part in parts {
                    let mut single = Feature::new(FeatureId::new_v4(), part);
                    single.properties = feature.properties.clone();
                    let id = store.add(single);
                    store.select(&id);
                    created.extend(store.export(&id));
                }
                deleted.push(feature);
            }
        }
        if !deleted.is_empty() {
            ctx.emit(DrawEvent::FeaturesUncombined { created, deleted });
        }
        refresh_actionable(ctx);
        Ok(())
    }

    fn to_display_features(&self, feature: Feature, push: &mut dyn FnMut(Feature)) {
        let active = feature.str_property("active") == Some("true");
        let handles = if active && !feature.geometry.kind().is_point_like() {
            supplementary_features(&feature, &[], false)
        } else {
            Vec::new()
        };
        push(feature);
        handles.into_iter().for_each(push);
    }

    fn edited_feature(&self) -> Option<FeatureId> {
        self.dragged_point.clone()
    }
}
