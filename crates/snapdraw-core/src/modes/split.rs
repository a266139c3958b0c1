use super::selectors::{is_enter, is_escape};
use super::{EditTarget, Mode, ModeClass, ModeContext, ModeDescriptor, ModeOptions, ModeSetup, SIMPLE_SELECT};
use crate::actionable::ActionableDelta;
use crate::cursor::{Cursor, HoverFacts};
use crate::error::DrawResult;
use crate::events::DrawEvent;
use crate::geo::{Feature, Geometry, GeometryKind, LngLat};
use crate::host::{LayerKind, LayerSpec, MapHost};
use crate::input::{KeyEvent, PointerEvent};
use serde_json::{Value, json};
use std::rc::Rc;

/// Source and layer showing the chosen split points.
pub const SPLIT_VERTICES: &str = "_split_vertices";

/// Collects points on lines where the host should split them.
#[derive(Debug, Default)]
pub struct Split {
    points: Vec<LngLat>,
}

impl Split {
    pub const DESCRIPTOR: ModeDescriptor = ModeDescriptor::new(ModeClass::Draw, EditTarget::None, None);

    pub fn setup(ctx: &mut ModeContext<'_>, _options: &ModeOptions) -> DrawResult<ModeSetup> {
        ctx.set_snap_to_selected(true);
        add_marker_layer(ctx.host());
        ctx.set_actionable(ActionableDelta::all(false, false, false));
        ctx.set_cursor_logic(Some(Rc::new(|facts: &HoverFacts| {
            Some(if facts.snapped { Cursor::Add } else { Cursor::Grab })
        })));
        let mode = Split::default();
        mode.publish(ctx);
        Ok(ModeSetup::Ready(Box::new(mode)))
    }

    fn markers(&self) -> Option<Geometry> {
        match self.points.as_slice() {
            [] => None,
            [point] => Some(Geometry::Point(*point)),
            points => Some(Geometry::MultiPoint(points.to_vec())),
        }
    }

    /// Push the markers to the host and announce them.
    fn publish(&self, ctx: &ModeContext<'_>) {
        let geometry = self.markers();
        let features = geometry
            .iter()
            .map(|g| Feature::new(SPLIT_VERTICES, g.clone()))
            .collect();
        if ctx.host().has_source(SPLIT_VERTICES) {
            ctx.host().set_source_data(SPLIT_VERTICES, features);
        }
        ctx.emit(DrawEvent::SplitPointsChanged { geometry });
    }

    fn pick(&mut self, ctx: &mut ModeContext<'_>, e: &PointerEvent) {
        let snapped = ctx.snap_coord(e, None);
        let on_line = snapped
            .feature
            .as_ref()
            .is_some_and(|f| f.kind == GeometryKind::LineString);
        if !(snapped.snapped && on_line) {
            log::debug!("Split point must snap onto a line");
            return;
        }
        self.points.push(snapped.lng_lat);
        self.publish(ctx);
    }
}

fn add_marker_layer(host: &dyn MapHost) {
    if !host.has_source(SPLIT_VERTICES) {
        host.add_source(SPLIT_VERTICES);
    }
    if host.layer(SPLIT_VERTICES).is_none() {
        let paint = match json!({"circle-color": "#ff4136", "circle-radius": 5.0}) {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        host.add_layer(LayerSpec {
            id: SPLIT_VERTICES.to_string(),
            kind: LayerKind::Circle,
            source: SPLIT_VERTICES.to_string(),
            source_layer: None,
            filter: None,
            paint,
        });
    }
}

impl Mode for Split {
    fn on_stop(&mut self, ctx: &mut ModeContext<'_>) -> DrawResult<()> {
        self.points.clear();
        self.publish(ctx);
        let host = ctx.host();
        if host.layer(SPLIT_VERTICES).is_some() {
            host.remove_layer(SPLIT_VERTICES);
        }
        if host.has_source(SPLIT_VERTICES) {
            host.remove_source(SPLIT_VERTICES);
        }
        ctx.set_snap_to_selected(false);
        Ok(())
    }

    fn on_mouse_move(&mut self, ctx: &mut ModeContext<'_>, e: &PointerEvent) -> DrawResult<()> {
        ctx.snap_coord(e, None);
        Ok(())
    }

    fn on_click(&mut self, ctx: &mut ModeContext<'_>, e: &PointerEvent) -> DrawResult<()> {
        self.pick(ctx, e);
        Ok(())
    }

    fn on_tap(&mut self, ctx: &mut ModeContext<'_>, e: &PointerEvent) -> DrawResult<()> {
        self.pick(ctx, e);
        Ok(())
    }

    fn on_key_up(&mut self, ctx: &mut ModeContext<'_>, e: &KeyEvent) -> DrawResult<()> {
        if is_escape(e) || is_enter(e) {
            ctx.change_mode(SIMPLE_SELECT, ModeOptions::default());
        }
        Ok(())
    }
}
