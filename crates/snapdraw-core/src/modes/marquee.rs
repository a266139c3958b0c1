use super::{EditTarget, Mode, ModeClass, ModeContext, ModeDescriptor, ModeOptions, ModeSetup, SIMPLE_SELECT};
use crate::cursor::{Cursor, HoverFacts};
use crate::error::DrawResult;
use crate::geo::{Feature, FeatureId, Geometry};
use crate::host::{LayerKind, LayerSpec, MapHost, QueryArea};
use crate::input::PointerEvent;
use kurbo::{Point, Rect};
use serde_json::{Value, json};
use std::rc::Rc;

/// Source and layer drawing the selection box.
const MARQUEE_BOX: &str = "_marquee";

/// Box selection of draw features.
#[derive(Debug, Default)]
pub struct Marquee {
    start: Option<Point>,
}

impl Marquee {
    pub const DESCRIPTOR: ModeDescriptor =
        ModeDescriptor::new(ModeClass::GroupSelect, EditTarget::None, None);

    pub fn setup(ctx: &mut ModeContext<'_>, _options: &ModeOptions) -> DrawResult<ModeSetup> {
        let host = ctx.host();
        host.set_drag_pan(false);
        if !host.has_source(MARQUEE_BOX) {
            host.add_source(MARQUEE_BOX);
        }
        if host.layer(MARQUEE_BOX).is_none() {
            let paint = match json!({"fill-color": "#3bb2d0", "fill-opacity": 0.2}) {
                Value::Object(map) => map,
                _ => serde_json::Map::new(),
            };
            host.add_layer(LayerSpec {
                id: MARQUEE_BOX.to_string(),
                kind: LayerKind::Fill,
                source: MARQUEE_BOX.to_string(),
                source_layer: None,
                filter: None,
                paint,
            });
        }
        ctx.set_cursor_logic(Some(Rc::new(|_: &HoverFacts| Some(Cursor::Add))));
        Ok(ModeSetup::Ready(Box::new(Marquee::default())))
    }

    fn draw_box(&self, host: &dyn MapHost, area: Rect) {
        let ring = [
            Point::new(area.x0, area.y0),
            Point::new(area.x1, area.y0),
            Point::new(area.x1, area.y1),
            Point::new(area.x0, area.y1),
        ]
        .into_iter()
        .map(|p| host.unproject(p))
        .collect::<Vec<_>>();
        let outline = Feature::new(MARQUEE_BOX, Geometry::Polygon(vec![ring]).close_rings());
        host.set_source_data(MARQUEE_BOX, vec![outline]);
    }

    /// Draw features whose rendering intersects `area`, without duplicates.
    fn features_in(ctx: &ModeContext<'_>, area: Rect) -> Vec<FeatureId> {
        let layers = ctx.options().draw_layer_ids();
        let mut ids: Vec<FeatureId> = Vec::new();
        for hit in ctx
            .host()
            .query_rendered_features(QueryArea::Box(area), Some(layers.as_slice()))
        {
            let is_feature = hit.properties.get("meta").and_then(Value::as_str) == Some("feature");
            if let Some(id) = hit.id.filter(|id| is_feature && !ids.contains(id)) {
                ids.push(id);
            }
        }
        ids
    }
}

impl Mode for Marquee {
    fn on_stop(&mut self, ctx: &mut ModeContext<'_>) -> DrawResult<()> {
        let host = ctx.host();
        if host.layer(MARQUEE_BOX).is_some() {
            host.remove_layer(MARQUEE_BOX);
        }
        if host.has_source(MARQUEE_BOX) {
            host.remove_source(MARQUEE_BOX);
        }
        host.set_drag_pan(true);
        Ok(())
    }

    fn on_mouse_down(&mut self, _ctx: &mut ModeContext<'_>, e: &PointerEvent) -> DrawResult<()> {
        self.start = Some(e.point);
        Ok(())
    }

    fn on_drag(&mut self, ctx: &mut ModeContext<'_>, e: &PointerEvent) -> DrawResult<()> {
        if let Some(start) = self.start {
            self.draw_box(ctx.host(), Rect::from_points(start, e.point));
        }
        Ok(())
    }

    fn on_mouse_up(&mut self, ctx: &mut ModeContext<'_>, e: &PointerEvent) -> DrawResult<()> {
        let Some(start) = self.start.take() else {
            return Ok(());
        };
        let ids = Self::features_in(ctx, Rect::from_points(start, e.point));
        log::debug!("Box selected {} features", ids.len());
        ctx.change_mode(SIMPLE_SELECT, ModeOptions::select(ids));
        Ok(())
    }
}
