use super::selectors::{is_enter, is_escape, is_vertex, target_handle};
use super::{
    CommitPhase, DRAW_POLYGON, EditTarget, Mode, ModeClass, ModeContext, ModeDescriptor,
    ModeOptions, ModeSetup, SIMPLE_SELECT,
};
use crate::actionable::ActionableDelta;
use crate::cursor::{Cursor, HoverFacts};
use crate::display::vertex_feature;
use crate::error::DrawResult;
use crate::events::DrawEvent;
use crate::geo::{Feature, FeatureId, Geometry, LngLat};
use crate::input::{KeyEvent, PointerEvent};
use crate::store::CoordPath;
use std::rc::Rc;

/// Draws a single-ring polygon.
#[derive(Debug)]
pub struct DrawPolygon {
    feature_id: FeatureId,
    /// Committed vertices of the outer ring.
    committed: usize,
    /// The vertex after the committed ones follows the pointer.
    placeholder: bool,
    multiple: bool,
    abandoned: bool,
}

impl DrawPolygon {
    pub const DESCRIPTOR: ModeDescriptor =
        ModeDescriptor::new(ModeClass::Draw, EditTarget::Line, Some(CommitPhase::PointerDown));

    pub fn setup(ctx: &mut ModeContext<'_>, options: &ModeOptions) -> DrawResult<ModeSetup> {
        let id = {
            let mut store = ctx.store();
            let id = store.add(Feature::new(
                FeatureId::new_v4(),
                Geometry::Polygon(vec![Vec::new()]),
            ));
            store.clear_selection();
            store.select(&id);
            id
        };
        ctx.host().set_double_click_zoom(false);
        ctx.set_actionable(ActionableDelta::all(true, false, false));
        ctx.set_cursor_logic(Some(Rc::new(|_: &HoverFacts| Some(Cursor::Add))));
        Ok(ModeSetup::Ready(Box::new(DrawPolygon {
            feature_id: id,
            committed: 0,
            placeholder: false,
            multiple: options.multiple,
            abandoned: false,
        })))
    }

    fn with_ring(&mut self, ctx: &ModeContext<'_>, f: impl FnOnce(&mut Self, &mut Vec<LngLat>)) {
        let mut store = ctx.store();
        let ring = match store.get_mut(&self.feature_id).map(|feature| &mut feature.geometry) {
            Some(Geometry::Polygon(rings)) => rings.get_mut(0),
            _ => None,
        };
        if let Some(ring) = ring {
            f(self, ring);
        }
    }

    fn place(&mut self, ring: &mut Vec<LngLat>, at: LngLat) {
        if self.placeholder {
            if let Some(c) = ring.get_mut(self.committed) {
                *c = at;
            }
        } else {
            ring.truncate(self.committed);
            ring.push(at);
            self.placeholder = true;
        }
    }

    /// Whether the pointer is on the first or the last committed vertex.
    fn on_closing_handle(&self, e: &PointerEvent) -> bool {
        if self.committed == 0 || !is_vertex(e) {
            return false;
        }
        target_handle(e).is_some_and(|(parent, path)| {
            parent == self.feature_id
                && (path == CoordPath::new(vec![0, 0])
                    || path == CoordPath::new(vec![0, self.committed - 1]))
        })
    }

    fn press(&mut self, ctx: &mut ModeContext<'_>, e: &PointerEvent) {
        if self.on_closing_handle(e) {
            self.finish(ctx);
            return;
        }
        let at = ctx.snap_coord_excluding(e, &self.feature_id).lng_lat;
        self.with_ring(ctx, |mode, ring| {
            mode.place(ring, at);
            ring.push(at);
            mode.committed += 1;
        });
    }

    fn finish(&mut self, ctx: &mut ModeContext<'_>) {
        if self.multiple {
            ctx.change_mode(
                DRAW_POLYGON,
                ModeOptions {
                    multiple: true,
                    previous_feature_id: Some(self.feature_id.clone()),
                    ..Default::default()
                },
            );
        } else {
            ctx.change_mode(SIMPLE_SELECT, ModeOptions::select(vec![self.feature_id.clone()]));
        }
    }

    fn abandon(&mut self, ctx: &mut ModeContext<'_>) {
        self.abandoned = true;
        ctx.store().delete(std::slice::from_ref(&self.feature_id));
        ctx.change_mode(SIMPLE_SELECT, ModeOptions::default());
    }
}

impl Mode for DrawPolygon {
    fn on_stop(&mut self, ctx: &mut ModeContext<'_>) -> DrawResult<()> {
        ctx.host().set_double_click_zoom(true);
        if self.abandoned {
            return Ok(());
        }
        self.with_ring(ctx, |mode, ring| {
            ring.truncate(mode.committed);
            mode.placeholder = false;
        });

        let exported = {
            let store = ctx.store();
            store
                .get(&self.feature_id)
                .filter(|f| f.geometry.is_valid())
                .and_then(|_| store.export(&self.feature_id))
        };
        match exported {
            Some(feature) => ctx.emit(DrawEvent::FeaturesCreated {
                features: vec![feature],
            }),
            None => {
                log::debug!("Discarding polygon {} with too few vertices", self.feature_id);
                ctx.store().delete(std::slice::from_ref(&self.feature_id));
            }
        }
        Ok(())
    }

    fn on_mouse_move(&mut self, ctx: &mut ModeContext<'_>, e: &PointerEvent) -> DrawResult<()> {
        let at = ctx.snap_coord_excluding(e, &self.feature_id).lng_lat;
        self.with_ring(ctx, |mode, ring| mode.place(ring, at));
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

    fn on_dbl_click(&mut self, ctx: &mut ModeContext<'_>, _e: &PointerEvent) -> DrawResult<()> {
        self.finish(ctx);
        Ok(())
    }

    fn on_key_up(&mut self, ctx: &mut ModeContext<'_>, e: &KeyEvent) -> DrawResult<()> {
        if is_enter(e) {
            self.finish(ctx);
        } else if is_escape(e) {
            self.abandon(ctx);
        }
        Ok(())
    }

    fn on_trash(&mut self, ctx: &mut ModeContext<'_>) -> DrawResult<()> {
        self.abandon(ctx);
        Ok(())
    }

    fn to_display_features(&self, feature: Feature, push: &mut dyn FnMut(Feature)) {
        if feature.id != self.feature_id {
            push(feature);
            return;
        }
        let mut handles = Vec::new();
        if self.committed > 0 {
            let mut indices = vec![0];
            if self.committed > 1 {
                indices.push(self.committed - 1);
            }
            for i in indices {
                let path = CoordPath::new(vec![0, i]);
                if let Some(at) = feature.geometry.coordinate(&path) {
                    handles.push(vertex_feature(&feature.id, &path, at, false));
                }
            }
        }
        push(feature);
        handles.into_iter().for_each(push);
    }

    fn edited_feature(&self) -> Option<FeatureId> {
        Some(self.feature_id.clone())
    }
}
