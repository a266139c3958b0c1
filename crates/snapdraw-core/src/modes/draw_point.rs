use super::selectors::{is_enter, is_escape};
use super::{
    CommitPhase, DRAW_POINT, EditTarget, Mode, ModeClass, ModeContext, ModeDescriptor, ModeOptions,
    ModeSetup, SIMPLE_SELECT,
};
use crate::actionable::ActionableDelta;
use crate::cursor::{Cursor, HoverFacts};
use crate::error::DrawResult;
use crate::events::DrawEvent;
use crate::geo::{Feature, FeatureId, Geometry};
use crate::input::{KeyEvent, PointerEvent};
use std::rc::Rc;

/// Places a single point per click.
#[derive(Debug)]
pub struct DrawPoint {
    /// Id the next point will be stored under.
    next_id: FeatureId,
    redraw: bool,
}

impl DrawPoint {
    pub const DESCRIPTOR: ModeDescriptor =
        ModeDescriptor::new(ModeClass::Draw, EditTarget::Point, Some(CommitPhase::PointerUp));

    pub fn setup(ctx: &mut ModeContext<'_>, options: &ModeOptions) -> DrawResult<ModeSetup> {
        ctx.store().clear_selection();
        ctx.set_actionable(ActionableDelta::all(false, false, false));
        ctx.set_cursor_logic(Some(Rc::new(|_: &HoverFacts| Some(Cursor::Add))));
        Ok(ModeSetup::Ready(Box::new(DrawPoint {
            next_id: FeatureId::new_v4(),
            redraw: options.redraw,
        })))
    }

    fn place(&mut self, ctx: &mut ModeContext<'_>, e: &PointerEvent) {
        let snapped = ctx.snap_coord(e, None);
        let feature = Feature::new(self.next_id.clone(), Geometry::Point(snapped.lng_lat));
        let id = ctx.store().add(feature.clone());
        ctx.emit(DrawEvent::FeaturesCreated {
            features: vec![feature],
        });
        if self.redraw {
            ctx.change_mode(
                DRAW_POINT,
                ModeOptions {
                    redraw: true,
                    previous_feature_id: Some(id),
                    ..Default::default()
                },
            );
        } else {
            ctx.change_mode(SIMPLE_SELECT, ModeOptions::select(vec![id]));
        }
    }
}

impl Mode for DrawPoint {
    fn on_click(&mut self, ctx: &mut ModeContext<'_>, e: &PointerEvent) -> DrawResult<()> {
        self.place(ctx, e);
        Ok(())
    }

    fn on_tap(&mut self, ctx: &mut ModeContext<'_>, e: &PointerEvent) -> DrawResult<()> {
        self.place(ctx, e);
        Ok(())
    }

    fn on_key_up(&mut self, ctx: &mut ModeContext<'_>, e: &KeyEvent) -> DrawResult<()> {
        if is_escape(e) || is_enter(e) {
            ctx.change_mode(SIMPLE_SELECT, ModeOptions::default());
        }
        Ok(())
    }

    fn on_trash(&mut self, ctx: &mut ModeContext<'_>) -> DrawResult<()> {
        ctx.change_mode(SIMPLE_SELECT, ModeOptions::default());
        Ok(())
    }

    fn edited_feature(&self) -> Option<FeatureId> {
        Some(self.next_id.clone())
    }
}
