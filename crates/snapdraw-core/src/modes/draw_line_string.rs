use super::selectors::{is_enter, is_escape, is_vertex, target_handle};
use super::{
    CommitPhase, EditTarget, Mode, ModeClass, ModeContext, ModeDescriptor, ModeOptions, ModeSetup,
    SIMPLE_SELECT,
};
use crate::actionable::ActionableDelta;
use crate::cursor::{Cursor, HoverFacts};
use crate::display::vertex_feature;
use crate::error::{DrawError, DrawResult};
use crate::events::{DrawEvent, UpdateAction};
use crate::geo::{Feature, FeatureId, Geometry, LngLat};
use crate::input::{KeyEvent, PointerEvent};
use crate::store::CoordPath;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

/// Draws a new line, or extends an existing one from either end.
#[derive(Debug)]
pub struct DrawLineString {
    feature_id: FeatureId,
    direction: Direction,
    /// Committed vertices, including those of a continued line.
    committed: usize,
    /// A vertex follows the pointer.
    placeholder: bool,
    /// Geometry of a continued line before drawing started.
    original: Option<Geometry>,
    abandoned: bool,
}

impl DrawLineString {
    pub const DESCRIPTOR: ModeDescriptor =
        ModeDescriptor::new(ModeClass::Draw, EditTarget::Line, Some(CommitPhase::PointerDown));

    pub fn setup(ctx: &mut ModeContext<'_>, options: &ModeOptions) -> DrawResult<ModeSetup> {
        let mode = match (&options.feature_id, options.from) {
            (Some(id), Some(from)) => Self::continue_line(ctx, id, from)?,
            (Some(id), None) => {
                return Err(DrawError::InvalidOption(format!(
                    "continuing {id} requires a from coordinate"
                )));
            }
            (None, _) => {
                let id = ctx
                    .store()
                    .add(Feature::new(FeatureId::new_v4(), Geometry::LineString(Vec::new())));
                DrawLineString {
                    feature_id: id,
                    direction: Direction::Forward,
                    committed: 0,
                    placeholder: false,
                    original: None,
                    abandoned: false,
                }
            }
        };
        {
            let mut store = ctx.store();
            store.clear_selection();
            store.select(&mode.feature_id);
        }
        ctx.host().set_double_click_zoom(false);
        ctx.set_actionable(ActionableDelta::all(true, false, false));
        ctx.set_cursor_logic(Some(Rc::new(|_: &HoverFacts| Some(Cursor::Add))));
        Ok(ModeSetup::Ready(Box::new(mode)))
    }

    fn continue_line(ctx: &mut ModeContext<'_>, id: &FeatureId, from: LngLat) -> DrawResult<Self> {
        let mut store = ctx.store();
        let Some(feature) = store.get_mut(id) else {
            return Err(DrawError::FeatureNotFound(id.to_string()));
        };
        let original = feature.geometry.clone();
        let Geometry::LineString(coords) = &mut feature.geometry else {
            return Err(DrawError::InvalidOption(format!(
                "{id} is not a LineString and cannot be continued"
            )));
        };
        let direction = if coords.last() == Some(&from) {
            coords.push(from);
            Direction::Forward
        } else if coords.first() == Some(&from) {
            coords.insert(0, from);
            Direction::Backward
        } else {
            return Err(DrawError::InvalidOption(format!(
                "from must be the first or last vertex of {id}"
            )));
        };
        Ok(DrawLineString {
            feature_id: id.clone(),
            direction,
            committed: coords.len() - 1,
            placeholder: true,
            original: Some(original),
            abandoned: false,
        })
    }

    fn placeholder_index(&self) -> usize {
        match self.direction {
            Direction::Forward => self.committed,
            Direction::Backward => 0,
        }
    }

    /// Index of the vertex committed last.
    fn last_committed(&self) -> Option<usize> {
        if self.committed == 0 {
            return None;
        }
        Some(match self.direction {
            Direction::Forward => self.committed - 1,
            Direction::Backward => usize::from(self.placeholder),
        })
    }

    /// Move the placeholder, creating it if needed.
    fn place(&mut self, coords: &mut Vec<LngLat>, at: LngLat) {
        let index = self.placeholder_index();
        if self.placeholder {
            if let Some(c) = coords.get_mut(index) {
                *c = at;
            }
        } else {
            coords.insert(index.min(coords.len()), at);
            self.placeholder = true;
        }
    }

    fn with_coords(&mut self, ctx: &ModeContext<'_>, f: impl FnOnce(&mut Self, &mut Vec<LngLat>)) {
        let mut store = ctx.store();
        if let Some(Geometry::LineString(coords)) =
            store.get_mut(&self.feature_id).map(|feature| &mut feature.geometry)
        {
            f(self, coords);
        }
    }

    fn press(&mut self, ctx: &mut ModeContext<'_>, e: &PointerEvent) {
        let on_last = is_vertex(e)
            && target_handle(e).is_some_and(|(parent, path)| {
                parent == self.feature_id && path.last() == self.last_committed()
            });
        if on_last {
            self.finish(ctx);
            return;
        }
        let snapped = ctx.snap_coord_excluding(e, &self.feature_id);
        let at = snapped.lng_lat;
        self.with_coords(ctx, |mode, coords| {
            mode.place(coords, at);
            match mode.direction {
                Direction::Forward => coords.push(at),
                Direction::Backward => coords.insert(0, at),
            }
            mode.committed += 1;
        });
    }

    fn finish(&mut self, ctx: &mut ModeContext<'_>) {
        ctx.change_mode(SIMPLE_SELECT, ModeOptions::select(vec![self.feature_id.clone()]));
    }

    fn abandon(&mut self, ctx: &mut ModeContext<'_>) {
        self.abandoned = true;
        match self.original.take() {
            Some(original) => {
                if let Some(feature) = ctx.store().get_mut(&self.feature_id) {
                    feature.geometry = original;
                }
            }
            None => {
                ctx.store().delete(std::slice::from_ref(&self.feature_id));
            }
        }
        ctx.change_mode(SIMPLE_SELECT, ModeOptions::default());
    }

    fn remove_placeholder(&mut self, ctx: &ModeContext<'_>) {
        if !self.placeholder {
            return;
        }
        self.with_coords(ctx, |mode, coords| {
            let index = mode.placeholder_index();
            if index < coords.len() {
                coords.remove(index);
            }
            mode.placeholder = false;
        });
    }
}

impl Mode for DrawLineString {
    fn on_stop(&mut self, ctx: &mut ModeContext<'_>) -> DrawResult<()> {
        ctx.host().set_double_click_zoom(true);
        if self.abandoned {
            return Ok(());
        }
        self.remove_placeholder(ctx);

        let exported = {
            let store = ctx.store();
            store
                .get(&self.feature_id)
                .filter(|f| f.geometry.is_valid())
                .and_then(|_| store.export(&self.feature_id))
        };
        match (exported, self.original.is_some()) {
            (Some(feature), false) => ctx.emit(DrawEvent::FeaturesCreated {
                features: vec![feature],
            }),
            (Some(feature), true) => {
                ctx.emit(DrawEvent::FeaturesUpdated {
                    action: UpdateAction::ChangeCoordinates,
                    features: vec![feature.clone()],
                    coincident: Vec::new(),
                });
                ctx.emit(DrawEvent::LineExtended { feature });
            }
            (None, _) => {
                log::debug!("Discarding incomplete line {}", self.feature_id);
                ctx.store().delete(std::slice::from_ref(&self.feature_id));
            }
        }
        Ok(())
    }

    fn on_mouse_move(&mut self, ctx: &mut ModeContext<'_>, e: &PointerEvent) -> DrawResult<()> {
        let snapped = ctx.snap_coord_excluding(e, &self.feature_id);
        self.with_coords(ctx, |mode, coords| mode.place(coords, snapped.lng_lat));
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
        let handle = self.last_committed().and_then(|i| {
            let path = CoordPath::new(vec![i]);
            let at = feature.geometry.coordinate(&path)?;
            Some(vertex_feature(&feature.id, &path, at, false))
        });
        push(feature);
        if let Some(handle) = handle {
            push(handle);
        }
    }

    fn edited_feature(&self) -> Option<FeatureId> {
        Some(self.feature_id.clone())
    }
}
