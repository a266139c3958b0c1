//! State handed to mode callbacks.

use super::ModeOptions;
use crate::actionable::{ActionableDelta, ActionableState};
use crate::config::{DRAW_SOURCE, DrawOptions};
use crate::cursor::{CursorLogic, CursorPolicy};
use crate::events::{DrawEvent, Notifier};
use crate::geo::FeatureId;
use crate::host::{FeatureRef, GeometryService, MapHost};
use crate::input::PointerEvent;
use crate::snap::{SnapEngine, SnappedCoord};
use crate::store::FeatureStore;
use std::cell::{RefCell, RefMut};
use std::rc::Rc;

/// Handles shared by the controller, the snap engine and async tasks.
#[derive(Clone)]
pub struct Shared {
    pub host: Rc<dyn MapHost>,
    pub services: Rc<dyn GeometryService>,
    pub store: Rc<RefCell<FeatureStore>>,
    pub snapping: Rc<RefCell<SnapEngine>>,
    pub notifier: Notifier,
    pub options: Rc<DrawOptions>,
}

impl Shared {
    pub fn new(
        host: Rc<dyn MapHost>,
        services: Rc<dyn GeometryService>,
        options: DrawOptions,
    ) -> Self {
        let notifier = Notifier::new();
        let snapping = SnapEngine::new(host.clone(), notifier.clone(), options.snapping.clone());
        Self {
            host,
            services,
            store: Rc::new(RefCell::new(FeatureStore::new())),
            snapping: Rc::new(RefCell::new(snapping)),
            notifier,
            options: Rc::new(options),
        }
    }
}

/// Apply `delta` and notify when anything changed.
pub(crate) fn update_actionable(
    state: &mut ActionableState,
    notifier: &Notifier,
    delta: &ActionableDelta,
) {
    if state.apply(delta) {
        notifier.emit(DrawEvent::ActionableChanged { actions: *state });
    }
}

/// What a mode may touch while handling a callback.
pub struct ModeContext<'a> {
    shared: &'a Shared,
    cursor: &'a mut CursorPolicy,
    actionable: &'a mut ActionableState,
    transition: &'a mut Option<(String, ModeOptions)>,
    allow_transitions: bool,
}

impl<'a> ModeContext<'a> {
    pub(crate) fn new(
        shared: &'a Shared,
        cursor: &'a mut CursorPolicy,
        actionable: &'a mut ActionableState,
        transition: &'a mut Option<(String, ModeOptions)>,
        allow_transitions: bool,
    ) -> Self {
        Self {
            shared,
            cursor,
            actionable,
            transition,
            allow_transitions,
        }
    }

    pub fn shared(&self) -> &Shared {
        self.shared
    }

    pub fn host(&self) -> &dyn MapHost {
        self.shared.host.as_ref()
    }

    pub fn options(&self) -> &DrawOptions {
        &self.shared.options
    }

    /// Mutable store access. Do not hold the guard across another call
    /// into the context.
    pub fn store(&self) -> RefMut<'_, FeatureStore> {
        self.shared.store.borrow_mut()
    }

    pub fn emit(&self, event: DrawEvent) {
        self.shared.notifier.emit(event);
    }

    /// Request a transition, applied once the callback returns. The last
    /// request wins.
    pub fn change_mode(&mut self, name: &str, options: ModeOptions) {
        if !self.allow_transitions {
            log::debug!("Ignoring transition to {} requested while stopping", name);
            return;
        }
        *self.transition = Some((name.to_string(), options));
    }

    pub fn set_actionable(&mut self, delta: ActionableDelta) {
        update_actionable(self.actionable, &self.shared.notifier, &delta);
    }

    pub fn set_cursor_logic(&mut self, logic: Option<CursorLogic>) {
        self.cursor.set_cursor_logic(logic);
    }

    /// Snap the pointer coordinate, ignoring candidates `exclude` rejects.
    pub fn snap_coord(
        &self,
        event: &PointerEvent,
        exclude: Option<&dyn Fn(&FeatureRef) -> bool>,
    ) -> SnappedCoord {
        self.shared.snapping.borrow_mut().snap_coord(event, exclude)
    }

    /// Snap while ignoring the draw feature being edited.
    pub fn snap_coord_excluding(&self, event: &PointerEvent, editing: &FeatureId) -> SnappedCoord {
        let exclude = |f: &FeatureRef| f.source == DRAW_SOURCE && f.id.as_ref() == Some(editing);
        self.snap_coord(event, Some(&exclude))
    }

    pub fn set_snap_to_selected(&self, value: bool) {
        self.shared.snapping.borrow_mut().set_snap_to_selected(value);
    }
}
