//! Routes classified input to the active mode and runs mode transitions.

use super::context::update_actionable;
use super::{
    Mode, ModeClass, ModeContext, ModeDescriptor, ModeOptions, ModeRegistry, ModeSetup, STATIC,
    Shared, StaticMode,
};
use crate::actionable::{ActionableDelta, ActionableState};
use crate::config::DRAW_SOURCE;
use crate::cursor::{Cursor, CursorPolicy, HoverFacts};
use crate::error::{DrawError, DrawResult};
use crate::events::DrawEvent;
use crate::geo::FeatureId;
use crate::gesture::{PointerSample, is_click, is_tap};
use crate::host::BoxFuture;
use crate::input::{EventOutcome, InputEvent, KeyEvent, PointerEvent};
use std::fmt;
use std::rc::Rc;

/// An async mode setup the caller must drive to completion and hand back
/// through [`ModeController::complete_setup`].
pub struct PendingSetup {
    pub generation: u64,
    pub mode: String,
    pub future: BoxFuture<'static, DrawResult<Box<dyn Mode>>>,
}

impl fmt::Debug for PendingSetup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingSetup")
            .field("generation", &self.generation)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// Result of dispatching one input event.
#[derive(Debug, Default)]
pub struct Dispatched {
    pub outcome: EventOutcome,
    /// Setups started by transitions the event triggered.
    pub setups: Vec<PendingSetup>,
}

enum ActiveMode {
    Idle,
    Ready(Box<dyn Mode>),
    Pending { generation: u64, queued: Vec<InputEvent> },
}

/// Owns the active mode and turns raw input into mode callbacks.
pub struct ModeController {
    shared: Shared,
    registry: ModeRegistry,
    active: ActiveMode,
    current: Option<String>,
    descriptor: ModeDescriptor,
    mouse_session: Option<PointerSample>,
    touch_session: Option<PointerSample>,
    cursor: CursorPolicy,
    actionable: ActionableState,
    generation: u64,
}

impl fmt::Debug for ModeController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModeController")
            .field("current", &self.current)
            .field("descriptor", &self.descriptor)
            .field("pending", &self.is_pending())
            .field("actionable", &self.actionable)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl ModeController {
    pub fn new(shared: Shared, registry: ModeRegistry) -> Self {
        Self {
            shared,
            registry,
            active: ActiveMode::Idle,
            current: None,
            descriptor: StaticMode::DESCRIPTOR,
            mouse_session: None,
            touch_session: None,
            cursor: CursorPolicy::new(),
            actionable: ActionableState::default(),
            generation: 0,
        }
    }

    pub fn shared(&self) -> &Shared {
        &self.shared
    }

    pub fn current_mode(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn descriptor(&self) -> ModeDescriptor {
        self.descriptor
    }

    pub fn actionable_state(&self) -> ActionableState {
        self.actionable
    }

    /// Whether the active mode is still waiting on its async setup.
    pub fn is_pending(&self) -> bool {
        matches!(self.active, ActiveMode::Pending { .. })
    }

    pub fn cursor_policy(&self) -> &CursorPolicy {
        &self.cursor
    }

    /// Feature the active mode is committing coordinates to.
    pub fn edited_feature(&self) -> Option<FeatureId> {
        match &self.active {
            ActiveMode::Ready(mode) => mode.edited_feature(),
            _ => None,
        }
    }

    /// Add the draw source and any missing draw layers.
    pub fn add_draw_layers(&self) {
        let host = &self.shared.host;
        if !host.has_source(DRAW_SOURCE) {
            host.add_source(DRAW_SOURCE);
        }
        for layer in &self.shared.options.styles {
            if host.layer(&layer.id).is_none() {
                host.add_layer(layer.clone());
            }
        }
    }

    /// Push the current display features to the draw source.
    pub fn render(&mut self) {
        let mode: Option<&dyn Mode> = match &self.active {
            ActiveMode::Ready(mode) => Some(mode.as_ref()),
            _ => None,
        };
        self.shared
            .store
            .borrow_mut()
            .render(self.shared.host.as_ref(), mode);
    }

    /// Update the actionable flags, notifying on change.
    pub fn actionable(&mut self, delta: ActionableDelta) {
        update_actionable(&mut self.actionable, &self.shared.notifier, &delta);
    }

    /// Leave the current mode and enter `name`.
    pub fn change_mode(&mut self, name: &str, options: ModeOptions) -> DrawResult<Vec<PendingSetup>> {
        let registration = self
            .registry
            .get(name)
            .cloned()
            .ok_or_else(|| DrawError::UnknownMode(name.to_string()))?;
        log::debug!("Mode change: {:?} -> {}", self.current, name);

        if self.descriptor.class == ModeClass::GroupSelect {
            self.cursor.override_cursor_logic(None);
        }
        if registration.descriptor.class == ModeClass::GroupSelect {
            self.cursor
                .override_cursor_logic(Some(Rc::new(|_: &HoverFacts| Some(Cursor::Add))));
        }

        if let ActiveMode::Ready(mut mode) = std::mem::replace(&mut self.active, ActiveMode::Idle) {
            let mut dropped = None;
            let mut ctx = ModeContext::new(
                &self.shared,
                &mut self.cursor,
                &mut self.actionable,
                &mut dropped,
                false,
            );
            if let Err(err) = mode.on_stop(&mut ctx) {
                log::warn!("Error stopping mode {:?}: {}", self.current, err);
            }
        }
        self.cursor.set_cursor_logic(None);
        self.mouse_session = None;
        self.touch_session = None;
        self.generation += 1;

        let mut transition = None;
        let setup = {
            let mut ctx = ModeContext::new(
                &self.shared,
                &mut self.cursor,
                &mut self.actionable,
                &mut transition,
                true,
            );
            (registration.factory)(&mut ctx, &options)
        };
        let mut pending = Vec::new();
        match setup {
            Ok(ModeSetup::Ready(mode)) => self.active = ActiveMode::Ready(mode),
            Ok(ModeSetup::Pending(future)) => {
                log::debug!("Mode {} waiting on async setup", name);
                self.active = ActiveMode::Pending {
                    generation: self.generation,
                    queued: Vec::new(),
                };
                pending.push(PendingSetup {
                    generation: self.generation,
                    mode: name.to_string(),
                    future,
                });
            }
            Err(err) => {
                log::warn!("Setup of mode {} failed: {}", name, err);
                self.install_static();
                return Err(err);
            }
        }

        self.current = Some(name.to_string());
        self.descriptor = registration.descriptor;
        self.shared.notifier.emit(DrawEvent::ModeChanged {
            mode: name.to_string(),
        });
        self.shared.store.borrow_mut().mark_dirty();
        self.render();

        if let Some((next, options)) = transition {
            pending.extend(self.change_mode(&next, options)?);
        }
        Ok(pending)
    }

    /// Install the static mode without running a factory.
    fn install_static(&mut self) {
        self.cursor.set_cursor_logic(None);
        self.cursor.override_cursor_logic(None);
        self.active = ActiveMode::Ready(Box::new(StaticMode));
        self.current = Some(STATIC.to_string());
        self.descriptor = StaticMode::DESCRIPTOR;
        self.shared.notifier.emit(DrawEvent::ModeChanged {
            mode: STATIC.to_string(),
        });
        self.shared.store.borrow_mut().mark_dirty();
        self.render();
    }

    /// Finish an async setup. Returns the events queued while it was
    /// pending, for the caller to replay.
    pub fn complete_setup(
        &mut self,
        generation: u64,
        result: DrawResult<Box<dyn Mode>>,
    ) -> DrawResult<Vec<InputEvent>> {
        match std::mem::replace(&mut self.active, ActiveMode::Idle) {
            ActiveMode::Pending {
                generation: pending,
                queued,
            } if pending == generation => match result {
                Ok(mode) => {
                    log::debug!(
                        "Mode {:?} ready, replaying {} queued events",
                        self.current,
                        queued.len()
                    );
                    self.active = ActiveMode::Ready(mode);
                    self.shared.store.borrow_mut().mark_dirty();
                    self.render();
                    Ok(queued)
                }
                Err(err) => {
                    log::warn!(
                        "Async setup of {:?} failed, dropping {} queued events: {}",
                        self.current,
                        queued.len(),
                        err
                    );
                    self.install_static();
                    Err(err)
                }
            },
            other => {
                self.active = other;
                log::trace!("Discarding stale mode setup (generation {})", generation);
                Ok(Vec::new())
            }
        }
    }

    pub fn trash(&mut self) -> DrawResult<Vec<PendingSetup>> {
        self.delegate(|mode, ctx| mode.on_trash(ctx))
    }

    pub fn combine_features(&mut self) -> DrawResult<Vec<PendingSetup>> {
        self.delegate(|mode, ctx| mode.on_combine_features(ctx))
    }

    pub fn uncombine_features(&mut self) -> DrawResult<Vec<PendingSetup>> {
        self.delegate(|mode, ctx| mode.on_uncombine_features(ctx))
    }

    /// Run a callback on the ready mode, then apply its transition request
    /// and re-render if anything changed.
    fn delegate(
        &mut self,
        callback: impl FnOnce(&mut dyn Mode, &mut ModeContext<'_>) -> DrawResult<()>,
    ) -> DrawResult<Vec<PendingSetup>> {
        let ActiveMode::Ready(mode) = &mut self.active else {
            return Ok(Vec::new());
        };
        let mut transition = None;
        let result = {
            let mut ctx = ModeContext::new(
                &self.shared,
                &mut self.cursor,
                &mut self.actionable,
                &mut transition,
                true,
            );
            callback(mode.as_mut(), &mut ctx)
        };
        result?;

        let setups = match transition {
            Some((name, options)) => self.change_mode(&name, options)?,
            None => Vec::new(),
        };
        if self.shared.store.borrow().is_dirty() {
            self.render();
        }
        Ok(setups)
    }

    /// Hit-test the draw layers, update the cursor and attach the target.
    fn hit(&self, event: &PointerEvent, dragging: bool, buffer_px: f64) -> PointerEvent {
        let snapped = self.shared.snapping.borrow().cursor_is_snapped();
        let layers = self.shared.options.draw_layer_ids();
        let target = self.cursor.resolve_cursor(
            self.shared.host.as_ref(),
            event,
            dragging,
            snapped,
            &layers,
            buffer_px,
        );
        PointerEvent {
            feature_target: target,
            ..event.clone()
        }
    }

    fn drag(
        &mut self,
        event: &PointerEvent,
        touch: bool,
        outcome: &mut EventOutcome,
    ) -> DrawResult<Vec<PendingSetup>> {
        let gestures = self.shared.options.gestures;
        let sample = event.sample();
        let (within, buffer) = if touch {
            (
                is_tap(self.touch_session.as_ref(), &sample, &gestures.tap),
                self.shared.options.touch_buffer_px,
            )
        } else {
            (
                is_click(self.mouse_session.as_ref(), &sample, &gestures.click),
                self.shared.options.click_buffer_px,
            )
        };
        if within {
            outcome.stop_propagation = true;
            return Ok(Vec::new());
        }
        let event = self.hit(event, true, buffer);
        self.delegate(|mode, ctx| mode.on_drag(ctx, &event))
    }

    /// Route one input event to the active mode.
    pub fn dispatch(&mut self, event: &InputEvent) -> DrawResult<Dispatched> {
        if let ActiveMode::Pending { queued, .. } = &mut self.active {
            if !matches!(event, InputEvent::StyleData) {
                log::debug!("Queueing {} until mode setup completes", event.name());
                queued.push(event.clone());
                return Ok(Dispatched::default());
            }
        }

        let mut outcome = EventOutcome::default();
        if matches!(
            event,
            InputEvent::TouchStart(_) | InputEvent::TouchMove(_) | InputEvent::TouchEnd(_)
        ) {
            outcome.prevent_default = true;
        }
        if self.descriptor.class == ModeClass::Static && !matches!(event, InputEvent::StyleData) {
            return Ok(Dispatched {
                outcome,
                setups: Vec::new(),
            });
        }

        let options = self.shared.options.clone();
        let click_buffer = options.click_buffer_px;
        let touch_buffer = options.touch_buffer_px;
        let setups = match event {
            InputEvent::MouseDown(e) => {
                self.mouse_session = Some(e.sample());
                let e = self.hit(e, false, click_buffer);
                self.delegate(|mode, ctx| mode.on_mouse_down(ctx, &e))?
            }
            InputEvent::MouseMove(e) if e.primary_held => self.drag(e, false, &mut outcome)?,
            InputEvent::MouseMove(e) => {
                let e = self.hit(e, false, click_buffer);
                self.delegate(|mode, ctx| mode.on_mouse_move(ctx, &e))?
            }
            InputEvent::MouseUp(e) => {
                let e = self.hit(e, false, click_buffer);
                let click = is_click(self.mouse_session.as_ref(), &e.sample(), &options.gestures.click);
                if click && self.descriptor.class != ModeClass::GroupSelect {
                    self.delegate(|mode, ctx| mode.on_click(ctx, &e))?
                } else {
                    self.delegate(|mode, ctx| mode.on_mouse_up(ctx, &e))?
                }
            }
            InputEvent::MouseOut(e) => self.delegate(|mode, ctx| mode.on_mouse_out(ctx, e))?,
            InputEvent::TouchStart(_) | InputEvent::TouchMove(_) | InputEvent::TouchEnd(_)
                if !options.touch_enabled =>
            {
                Vec::new()
            }
            InputEvent::TouchStart(e) => {
                self.touch_session = Some(e.sample());
                let e = self.hit(e, false, touch_buffer);
                self.delegate(|mode, ctx| mode.on_touch_start(ctx, &e))?
            }
            InputEvent::TouchMove(e) => {
                let mut setups = self.delegate(|mode, ctx| mode.on_touch_move(ctx, e))?;
                setups.extend(self.drag(e, true, &mut outcome)?);
                setups
            }
            InputEvent::TouchEnd(e) => {
                let e = self.hit(e, false, touch_buffer);
                if is_tap(self.touch_session.as_ref(), &e.sample(), &options.gestures.tap) {
                    self.delegate(|mode, ctx| mode.on_tap(ctx, &e))?
                } else {
                    self.delegate(|mode, ctx| mode.on_touch_end(ctx, &e))?
                }
            }
            InputEvent::KeyDown(k) => {
                if k.key.is_trash() && k.on_map_surface && options.keybindings && options.trash_control {
                    outcome.prevent_default = true;
                    self.delegate(|mode, ctx| mode.on_trash(ctx))?
                } else {
                    Vec::new()
                }
            }
            InputEvent::KeyUp(k) => self.key_up(k, options.keybindings)?,
            InputEvent::DblClick(e) => {
                let e = self.hit(e, false, click_buffer);
                self.delegate(|mode, ctx| mode.on_dbl_click(ctx, &e))?
            }
            InputEvent::StyleData => {
                self.on_style_data();
                Vec::new()
            }
        };
        Ok(Dispatched { outcome, setups })
    }

    fn key_up(&mut self, key: &KeyEvent, keybindings: bool) -> DrawResult<Vec<PendingSetup>> {
        if !keybindings || key.key.is_trash() {
            return Ok(Vec::new());
        }
        self.delegate(|mode, ctx| mode.on_key_up(ctx, key))
    }

    fn on_style_data(&mut self) {
        let host = &self.shared.host;
        let missing = self
            .shared
            .options
            .styles
            .iter()
            .all(|layer| host.layer(&layer.id).is_none());
        if missing {
            log::debug!("Draw layers missing after style change, re-adding");
            self.add_draw_layers();
            self.shared.store.borrow_mut().mark_dirty();
            self.render();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DrawOptions;
    use crate::geo::{Feature, Geometry, LngLat};
    use crate::host::{MapHost, MemoryGeometryService, MemoryHost};
    use crate::input::Key;
    use crate::modes::{CommitPhase, EditTarget, SIMPLE_SELECT};
    use kurbo::Point;
    use std::cell::RefCell;

    /// Records every callback it receives.
    struct Recorder {
        log: Rc<RefCell<Vec<String>>>,
        on_click_go_to: Option<String>,
    }

    impl Mode for Recorder {
        fn on_stop(&mut self, ctx: &mut ModeContext<'_>) -> DrawResult<()> {
            self.log.borrow_mut().push("stop".to_string());
            ctx.change_mode(SIMPLE_SELECT, ModeOptions::default());
            Ok(())
        }

        fn on_mouse_down(&mut self, _ctx: &mut ModeContext<'_>, _e: &PointerEvent) -> DrawResult<()> {
            self.log.borrow_mut().push("down".to_string());
            Ok(())
        }

        fn on_mouse_up(&mut self, _ctx: &mut ModeContext<'_>, _e: &PointerEvent) -> DrawResult<()> {
            self.log.borrow_mut().push("up".to_string());
            Ok(())
        }

        fn on_click(&mut self, ctx: &mut ModeContext<'_>, _e: &PointerEvent) -> DrawResult<()> {
            self.log.borrow_mut().push("click".to_string());
            if let Some(next) = &self.on_click_go_to {
                ctx.change_mode(next, ModeOptions::default());
            }
            Ok(())
        }

        fn on_drag(&mut self, _ctx: &mut ModeContext<'_>, _e: &PointerEvent) -> DrawResult<()> {
            self.log.borrow_mut().push("drag".to_string());
            Ok(())
        }

        fn on_tap(&mut self, _ctx: &mut ModeContext<'_>, _e: &PointerEvent) -> DrawResult<()> {
            self.log.borrow_mut().push("tap".to_string());
            Ok(())
        }

        fn on_key_up(&mut self, _ctx: &mut ModeContext<'_>, e: &KeyEvent) -> DrawResult<()> {
            self.log.borrow_mut().push(format!("key_up {:?}", e.key));
            Ok(())
        }

        fn on_trash(&mut self, _ctx: &mut ModeContext<'_>) -> DrawResult<()> {
            self.log.borrow_mut().push("trash".to_string());
            Ok(())
        }
    }

    struct Fixture {
        host: Rc<MemoryHost>,
        controller: ModeController,
        log: Rc<RefCell<Vec<String>>>,
    }

    fn fixture(class: ModeClass, on_click_go_to: Option<&str>) -> Fixture {
        let host = Rc::new(MemoryHost::new());
        let shared = Shared::new(
            host.clone(),
            Rc::new(MemoryGeometryService::default()),
            DrawOptions::default(),
        );
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut registry = ModeRegistry::with_builtin();
        let recorder_log = log.clone();
        let next = on_click_go_to.map(str::to_string);
        registry.register(
            "recorder",
            ModeDescriptor::new(class, EditTarget::None, Some(CommitPhase::PointerUp)),
            move |_ctx: &mut ModeContext<'_>, _options: &ModeOptions| {
                recorder_log.borrow_mut().push("setup".to_string());
                Ok(ModeSetup::Ready(Box::new(Recorder {
                    log: recorder_log.clone(),
                    on_click_go_to: next.clone(),
                })))
            },
        );
        let mut controller = ModeController::new(shared, registry);
        controller.add_draw_layers();
        controller.change_mode("recorder", ModeOptions::default()).unwrap();
        log.borrow_mut().clear();
        Fixture {
            host,
            controller,
            log,
        }
    }

    fn pointer(x: f64, y: f64, time_ms: u64) -> PointerEvent {
        PointerEvent::new(Point::new(x, y), LngLat::new(x / 100.0, -y / 100.0), time_ms)
    }

    fn entries(log: &Rc<RefCell<Vec<String>>>) -> Vec<String> {
        log.borrow().clone()
    }

    #[test]
    fn test_click_versus_drag() {
        let mut f = fixture(ModeClass::Draw, None);
        let c = &mut f.controller;
        c.dispatch(&InputEvent::MouseDown(pointer(10.0, 10.0, 0))).unwrap();
        c.dispatch(&InputEvent::MouseUp(pointer(12.0, 10.0, 100))).unwrap();
        assert_eq!(entries(&f.log), ["down", "click"]);

        c.dispatch(&InputEvent::MouseDown(pointer(10.0, 10.0, 1000))).unwrap();
        let near = c
            .dispatch(&InputEvent::MouseMove(pointer(11.0, 10.0, 1010).with_primary_held(true)))
            .unwrap();
        assert!(near.outcome.stop_propagation);
        c.dispatch(&InputEvent::MouseMove(pointer(30.0, 10.0, 1050).with_primary_held(true)))
            .unwrap();
        assert_eq!(f.host.cursor(), Cursor::Grabbing);
        c.dispatch(&InputEvent::MouseUp(pointer(30.0, 10.0, 1100))).unwrap();
        assert_eq!(entries(&f.log)[2..], ["down", "drag", "up"]);
    }

    #[test]
    fn test_slow_release_is_not_a_click() {
        let mut f = fixture(ModeClass::Draw, None);
        f.controller
            .dispatch(&InputEvent::MouseDown(pointer(10.0, 10.0, 0)))
            .unwrap();
        f.controller
            .dispatch(&InputEvent::MouseUp(pointer(10.0, 10.0, 600)))
            .unwrap();
        assert_eq!(entries(&f.log), ["down", "up"]);
    }

    #[test]
    fn test_group_select_release_goes_to_mouse_up() {
        let mut f = fixture(ModeClass::GroupSelect, None);
        assert!(f.controller.cursor_policy().has_override());
        f.controller
            .dispatch(&InputEvent::MouseDown(pointer(10.0, 10.0, 0)))
            .unwrap();
        f.controller
            .dispatch(&InputEvent::MouseUp(pointer(10.0, 10.0, 50)))
            .unwrap();
        assert_eq!(entries(&f.log), ["down", "up"]);
        assert_eq!(f.host.cursor(), Cursor::Add);
    }

    #[test]
    fn test_transition_requested_in_click() {
        let mut f = fixture(ModeClass::GroupSelect, Some(SIMPLE_SELECT));
        let c = &mut f.controller;
        c.shared().notifier.drain();
        c.dispatch(&InputEvent::MouseDown(pointer(10.0, 10.0, 0))).unwrap();
        c.dispatch(&InputEvent::MouseUp(pointer(10.0, 10.0, 50))).unwrap();
        // Group select never clicks.
        assert_eq!(c.current_mode(), Some("recorder"));

        let mut f = fixture(ModeClass::Draw, Some(SIMPLE_SELECT));
        let c = &mut f.controller;
        c.shared().notifier.drain();
        c.dispatch(&InputEvent::MouseDown(pointer(10.0, 10.0, 0))).unwrap();
        c.dispatch(&InputEvent::MouseUp(pointer(10.0, 10.0, 50))).unwrap();
        assert_eq!(c.current_mode(), Some(SIMPLE_SELECT));
        assert_eq!(c.descriptor().class, ModeClass::Select);
        assert!(!c.cursor_policy().has_override());
        // The request made in on_stop was dropped; only one mode change.
        let changes: Vec<_> = c
            .shared()
            .notifier
            .drain()
            .into_iter()
            .filter(|e| matches!(e, DrawEvent::ModeChanged { .. }))
            .collect();
        assert_eq!(changes.len(), 1);
        assert_eq!(entries(&f.log), ["down", "click", "stop"]);
    }

    #[test]
    fn test_reentering_mode_stops_then_sets_up() {
        let mut f = fixture(ModeClass::Draw, None);
        f.controller.change_mode(STATIC, ModeOptions::default()).unwrap();
        f.log.borrow_mut().clear();
        f.controller.shared().notifier.drain();

        f.controller.change_mode("recorder", ModeOptions::default()).unwrap();
        f.controller.change_mode("recorder", ModeOptions::default()).unwrap();
        assert_eq!(entries(&f.log), ["setup", "stop", "setup"]);
        // The transition requested from on_stop is dropped.
        assert_eq!(f.controller.current_mode(), Some("recorder"));
        let changes = f
            .controller
            .shared()
            .notifier
            .drain()
            .into_iter()
            .filter(|e| matches!(e, DrawEvent::ModeChanged { .. }))
            .count();
        assert_eq!(changes, 2);
    }

    #[test]
    fn test_unknown_mode_leaves_current_running() {
        let mut f = fixture(ModeClass::Draw, None);
        let err = f.controller.change_mode("lasso", ModeOptions::default()).unwrap_err();
        assert!(matches!(err, DrawError::UnknownMode(name) if name == "lasso"));
        assert_eq!(f.controller.current_mode(), Some("recorder"));
        assert!(entries(&f.log).is_empty());
    }

    #[test]
    fn test_static_suppresses_input() {
        let mut f = fixture(ModeClass::Draw, None);
        f.controller.change_mode(STATIC, ModeOptions::default()).unwrap();
        f.log.borrow_mut().clear();
        f.controller
            .dispatch(&InputEvent::MouseDown(pointer(10.0, 10.0, 0)))
            .unwrap();
        f.controller
            .dispatch(&InputEvent::KeyDown(KeyEvent::new(Key::Delete)))
            .unwrap();
        assert!(entries(&f.log).is_empty());
    }

    #[test]
    fn test_keyboard_routing() {
        let mut f = fixture(ModeClass::Draw, None);
        let c = &mut f.controller;
        let down = c.dispatch(&InputEvent::KeyDown(KeyEvent::new(Key::Backspace))).unwrap();
        assert!(down.outcome.prevent_default);
        let mut off_map = KeyEvent::new(Key::Delete);
        off_map.on_map_surface = false;
        c.dispatch(&InputEvent::KeyDown(off_map)).unwrap();
        c.dispatch(&InputEvent::KeyUp(KeyEvent::new(Key::Delete))).unwrap();
        c.dispatch(&InputEvent::KeyUp(KeyEvent::new(Key::Escape))).unwrap();
        assert_eq!(entries(&f.log), ["trash", "key_up Escape"]);
    }

    #[test]
    fn test_touch_tap_and_prevent_default() {
        let mut f = fixture(ModeClass::Draw, None);
        let c = &mut f.controller;
        let start = c.dispatch(&InputEvent::TouchStart(pointer(10.0, 10.0, 0))).unwrap();
        assert!(start.outcome.prevent_default);
        c.dispatch(&InputEvent::TouchEnd(pointer(20.0, 10.0, 100))).unwrap();
        assert_eq!(entries(&f.log), ["tap"]);
    }

    #[test]
    fn test_pending_setup_queues_events() {
        let mut f = fixture(ModeClass::Draw, None);
        let ready = f.log.clone();
        f.controller.registry.register(
            "slow",
            ModeDescriptor::new(ModeClass::Draw, EditTarget::None, None),
            move |_ctx: &mut ModeContext<'_>, _options: &ModeOptions| {
                let log = ready.clone();
                Ok(ModeSetup::Pending(Box::pin(async move {
                    let mode: DrawResult<Box<dyn Mode>> = Ok(Box::new(Recorder {
                        log,
                        on_click_go_to: None,
                    }));
                    mode
                })))
            },
        );
        let mut setups = f.controller.change_mode("slow", ModeOptions::default()).unwrap();
        assert!(f.controller.is_pending());
        let setup = setups.remove(0);

        let down = InputEvent::MouseDown(pointer(10.0, 10.0, 0));
        f.controller.dispatch(&down).unwrap();
        assert_eq!(entries(&f.log), ["stop"]);

        let mode = pollster::block_on(setup.future);
        // A completion for an older generation is ignored.
        assert!(f
            .controller
            .complete_setup(setup.generation - 1, Ok(Box::new(StaticMode)))
            .unwrap()
            .is_empty());
        let queued = f.controller.complete_setup(setup.generation, mode).unwrap();
        assert_eq!(queued, vec![down]);
        assert!(!f.controller.is_pending());
    }

    #[test]
    fn test_failed_setup_falls_back_to_static() {
        let mut f = fixture(ModeClass::Draw, None);
        f.controller.registry.register(
            "broken",
            ModeDescriptor::new(ModeClass::Draw, EditTarget::None, None),
            |_ctx: &mut ModeContext<'_>, _options: &ModeOptions| {
                Ok(ModeSetup::Pending(Box::pin(async {
                    let mode: DrawResult<Box<dyn Mode>> =
                        Err(DrawError::FeatureNotFound("gone".to_string()));
                    mode
                })))
            },
        );
        let setups = f.controller.change_mode("broken", ModeOptions::default()).unwrap();
        let generation = setups[0].generation;
        f.controller
            .dispatch(&InputEvent::MouseDown(pointer(10.0, 10.0, 0)))
            .unwrap();
        let err = f
            .controller
            .complete_setup(generation, Err(DrawError::FeatureNotFound("gone".to_string())))
            .unwrap_err();
        assert!(matches!(err, DrawError::FeatureNotFound(_)));
        assert_eq!(f.controller.current_mode(), Some(STATIC));
        assert!(!f.controller.is_pending());
    }

    #[test]
    fn test_style_data_restores_draw_layers() {
        let mut f = fixture(ModeClass::Draw, None);
        f.controller
            .shared()
            .store
            .borrow_mut()
            .add(Feature::new("a", Geometry::Point(LngLat::new(0.0, 0.0))));
        for id in DrawOptions::default().draw_layer_ids() {
            f.host.remove_layer(&id);
        }
        f.host.remove_source(DRAW_SOURCE);
        f.controller.dispatch(&InputEvent::StyleData).unwrap();
        assert!(f.host.layer("snapdraw-point").is_some());
        assert_eq!(f.host.source_data(DRAW_SOURCE).len(), 1);
    }

    #[test]
    fn test_actionable_notifies_on_change_only() {
        let mut f = fixture(ModeClass::Draw, None);
        f.controller.shared().notifier.drain();
        f.controller.actionable(ActionableDelta::trash(true));
        f.controller.actionable(ActionableDelta::trash(true));
        let events = f.controller.shared().notifier.drain();
        assert_eq!(events.len(), 1);
        assert!(f.controller.actionable_state().trash);
    }
}
