//! The drawing session: one controller, one store and one snap engine
//! attached to a map.
//!
//! [`DrawSession::handle`] is synchronous. Work that has to wait on the
//! geometry service comes back as [`DrawTask`]s, which the host drives on
//! its own executor. Each task re-validates the state it resumes into, so
//! tasks may be run late or dropped.

use crate::actionable::{ActionableDelta, ActionableState};
use crate::config::DrawOptions;
use crate::error::DrawResult;
use crate::events::DrawEvent;
use crate::geo::{Feature, FeatureId};
use crate::host::{BoxFuture, GeometryService, MapHost};
use crate::input::{EventOutcome, InputEvent};
use crate::modes::{
    CommitPhase, ModeController, ModeDescriptor, ModeOptions, ModeRegistry, PendingSetup, Shared,
};
use crate::snap::{CandidateFilter, Refinement, SnapLayerPredicate, SnapLayers, SnapLookup};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

/// What a [`DrawTask`] is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Authoritative geometry of a new snap candidate.
    SnapLookup,
    /// Closest point replacing an approximate snapped vertex.
    SnapRefinement,
    /// Async mode setup.
    ModeSetup,
}

/// Deferred work produced by the session. Running a task may yield
/// follow-up tasks.
pub struct DrawTask {
    pub kind: TaskKind,
    future: BoxFuture<'static, DrawResult<Vec<DrawTask>>>,
}

impl fmt::Debug for DrawTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrawTask")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl DrawTask {
    fn new(
        kind: TaskKind,
        future: impl Future<Output = DrawResult<Vec<DrawTask>>> + 'static,
    ) -> Self {
        Self {
            kind,
            future: Box::pin(future),
        }
    }

    pub async fn run(self) -> DrawResult<Vec<DrawTask>> {
        self.future.await
    }
}

/// Run tasks and their follow-ups in order until none remain.
pub async fn run_tasks(tasks: Vec<DrawTask>) -> DrawResult<()> {
    let mut queue: VecDeque<DrawTask> = tasks.into();
    while let Some(task) = queue.pop_front() {
        queue.extend(task.run().await?);
    }
    Ok(())
}

/// Result of [`DrawSession::handle`].
#[derive(Debug, Default)]
pub struct Handled {
    pub outcome: EventOutcome,
    pub tasks: Vec<DrawTask>,
}

/// Resolve a lookup and hand the result to the snap engine. A failure leaves
/// the candidate unresolved so the next sample asks again.
async fn resolve_lookup(shared: &Shared, lookup: &SnapLookup) {
    let resolved = match lookup.resolve(shared.services.as_ref()).await {
        Ok(resolved) => resolved,
        Err(err) => {
            log::warn!("Snap geometry lookup failed: {}", err);
            None
        }
    };
    shared
        .snapping
        .borrow_mut()
        .apply_lookup(lookup.generation, resolved);
}

/// Drawing attached to one map.
#[derive(Clone)]
pub struct DrawSession {
    controller: Rc<RefCell<ModeController>>,
    shared: Shared,
    /// Events held back while a press waits on its snap candidate.
    held: Rc<RefCell<Option<Vec<InputEvent>>>>,
}

impl fmt::Debug for DrawSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrawSession")
            .field("controller", &self.controller)
            .finish_non_exhaustive()
    }
}

impl DrawSession {
    /// Create a session with the built-in modes.
    pub fn new(
        host: Rc<dyn MapHost>,
        services: Rc<dyn GeometryService>,
        options: DrawOptions,
    ) -> DrawResult<Self> {
        Self::with_registry(host, services, options, ModeRegistry::with_builtin())
    }

    pub fn with_registry(
        host: Rc<dyn MapHost>,
        services: Rc<dyn GeometryService>,
        options: DrawOptions,
        registry: ModeRegistry,
    ) -> DrawResult<Self> {
        options.validate()?;
        let shared = Shared::new(host, services, options);
        let controller = ModeController::new(shared.clone(), registry);
        Ok(Self {
            controller: Rc::new(RefCell::new(controller)),
            shared,
            held: Rc::new(RefCell::new(None)),
        })
    }

    /// Add the draw layers, enable snapping if configured and enter the
    /// default mode.
    pub fn start(&self) -> DrawResult<Vec<DrawTask>> {
        self.controller.borrow().add_draw_layers();
        if self.shared.options.snapping.enabled {
            self.shared.snapping.borrow_mut().enable_snapping();
        }
        let default_mode = self.shared.options.default_mode.clone();
        log::info!("Starting draw session in {}", default_mode);
        self.change_mode(&default_mode, ModeOptions::default())
    }

    /// Dispatch one input event and keep snapping in step with it.
    ///
    /// A press over a candidate whose geometry is not resolved yet is held
    /// back, together with every later event, until the returned lookup task
    /// has run.
    pub fn handle(&self, event: &InputEvent) -> DrawResult<Handled> {
        if let Some(held) = self.held.borrow_mut().as_mut() {
            log::debug!("Holding {} until the snap candidate resolves", event.name());
            held.push(event.clone());
            return Ok(Handled::default());
        }

        let mut tasks = Vec::new();
        if let Some((lookup, press)) = self.sample_before_dispatch(event) {
            if press {
                *self.held.borrow_mut() = Some(Vec::new());
                let outcome = EventOutcome {
                    prevent_default: matches!(event, InputEvent::TouchStart(_)),
                    ..Default::default()
                };
                return Ok(Handled {
                    outcome,
                    tasks: vec![self.held_press_task(lookup, event.clone())],
                });
            }
            tasks.push(self.lookup_task(lookup));
        }

        let mut handled = self.dispatch(event)?;
        tasks.append(&mut handled.tasks);
        handled.tasks = tasks;
        Ok(handled)
    }

    /// Take a throttled pointer sample whose window has closed by `now_ms`.
    /// Hosts call this from a timer so a pointer at rest is still sampled.
    pub fn flush_snap_sample(&self, now_ms: u64) -> Vec<DrawTask> {
        if self.held.borrow().is_some() {
            return Vec::new();
        }
        let (descriptor, selected, drag_panning) = self.sampling_facts();
        self.shared
            .snapping
            .borrow_mut()
            .flush_deferred(now_ms, &descriptor, drag_panning, &selected)
            .map(|lookup| self.lookup_task(lookup))
            .into_iter()
            .collect()
    }

    fn sampling_facts(&self) -> (ModeDescriptor, Vec<FeatureId>, bool) {
        let descriptor = self.controller.borrow().descriptor();
        let selected = self.shared.store.borrow().selected_ids();
        (descriptor, selected, self.shared.host.is_drag_panning())
    }

    /// Presses sample their own position. Other pointer events, except
    /// moves, flush a throttled sample that is due.
    fn sample_before_dispatch(&self, event: &InputEvent) -> Option<(SnapLookup, bool)> {
        let (e, press) = match event {
            InputEvent::MouseDown(e) | InputEvent::TouchStart(e) => (e, true),
            InputEvent::MouseMove(_) | InputEvent::MouseOut(_) => return None,
            other => (other.pointer()?, false),
        };
        if !self.shared.snapping.borrow().is_enabled() {
            return None;
        }
        let (descriptor, selected, drag_panning) = self.sampling_facts();
        let mut snapping = self.shared.snapping.borrow_mut();
        let lookup = if press {
            snapping.sample_press(e, &descriptor, drag_panning, &selected)
        } else {
            snapping.flush_deferred(e.time_ms, &descriptor, drag_panning, &selected)
        };
        lookup.map(|lookup| (lookup, press))
    }

    fn held_press_task(&self, lookup: SnapLookup, press: InputEvent) -> DrawTask {
        let session = self.clone();
        DrawTask::new(TaskKind::SnapLookup, async move {
            resolve_lookup(&session.shared, &lookup).await;
            let held = session.held.borrow_mut().take().unwrap_or_default();
            log::debug!("Replaying press and {} held events", held.len());
            let mut tasks = session.dispatch(&press)?.tasks;
            for event in &held {
                tasks.extend(session.handle(event)?.tasks);
            }
            Ok(tasks)
        })
    }

    fn dispatch(&self, event: &InputEvent) -> DrawResult<Handled> {
        let (descriptor, edited) = {
            let controller = self.controller.borrow();
            (controller.descriptor(), controller.edited_feature())
        };
        let mark = self.shared.notifier.mark();

        let dispatched = self.controller.borrow_mut().dispatch(event)?;
        let mut tasks = self.setup_tasks(dispatched.setups);
        if self.shared.snapping.borrow().is_enabled() {
            tasks.extend(self.track_snapping(event, &descriptor, edited.as_ref()));
        }

        if self
            .shared
            .notifier
            .emitted_since(mark, DrawEvent::resets_snapping)
        {
            self.shared.snapping.borrow_mut().reset();
        }
        Ok(Handled {
            outcome: dispatched.outcome,
            tasks,
        })
    }

    fn track_snapping(
        &self,
        event: &InputEvent,
        descriptor: &ModeDescriptor,
        edited: Option<&FeatureId>,
    ) -> Option<DrawTask> {
        match event {
            InputEvent::StyleData => {
                self.shared.snapping.borrow_mut().refresh_snap_layers();
                None
            }
            InputEvent::MouseMove(e) => {
                let selected = self.shared.store.borrow().selected_ids();
                let drag_panning = self.shared.host.is_drag_panning();
                let lookup = self.shared.snapping.borrow_mut().on_pointer_move(
                    e,
                    descriptor,
                    drag_panning,
                    &selected,
                )?;
                Some(self.lookup_task(lookup))
            }
            InputEvent::MouseOut(_) => {
                self.shared.snapping.borrow_mut().reset();
                None
            }
            InputEvent::MouseDown(_) | InputEvent::TouchStart(_) => self
                .shared
                .snapping
                .borrow()
                .begin_refinement(CommitPhase::PointerDown, descriptor, edited)
                .map(|r| self.refinement_task(r)),
            InputEvent::MouseUp(_) | InputEvent::TouchEnd(_) => self
                .shared
                .snapping
                .borrow()
                .begin_refinement(CommitPhase::PointerUp, descriptor, edited)
                .map(|r| self.refinement_task(r)),
            _ => None,
        }
    }

    fn lookup_task(&self, lookup: SnapLookup) -> DrawTask {
        let shared = self.shared.clone();
        DrawTask::new(TaskKind::SnapLookup, async move {
            resolve_lookup(&shared, &lookup).await;
            Ok(Vec::new())
        })
    }

    fn refinement_task(&self, refinement: Refinement) -> DrawTask {
        let shared = self.shared.clone();
        let controller = self.controller.clone();
        DrawTask::new(TaskKind::SnapRefinement, async move {
            let closest = shared
                .services
                .get_closest_point(&refinement.target_id, refinement.approx)
                .await;
            let point = match closest {
                Ok(Some(point)) => point,
                Ok(None) => {
                    log::debug!("No closest point on {}", refinement.target_id);
                    return Ok(Vec::new());
                }
                Err(err) => {
                    log::warn!("Closest point on {} failed: {}", refinement.target_id, err);
                    return Ok(Vec::new());
                }
            };
            let changed = refinement.apply(&mut shared.store.borrow_mut(), point);
            if changed {
                controller.borrow_mut().render();
            }
            Ok(Vec::new())
        })
    }

    fn setup_tasks(&self, setups: Vec<PendingSetup>) -> Vec<DrawTask> {
        setups.into_iter().map(|s| self.setup_task(s)).collect()
    }

    fn setup_task(&self, setup: PendingSetup) -> DrawTask {
        let session = self.clone();
        DrawTask::new(TaskKind::ModeSetup, async move {
            let PendingSetup {
                generation,
                mode,
                future,
            } = setup;
            let result = future.await;
            log::debug!("Setup of {} finished", mode);
            let queued = session
                .controller
                .borrow_mut()
                .complete_setup(generation, result)?;
            let mut tasks = Vec::new();
            for event in &queued {
                tasks.extend(session.handle(event)?.tasks);
            }
            Ok(tasks)
        })
    }

    pub fn change_mode(&self, name: &str, options: ModeOptions) -> DrawResult<Vec<DrawTask>> {
        let setups = self.controller.borrow_mut().change_mode(name, options)?;
        self.shared.snapping.borrow_mut().reset();
        Ok(self.setup_tasks(setups))
    }

    pub fn current_mode(&self) -> Option<String> {
        self.controller.borrow().current_mode().map(str::to_string)
    }

    /// Whether the active mode is waiting on its async setup.
    pub fn is_pending(&self) -> bool {
        self.controller.borrow().is_pending()
    }

    pub fn trash(&self) -> DrawResult<Vec<DrawTask>> {
        let setups = self.controller.borrow_mut().trash()?;
        Ok(self.setup_tasks(setups))
    }

    pub fn combine_features(&self) -> DrawResult<Vec<DrawTask>> {
        let setups = self.controller.borrow_mut().combine_features()?;
        Ok(self.setup_tasks(setups))
    }

    pub fn uncombine_features(&self) -> DrawResult<Vec<DrawTask>> {
        let setups = self.controller.borrow_mut().uncombine_features()?;
        Ok(self.setup_tasks(setups))
    }

    /// Override actionable flags by name.
    pub fn actionable<'a>(&self, flags: impl IntoIterator<Item = (&'a str, bool)>) -> DrawResult<()> {
        let delta = ActionableDelta::from_pairs(flags)?;
        self.controller.borrow_mut().actionable(delta);
        Ok(())
    }

    pub fn actionable_state(&self) -> ActionableState {
        self.controller.borrow().actionable_state()
    }

    /// Add a feature to the store. Returns its id.
    pub fn add(&self, feature: Feature) -> FeatureId {
        let id = self.shared.store.borrow_mut().add(feature);
        self.controller.borrow_mut().render();
        id
    }

    pub fn get(&self, id: &FeatureId) -> Option<Feature> {
        self.shared.store.borrow().export(id)
    }

    pub fn get_all(&self) -> Vec<Feature> {
        self.shared.store.borrow().get_all()
    }

    /// Remove features without emitting a notification.
    pub fn delete(&self, ids: &[FeatureId]) -> Vec<Feature> {
        let deleted = self.shared.store.borrow_mut().delete(ids);
        self.controller.borrow_mut().render();
        deleted
    }

    pub fn selected_ids(&self) -> Vec<FeatureId> {
        self.shared.store.borrow().selected_ids()
    }

    pub fn enable_snapping(&self) {
        self.shared.snapping.borrow_mut().enable_snapping();
    }

    pub fn disable_snapping(&self) {
        self.shared.snapping.borrow_mut().disable_snapping();
    }

    pub fn set_snap_layers(&self, layer_ids: Vec<String>) {
        self.shared
            .snapping
            .borrow_mut()
            .set_snap_layers(SnapLayers::List(layer_ids));
    }

    pub fn set_snap_layer_predicate(&self, predicate: SnapLayerPredicate) {
        self.shared
            .snapping
            .borrow_mut()
            .set_snap_layers(SnapLayers::Predicate(predicate));
    }

    pub fn refresh_snap_layers(&self) {
        self.shared.snapping.borrow_mut().refresh_snap_layers();
    }

    pub fn set_snap_to_selected(&self, value: bool) {
        self.shared.snapping.borrow_mut().set_snap_to_selected(value);
    }

    pub fn set_candidate_filter(&self, filter: Option<CandidateFilter>) {
        self.shared.snapping.borrow_mut().set_candidate_filter(filter);
    }

    pub fn clear_snap_coord(&self) {
        self.shared.snapping.borrow().clear_snap_coord();
    }

    pub fn cursor_is_snapped(&self) -> bool {
        self.shared.snapping.borrow().cursor_is_snapped()
    }

    /// Notifications emitted since the last drain, oldest first.
    pub fn drain_events(&self) -> Vec<DrawEvent> {
        self.shared.notifier.drain()
    }
}
