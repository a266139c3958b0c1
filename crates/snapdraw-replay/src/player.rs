//! Drives a [`DrawSession`] through the steps of a scenario.

use snapdraw_core::{
    DrawSession, DrawTask, InputEvent, Key, KeyEvent, MapHost, MemoryGeometryService, MemoryHost,
    PointerEvent, run_tasks,
};
use std::io::Write;
use std::rc::Rc;

use crate::error::ReplayResult;
use crate::scenario::{PointerStep, Scenario, Step};

/// Replays a scenario against an in-memory host and geometry service.
pub struct Player {
    host: Rc<MemoryHost>,
    service: Rc<MemoryGeometryService>,
    session: DrawSession,
}

impl Player {
    /// Build the host, the service and the session from a scenario's setup
    /// fields. The session is not started yet.
    pub fn new(scenario: &Scenario) -> ReplayResult<Self> {
        let host = Rc::new(MemoryHost::with_viewport(scenario.viewport));
        for (key, features) in &scenario.sources {
            // "source/source-layer" addresses a vector tile layer.
            let (source, source_layer) = match key.split_once('/') {
                Some((source, layer)) => (source, Some(layer)),
                None => (key.as_str(), None),
            };
            host.set_source_layer_data(source, source_layer, features.clone());
        }
        for layer in &scenario.layers {
            host.add_layer(layer.clone());
        }

        let service = Rc::new(MemoryGeometryService::new(
            scenario.options.snapping.id_property.clone(),
        ));
        for (id, geometry) in &scenario.snap_geometries {
            service.insert_snap_geometry(id.clone(), geometry.clone());
        }
        for (id, geometry) in &scenario.source_geometries {
            service.insert_source_geometry(id.clone(), geometry.clone());
        }

        let session = DrawSession::new(host.clone(), service.clone(), scenario.options.clone())?;
        Ok(Self {
            host,
            service,
            session,
        })
    }

    pub fn session(&self) -> &DrawSession {
        &self.session
    }

    pub fn host(&self) -> &MemoryHost {
        &self.host
    }

    /// Number of requests the geometry service has answered.
    pub fn service_requests(&self) -> usize {
        self.service.request_count()
    }

    /// Start the session, then apply every step in order, writing emitted
    /// notifications to `out` as JSON lines. Returns the number of lines.
    pub fn run<W: Write>(&self, steps: &[Step], out: &mut W) -> ReplayResult<usize> {
        let tasks = self.session.start()?;
        Self::finish(tasks)?;
        let mut written = self.flush(out)?;
        for (i, step) in steps.iter().enumerate() {
            log::debug!("Step {}: {:?}", i, step);
            self.step(step)?;
            written += self.flush(out)?;
        }
        Ok(written)
    }

    /// Apply one step and wait for the work it started.
    pub fn step(&self, step: &Step) -> ReplayResult<()> {
        let tasks = match step {
            Step::MouseMove(p) => self.input(InputEvent::MouseMove(self.pointer(p)))?,
            Step::MouseDown(p) => self.input(InputEvent::MouseDown(self.pointer(p)))?,
            Step::MouseUp(p) => self.input(InputEvent::MouseUp(self.pointer(p)))?,
            Step::DblClick(p) => self.input(InputEvent::DblClick(self.pointer(p)))?,
            Step::KeyDown { key } => {
                self.input(InputEvent::KeyDown(KeyEvent::new(Key::from_name(key))))?
            }
            Step::KeyUp { key } => self.input(InputEvent::KeyUp(KeyEvent::new(Key::from_name(key))))?,
            Step::MouseOut(p) => self.input(InputEvent::MouseOut(self.pointer(p)))?,
            Step::Wait { time_ms } => self.session.flush_snap_sample(*time_ms),
            Step::ChangeMode { mode, options } => self.session.change_mode(mode, options.clone())?,
            Step::EnableSnapping => {
                self.session.enable_snapping();
                Vec::new()
            }
            Step::DisableSnapping => {
                self.session.disable_snapping();
                Vec::new()
            }
        };
        Self::finish(tasks)
    }

    fn input(&self, event: InputEvent) -> ReplayResult<Vec<DrawTask>> {
        Ok(self.session.handle(&event)?.tasks)
    }

    fn pointer(&self, step: &PointerStep) -> PointerEvent {
        PointerEvent::new(self.host.project(step.at), step.at, step.time_ms)
            .with_primary_held(step.primary_held)
            .with_modifiers(step.modifiers)
    }

    fn finish(tasks: Vec<DrawTask>) -> ReplayResult<()> {
        if !tasks.is_empty() {
            pollster::block_on(run_tasks(tasks))?;
        }
        Ok(())
    }

    fn flush<W: Write>(&self, out: &mut W) -> ReplayResult<usize> {
        let events = self.session.drain_events();
        for event in &events {
            serde_json::to_writer(&mut *out, event)?;
            writeln!(out)?;
        }
        Ok(events.len())
    }
}
