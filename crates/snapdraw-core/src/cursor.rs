//! Cursor selection for the map canvas.

use crate::host::{MapHost, QueryArea, RenderedFeature};
use crate::input::PointerEvent;
use kurbo::{Rect, Vec2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

/// Cursor tokens applied to the map canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cursor {
    #[default]
    None,
    Pointer,
    Grab,
    Grabbing,
    Add,
    Move,
}

impl Cursor {
    pub fn as_str(self) -> &'static str {
        match self {
            Cursor::None => "none",
            Cursor::Pointer => "pointer",
            Cursor::Grab => "grab",
            Cursor::Grabbing => "grabbing",
            Cursor::Add => "add",
            Cursor::Move => "move",
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Facts about what the pointer is currently over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HoverFacts {
    /// The last snap computation produced a snapped coordinate.
    pub snapped: bool,
    /// The top draw feature under the pointer is selected.
    pub is_over_selected: bool,
    /// Any rendered feature (draw or map) is under the pointer.
    pub over_features: bool,
}

/// Maps hover facts to a cursor; `None` hides the cursor.
pub type CursorLogic = Rc<dyn Fn(&HoverFacts) -> Option<Cursor>>;

/// Resolves the cursor from an optional override, the active mode's logic,
/// and a default.
#[derive(Clone, Default)]
pub struct CursorPolicy {
    logic: Option<CursorLogic>,
    override_logic: Option<CursorLogic>,
}

impl fmt::Debug for CursorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorPolicy")
            .field("logic", &self.logic.is_some())
            .field("override_logic", &self.override_logic.is_some())
            .finish()
    }
}

impl CursorPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or clear) the mode-level cursor logic.
    pub fn set_cursor_logic(&mut self, logic: Option<CursorLogic>) {
        self.logic = logic;
    }

    /// Install (or clear) logic that wins over the mode-level logic.
    pub fn override_cursor_logic(&mut self, logic: Option<CursorLogic>) {
        self.override_logic = logic;
    }

    pub fn has_override(&self) -> bool {
        self.override_logic.is_some()
    }

    /// Pick the cursor for the given facts.
    pub fn resolve(&self, facts: &HoverFacts) -> Cursor {
        match self.override_logic.as_ref().or(self.logic.as_ref()) {
            Some(logic) => logic(facts).unwrap_or(Cursor::None),
            None if facts.over_features => Cursor::Pointer,
            None => Cursor::Grab,
        }
    }

    /// Hit-test the draw layers, apply the resulting cursor to the host and
    /// return the top draw feature under the pointer.
    pub fn resolve_cursor(
        &self,
        host: &dyn MapHost,
        event: &PointerEvent,
        dragging: bool,
        snapped: bool,
        draw_layers: &[String],
        buffer_px: f64,
    ) -> Option<RenderedFeature> {
        let half = Vec2::new(buffer_px, buffer_px);
        let area = QueryArea::Box(Rect::from_points(event.point - half, event.point + half));
        let target = host
            .query_rendered_features(area, Some(draw_layers))
            .into_iter()
            .next();

        if dragging {
            host.set_cursor(Cursor::Grabbing);
            return target;
        }

        let over_map_features = host
            .query_rendered_features(QueryArea::Point(event.point), None)
            .iter()
            .any(|f| !f.layer_id.contains("_snap_"));
        let is_over_selected = target
            .as_ref()
            .and_then(|f| f.properties.get("active"))
            .and_then(|v| v.as_str())
            == Some("true");
        let facts = HoverFacts {
            snapped,
            is_over_selected,
            over_features: target.is_some() || over_map_features,
        };
        host.set_cursor(self.resolve(&facts));
        target
    }
}
