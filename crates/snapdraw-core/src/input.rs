//! Input event model for mouse/touch/keyboard events.

use crate::geo::LngLat;
use crate::gesture::PointerSample;
use crate::host::RenderedFeature;
use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Modifier keys state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

/// A pointer sample from mouse or touch input.
#[derive(Debug, Clone, PartialEq)]
pub struct PointerEvent {
    /// Pixel position relative to the map canvas.
    pub point: Point,
    /// Geographic position under the pointer.
    pub lng_lat: LngLat,
    /// Event timestamp in milliseconds.
    pub time_ms: u64,
    /// Whether the primary button is held (mouse move only).
    pub primary_held: bool,
    pub modifiers: Modifiers,
    /// Draw feature hit by the controller before delegating, if any.
    pub feature_target: Option<RenderedFeature>,
}

impl PointerEvent {
    /// Create a pointer event with no buttons or modifiers.
    pub fn new(point: Point, lng_lat: LngLat, time_ms: u64) -> Self {
        Self {
            point,
            lng_lat,
            time_ms,
            primary_held: false,
            modifiers: Modifiers::default(),
            feature_target: None,
        }
    }

    pub fn with_primary_held(mut self, held: bool) -> Self {
        self.primary_held = held;
        self
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// The timing/position sample used for gesture classification.
    pub fn sample(&self) -> PointerSample {
        PointerSample::new(self.time_ms, self.point)
    }

    /// Meta property of the hit draw feature (`feature`, `vertex`, `midpoint`).
    pub fn target_meta(&self) -> Option<&str> {
        self.feature_target
            .as_ref()
            .and_then(|f| f.properties.get("meta"))
            .and_then(|v| v.as_str())
    }

    /// Whether the hit draw feature is an active (selected) one.
    pub fn target_is_active(&self) -> bool {
        self.feature_target
            .as_ref()
            .and_then(|f| f.properties.get("active"))
            .and_then(|v| v.as_str())
            == Some("true")
    }
}

/// Keys the drawing core cares about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    Backspace,
    Delete,
    Escape,
    Enter,
    Other(String),
}

impl Key {
    /// Parse a DOM-style key name.
    pub fn from_name(name: &str) -> Self {
        match name {
            "Backspace" => Key::Backspace,
            "Delete" => Key::Delete,
            "Escape" | "Esc" => Key::Escape,
            "Enter" | "Return" => Key::Enter,
            other => Key::Other(other.to_string()),
        }
    }

    /// Backspace and Delete trigger the trash action.
    pub fn is_trash(&self) -> bool {
        matches!(self, Key::Backspace | Key::Delete)
    }
}

/// A keyboard event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    /// Whether the event targets the map surface (rather than a form field).
    pub on_map_surface: bool,
}

impl KeyEvent {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            on_map_surface: true,
        }
    }
}

/// A low-level event delivered to the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    MouseDown(PointerEvent),
    MouseMove(PointerEvent),
    MouseUp(PointerEvent),
    MouseOut(PointerEvent),
    TouchStart(PointerEvent),
    TouchMove(PointerEvent),
    TouchEnd(PointerEvent),
    DblClick(PointerEvent),
    KeyDown(KeyEvent),
    KeyUp(KeyEvent),
    /// The host style finished (re)loading.
    StyleData,
}

impl InputEvent {
    /// The pointer payload, if this is a pointer event.
    pub fn pointer(&self) -> Option<&PointerEvent> {
        match self {
            InputEvent::MouseDown(e)
            | InputEvent::MouseMove(e)
            | InputEvent::MouseUp(e)
            | InputEvent::MouseOut(e)
            | InputEvent::TouchStart(e)
            | InputEvent::TouchMove(e)
            | InputEvent::TouchEnd(e)
            | InputEvent::DblClick(e) => Some(e),
            InputEvent::KeyDown(_) | InputEvent::KeyUp(_) | InputEvent::StyleData => None,
        }
    }

    /// Short event name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            InputEvent::MouseDown(_) => "mousedown",
            InputEvent::MouseMove(_) => "mousemove",
            InputEvent::MouseUp(_) => "mouseup",
            InputEvent::MouseOut(_) => "mouseout",
            InputEvent::TouchStart(_) => "touchstart",
            InputEvent::TouchMove(_) => "touchmove",
            InputEvent::TouchEnd(_) => "touchend",
            InputEvent::DblClick(_) => "dblclick",
            InputEvent::KeyDown(_) => "keydown",
            InputEvent::KeyUp(_) => "keyup",
            InputEvent::StyleData => "styledata",
        }
    }
}

/// What the host should do with the native event after dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventOutcome {
    pub stop_propagation: bool,
    pub prevent_default: bool,
}

impl EventOutcome {
    /// Combine two outcomes, keeping any flag set by either.
    pub fn merge(self, other: EventOutcome) -> Self {
        Self {
            stop_propagation: self.stop_propagation || other.stop_propagation,
            prevent_default: self.prevent_default || other.prevent_default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_from_name() {
        assert_eq!(Key::from_name("Backspace"), Key::Backspace);
        assert_eq!(Key::from_name("Escape"), Key::Escape);
        assert_eq!(Key::from_name("Enter"), Key::Enter);
        assert_eq!(Key::from_name("a"), Key::Other("a".to_string()));
        assert!(Key::Delete.is_trash());
        assert!(!Key::Escape.is_trash());
    }

    #[test]
    fn test_outcome_merge() {
        let a = EventOutcome {
            stop_propagation: true,
            prevent_default: false,
        };
        let b = EventOutcome {
            stop_propagation: false,
            prevent_default: true,
        };
        let merged = a.merge(b);
        assert!(merged.stop_propagation);
        assert!(merged.prevent_default);
    }

    #[test]
    fn test_pointer_accessor() {
        let e = PointerEvent::new(Point::new(1.0, 2.0), LngLat::new(0.0, 0.0), 5);
        assert_eq!(InputEvent::MouseDown(e.clone()).pointer(), Some(&e));
        assert!(InputEvent::StyleData.pointer().is_none());
        assert_eq!(e.sample(), PointerSample::new(5, Point::new(1.0, 2.0)));
    }
}
