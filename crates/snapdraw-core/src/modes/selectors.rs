//! Predicates over hit-tested pointer events and keys.

use crate::display::handle_target;
use crate::geo::FeatureId;
use crate::input::{Key, KeyEvent, PointerEvent};
use crate::store::CoordPath;

fn meta_is(e: &PointerEvent, meta: &str) -> bool {
    e.target_meta() == Some(meta)
}

/// The pointer is over a draw feature (not a handle).
pub fn is_feature(e: &PointerEvent) -> bool {
    meta_is(e, "feature")
}

pub fn is_vertex(e: &PointerEvent) -> bool {
    meta_is(e, "vertex")
}

pub fn is_midpoint(e: &PointerEvent) -> bool {
    meta_is(e, "midpoint")
}

pub fn is_active_feature(e: &PointerEvent) -> bool {
    is_feature(e) && e.target_is_active()
}

pub fn is_inactive_feature(e: &PointerEvent) -> bool {
    is_feature(e) && !e.target_is_active()
}

/// Nothing drawn is under the pointer.
pub fn no_target(e: &PointerEvent) -> bool {
    e.feature_target.is_none()
}

pub fn is_shift_down(e: &PointerEvent) -> bool {
    e.modifiers.shift
}

/// Id of the draw feature under the pointer.
pub fn target_feature_id(e: &PointerEvent) -> Option<FeatureId> {
    if !is_feature(e) {
        return None;
    }
    e.feature_target.as_ref()?.id.clone()
}

/// Parent and path of the vertex or midpoint handle under the pointer.
pub fn target_handle(e: &PointerEvent) -> Option<(FeatureId, CoordPath)> {
    if !(is_vertex(e) || is_midpoint(e)) {
        return None;
    }
    handle_target(&e.feature_target.as_ref()?.properties)
}

pub fn is_escape(e: &KeyEvent) -> bool {
    e.key == Key::Escape
}

pub fn is_enter(e: &KeyEvent) -> bool {
    e.key == Key::Enter
}
