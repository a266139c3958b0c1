//! Interaction modes.
//!
//! A mode is a state machine that receives classified input from the
//! [`ModeController`]. Modes are created by factories registered under a
//! name in a [`ModeRegistry`] together with a [`ModeDescriptor`] that tells
//! the controller and the snap engine how the mode behaves.

mod coincident_select;
mod context;
mod controller;
mod direct_select;
mod draw_freehand;
mod draw_line_string;
mod draw_point;
mod draw_polygon;
mod marquee;
pub mod selectors;
mod simple_select;
mod split;
mod static_mode;

pub use coincident_select::{CoincidentSelect, CoincidentVertex, adjacent_line_data};
pub use context::{ModeContext, Shared};
pub use controller::{Dispatched, ModeController, PendingSetup};
pub use direct_select::DirectSelect;
pub use draw_freehand::DrawFreehand;
pub use draw_line_string::DrawLineString;
pub use draw_point::DrawPoint;
pub use draw_polygon::DrawPolygon;
pub use marquee::Marquee;
pub use simple_select::SimpleSelect;
pub use split::{SPLIT_VERTICES, Split};
pub use static_mode::StaticMode;

use crate::error::DrawResult;
use crate::geo::{Feature, FeatureId, LngLat};
use crate::host::BoxFuture;
use crate::input::{KeyEvent, PointerEvent};
use crate::store::CoordPath;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

pub const STATIC: &str = "static";
pub const SIMPLE_SELECT: &str = "simple_select";
pub const DIRECT_SELECT: &str = "direct_select";
pub const DRAW_POINT: &str = "draw_point";
pub const DRAW_LINE_STRING: &str = "draw_line_string";
pub const DRAW_POLYGON: &str = "draw_polygon";
pub const SPLIT: &str = "split";
pub const MARQUEE: &str = "marquee";
pub const DRAW_FREEHAND: &str = "draw_freehand";
pub const COINCIDENT_SELECT: &str = "coincident_select";

/// Broad behavior class of a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeClass {
    /// Receives no input.
    Static,
    /// Box selection; mouse releases never become clicks.
    GroupSelect,
    /// Freehand tracing; no snapping.
    FreeDraw,
    Select,
    Draw,
}

/// What kind of geometry a mode places or moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditTarget {
    None,
    Point,
    Line,
}

/// Pointer phase at which a mode commits a coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPhase {
    PointerDown,
    PointerUp,
}

/// Static facts about a registered mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeDescriptor {
    pub class: ModeClass,
    pub edits: EditTarget,
    pub commit: Option<CommitPhase>,
}

impl ModeDescriptor {
    pub const fn new(class: ModeClass, edits: EditTarget, commit: Option<CommitPhase>) -> Self {
        Self {
            class,
            edits,
            commit,
        }
    }
}

/// Predicate narrowing which features a mode may act on.
pub type FeatureFilter = Rc<dyn Fn(&Feature) -> bool>;

/// Options passed to a mode factory.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeOptions {
    /// Features to select on entry.
    pub feature_ids: Vec<FeatureId>,
    /// Feature to edit.
    pub feature_id: Option<FeatureId>,
    /// Vertex to select on entry.
    pub coord_path: Option<CoordPath>,
    /// Re-enter the same draw mode after finishing.
    pub redraw: bool,
    pub previous_feature_id: Option<FeatureId>,
    /// Keep drawing further features after one is finished.
    pub multiple: bool,
    /// Line end to continue drawing from.
    pub from: Option<LngLat>,
    #[serde(skip)]
    pub feature_filter: Option<FeatureFilter>,
}

impl fmt::Debug for ModeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModeOptions")
            .field("feature_ids", &self.feature_ids)
            .field("feature_id", &self.feature_id)
            .field("coord_path", &self.coord_path)
            .field("redraw", &self.redraw)
            .field("previous_feature_id", &self.previous_feature_id)
            .field("multiple", &self.multiple)
            .field("from", &self.from)
            .field("feature_filter", &self.feature_filter.is_some())
            .finish()
    }
}

impl ModeOptions {
    pub fn select(ids: Vec<FeatureId>) -> Self {
        Self {
            feature_ids: ids,
            ..Default::default()
        }
    }

    pub fn feature(id: FeatureId) -> Self {
        Self {
            feature_id: Some(id),
            ..Default::default()
        }
    }

    /// Whether the feature filter, if any, admits `feature`.
    pub fn admits(&self, feature: &Feature) -> bool {
        self.feature_filter.as_ref().is_none_or(|f| f(feature))
    }
}

/// An interaction mode. Every callback defaults to doing nothing.
pub trait Mode {
    /// Called once when the mode is left.
    fn on_stop(&mut self, _ctx: &mut ModeContext<'_>) -> DrawResult<()> {
        Ok(())
    }

    fn on_mouse_down(&mut self, _ctx: &mut ModeContext<'_>, _e: &PointerEvent) -> DrawResult<()> {
        Ok(())
    }

    fn on_mouse_move(&mut self, _ctx: &mut ModeContext<'_>, _e: &PointerEvent) -> DrawResult<()> {
        Ok(())
    }

    fn on_mouse_up(&mut self, _ctx: &mut ModeContext<'_>, _e: &PointerEvent) -> DrawResult<()> {
        Ok(())
    }

    fn on_mouse_out(&mut self, _ctx: &mut ModeContext<'_>, _e: &PointerEvent) -> DrawResult<()> {
        Ok(())
    }

    fn on_touch_start(&mut self, _ctx: &mut ModeContext<'_>, _e: &PointerEvent) -> DrawResult<()> {
        Ok(())
    }

    fn on_touch_move(&mut self, _ctx: &mut ModeContext<'_>, _e: &PointerEvent) -> DrawResult<()> {
        Ok(())
    }

    fn on_touch_end(&mut self, _ctx: &mut ModeContext<'_>, _e: &PointerEvent) -> DrawResult<()> {
        Ok(())
    }

    fn on_click(&mut self, _ctx: &mut ModeContext<'_>, _e: &PointerEvent) -> DrawResult<()> {
        Ok(())
    }

    fn on_tap(&mut self, _ctx: &mut ModeContext<'_>, _e: &PointerEvent) -> DrawResult<()> {
        Ok(())
    }

    fn on_dbl_click(&mut self, _ctx: &mut ModeContext<'_>, _e: &PointerEvent) -> DrawResult<()> {
        Ok(())
    }

    /// Pointer moved with the button held past the click tolerance.
    fn on_drag(&mut self, _ctx: &mut ModeContext<'_>, _e: &PointerEvent) -> DrawResult<()> {
        Ok(())
    }

    fn on_key_up(&mut self, _ctx: &mut ModeContext<'_>, _e: &KeyEvent) -> DrawResult<()> {
        Ok(())
    }

    fn on_trash(&mut self, _ctx: &mut ModeContext<'_>) -> DrawResult<()> {
        Ok(())
    }

    fn on_combine_features(&mut self, _ctx: &mut ModeContext<'_>) -> DrawResult<()> {
        Ok(())
    }

    fn on_uncombine_features(&mut self, _ctx: &mut ModeContext<'_>) -> DrawResult<()> {
        Ok(())
    }

    /// Features to render for `feature`. Handles and markers are added here.
    fn to_display_features(&self, feature: Feature, push: &mut dyn FnMut(Feature)) {
        push(feature);
    }

    /// Feature that receives the coordinate committed by the current gesture.
    fn edited_feature(&self) -> Option<FeatureId> {
        None
    }
}

/// Result of a mode factory.
pub enum ModeSetup {
    Ready(Box<dyn Mode>),
    /// Setup must wait on a service before the mode can take input.
    Pending(BoxFuture<'static, DrawResult<Box<dyn Mode>>>),
}

impl fmt::Debug for ModeSetup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModeSetup::Ready(_) => f.write_str("Ready(..)"),
            ModeSetup::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// Creates a mode when it is entered.
pub type ModeFactory = Rc<dyn Fn(&mut ModeContext<'_>, &ModeOptions) -> DrawResult<ModeSetup>>;

#[derive(Clone)]
pub struct ModeRegistration {
    pub descriptor: ModeDescriptor,
    pub factory: ModeFactory,
}

/// Named mode factories.
#[derive(Clone, Default)]
pub struct ModeRegistry {
    modes: BTreeMap<String, ModeRegistration>,
}

impl fmt::Debug for ModeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.modes.keys()).finish()
    }
}

impl ModeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in mode.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(STATIC, StaticMode::DESCRIPTOR, StaticMode::setup);
        registry.register(SIMPLE_SELECT, SimpleSelect::DESCRIPTOR, SimpleSelect::setup);
        registry.register(DIRECT_SELECT, DirectSelect::DESCRIPTOR, DirectSelect::setup);
        registry.register(DRAW_POINT, DrawPoint::DESCRIPTOR, DrawPoint::setup);
        registry.register(DRAW_LINE_STRING, DrawLineString::DESCRIPTOR, DrawLineString::setup);
        registry.register(DRAW_POLYGON, DrawPolygon::DESCRIPTOR, DrawPolygon::setup);
        registry.register(SPLIT, Split::DESCRIPTOR, Split::setup);
        registry.register(MARQUEE, Marquee::DESCRIPTOR, Marquee::setup);
        registry.register(DRAW_FREEHAND, DrawFreehand::DESCRIPTOR, DrawFreehand::setup);
        registry.register(
            COINCIDENT_SELECT,
            CoincidentSelect::DESCRIPTOR,
            CoincidentSelect::setup,
        );
        registry
    }

    /// Register a mode, replacing any mode of the same name.
    pub fn register<F>(&mut self, name: &str, descriptor: ModeDescriptor, factory: F)
    where
        F: Fn(&mut ModeContext<'_>, &ModeOptions) -> DrawResult<ModeSetup> + 'static,
    {
        self.modes.insert(
            name.to_string(),
            ModeRegistration {
                descriptor,
                factory: Rc::new(factory),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&ModeRegistration> {
        self.modes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modes.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.modes.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry() {
        let registry = ModeRegistry::with_builtin();
        assert_eq!(registry.names().len(), 10);
        let polygon = registry.get(DRAW_POLYGON).unwrap().descriptor;
        assert_eq!(polygon.class, ModeClass::Draw);
        assert_eq!(polygon.edits, EditTarget::Line);
        assert_eq!(polygon.commit, Some(CommitPhase::PointerDown));
        assert_eq!(registry.get(MARQUEE).unwrap().descriptor.class, ModeClass::GroupSelect);
        let coincident = registry.get(COINCIDENT_SELECT).unwrap().descriptor;
        assert_eq!(coincident, CoincidentSelect::DESCRIPTOR);
        assert_eq!(coincident.edits, EditTarget::Point);
        assert!(!registry.contains("lasso"));
    }

    #[test]
    fn test_options_from_json() {
        let options: ModeOptions =
            serde_json::from_str(r#"{"feature_id": "a", "coord_path": "0.2", "from": [1.0, 2.0]}"#)
                .unwrap();
        assert_eq!(options.feature_id, Some(FeatureId::from("a")));
        assert_eq!(options.coord_path, Some(CoordPath::new(vec![0, 2])));
        assert_eq!(options.from, Some(LngLat::new(1.0, 2.0)));
        assert!(options.feature_ids.is_empty());
        assert!(options.admits(&Feature::new("x", crate::geo::Geometry::Point(LngLat::default()))));
    }
}
