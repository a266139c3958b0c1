//! Snapdraw Core Library
//!
//! Map-agnostic drawing logic: gesture classification, interaction modes and
//! snapping onto rendered map geometry. The map and the geometry backend are
//! reached through the [`MapHost`] and [`GeometryService`] traits.

pub mod actionable;
pub mod config;
pub mod cursor;
pub mod display;
pub mod error;
pub mod events;
pub mod geo;
pub mod gesture;
pub mod host;
pub mod input;
pub mod modes;
pub mod session;
pub mod snap;
pub mod store;

pub use actionable::{ActionableDelta, ActionableState};
pub use config::{DRAW_SOURCE, DrawOptions, GestureOptions, SnapOptions};
pub use cursor::{Cursor, CursorPolicy, HoverFacts};
pub use error::{DrawError, DrawResult};
pub use events::{CoincidentLine, DrawEvent, UpdateAction};
pub use geo::{Feature, FeatureId, Geometry, GeometryKind, LngLat};
pub use gesture::{GestureThresholds, PointerSample, is_click, is_tap};
pub use host::{
    BoxFuture, FeatureRef, GeometryService, LayerKind, LayerSpec, MapHost, MemoryGeometryService,
    MemoryHost, QueryArea, RenderedFeature, ServiceError, Viewport,
};
pub use input::{EventOutcome, InputEvent, Key, KeyEvent, Modifiers, PointerEvent};
pub use modes::{Mode, ModeContext, ModeController, ModeDescriptor, ModeOptions, ModeRegistry};
pub use session::{DrawSession, DrawTask, Handled, TaskKind, run_tasks};
pub use snap::{SnapEngine, SnapLayers, SnappedCoord};
pub use store::{CoordPath, FeatureStore};
