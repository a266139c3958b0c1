//! Drawing configuration.

use crate::error::{DrawError, DrawResult};
use crate::gesture::GestureThresholds;
use crate::host::{LayerKind, LayerSpec};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Source that holds the draw features.
pub const DRAW_SOURCE: &str = "snapdraw";

/// Click and tap tolerances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureOptions {
    pub click: GestureThresholds,
    pub tap: GestureThresholds,
}

impl Default for GestureOptions {
    fn default() -> Self {
        Self {
            click: GestureThresholds::CLICK,
            tap: GestureThresholds::TAP,
        }
    }
}

/// Snapping behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapOptions {
    /// Enable snapping when the session starts.
    pub enabled: bool,
    /// Capture distance in pixels.
    pub snap_distance_px: f64,
    /// A vertex wins over the nearest point on a curve when it is closer
    /// than this many times the nearest-point distance.
    pub vertex_pull_factor: f64,
    /// Minimum spacing between candidate searches.
    pub throttle_ms: u64,
    /// Property holding the authoritative feature id.
    pub id_property: String,
    /// Snappable layer ids.
    pub layers: Vec<String>,
}

impl Default for SnapOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            snap_distance_px: 15.0,
            vertex_pull_factor: std::f64::consts::SQRT_2,
            throttle_ms: 16,
            id_property: "id".to_string(),
            layers: Vec::new(),
        }
    }
}

/// Options for a drawing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawOptions {
    pub default_mode: String,
    pub touch_enabled: bool,
    pub keybindings: bool,
    pub trash_control: bool,
    /// Half-size of the hit box around mouse events.
    pub click_buffer_px: f64,
    /// Half-size of the hit box around touch events.
    pub touch_buffer_px: f64,
    pub gestures: GestureOptions,
    pub snapping: SnapOptions,
    /// Layers rendering the draw source.
    pub styles: Vec<LayerSpec>,
}

impl Default for DrawOptions {
    fn default() -> Self {
        Self {
            default_mode: "simple_select".to_string(),
            touch_enabled: true,
            keybindings: true,
            trash_control: true,
            click_buffer_px: 2.0,
            touch_buffer_px: 25.0,
            gestures: GestureOptions::default(),
            snapping: SnapOptions::default(),
            styles: default_styles(),
        }
    }
}

impl DrawOptions {
    /// Ids of the draw layers.
    pub fn draw_layer_ids(&self) -> Vec<String> {
        self.styles.iter().map(|l| l.id.clone()).collect()
    }

    /// Reject values that cannot work.
    pub fn validate(&self) -> DrawResult<()> {
        if self.click_buffer_px < 0.0 || self.touch_buffer_px < 0.0 {
            return Err(DrawError::InvalidOption(
                "hit buffers must not be negative".to_string(),
            ));
        }
        if self.snapping.snap_distance_px <= 0.0 {
            return Err(DrawError::InvalidOption(
                "snap_distance_px must be positive".to_string(),
            ));
        }
        if self.snapping.vertex_pull_factor < 1.0 {
            return Err(DrawError::InvalidOption(
                "vertex_pull_factor must be at least 1".to_string(),
            ));
        }
        if self.styles.iter().any(|l| l.source != DRAW_SOURCE) {
            return Err(DrawError::InvalidOption(format!(
                "draw layers must use the {DRAW_SOURCE} source"
            )));
        }
        Ok(())
    }
}

fn draw_layer(id: &str, kind: LayerKind, filter: Value, paint: Value) -> LayerSpec {
    let paint = match paint {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    LayerSpec {
        id: id.to_string(),
        kind,
        source: DRAW_SOURCE.to_string(),
        source_layer: None,
        filter: Some(filter),
        paint,
    }
}

/// Default draw layers, bottom to top.
pub fn default_styles() -> Vec<LayerSpec> {
    vec![
        draw_layer(
            "snapdraw-polygon-fill",
            LayerKind::Fill,
            json!(["all", ["==", "$type", "Polygon"], ["==", "meta", "feature"]]),
            json!({"fill-color": "#3bb2d0", "fill-opacity": 0.1}),
        ),
        draw_layer(
            "snapdraw-line",
            LayerKind::Line,
            json!(["all", ["in", "$type", "LineString", "Polygon"], ["==", "meta", "feature"]]),
            json!({"line-color": "#3bb2d0", "line-width": 2.0}),
        ),
        draw_layer(
            "snapdraw-point",
            LayerKind::Circle,
            json!(["all", ["==", "$type", "Point"], ["==", "meta", "feature"]]),
            json!({"circle-color": "#3bb2d0", "circle-radius": 5.0}),
        ),
        draw_layer(
            "snapdraw-midpoint",
            LayerKind::Circle,
            json!(["==", "meta", "midpoint"]),
            json!({"circle-color": "#fbb03b", "circle-radius": 3.0}),
        ),
        draw_layer(
            "snapdraw-vertex",
            LayerKind::Circle,
            json!(["==", "meta", "vertex"]),
            json!({"circle-color": "#fbb03b", "circle-radius": 5.0}),
        ),
    ]
}
