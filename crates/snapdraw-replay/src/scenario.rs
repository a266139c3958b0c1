//! Scenario file format.

use serde::{Deserialize, Serialize};
use snapdraw_core::{DrawOptions, Feature, Geometry, LayerSpec, LngLat, Modifiers, ModeOptions, Viewport};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::ReplayResult;

/// A recorded session: map style, data, backend geometry and input steps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub options: DrawOptions,
    pub viewport: Viewport,
    /// Host style layers, bottom to top.
    pub layers: Vec<LayerSpec>,
    /// Features per source id.
    pub sources: BTreeMap<String, Vec<Feature>>,
    /// Rendered-precision geometry per backend id.
    pub snap_geometries: BTreeMap<String, Geometry>,
    /// Full-precision geometry per backend id.
    pub source_geometries: BTreeMap<String, Geometry>,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_json(json: &str) -> ReplayResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> ReplayResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

/// A pointer sample in a step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PointerStep {
    /// Position as `[lng, lat]`.
    pub at: LngLat,
    #[serde(default)]
    pub time_ms: u64,
    #[serde(default)]
    pub primary_held: bool,
    #[serde(default)]
    pub modifiers: Modifiers,
}

/// One replayed input or API call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    MouseMove(PointerStep),
    MouseDown(PointerStep),
    MouseUp(PointerStep),
    DblClick(PointerStep),
    KeyDown { key: String },
    KeyUp { key: String },
    MouseOut(PointerStep),
    /// Time passes without input; a throttled snap sample may be taken.
    Wait { time_ms: u64 },
    ChangeMode {
        mode: String,
        #[serde(default)]
        options: ModeOptions,
    },
    EnableSnapping,
    DisableSnapping,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_steps() {
        let scenario = Scenario::from_json(
            r#"{
                "viewport": {"origin": [10.0, 50.0], "pixels_per_degree": 1000.0},
                "steps": [
                    {"type": "change_mode", "mode": "draw_point"},
                    {"type": "mouse_move", "at": [10.1, 49.9], "time_ms": 5},
                    {"type": "key_up", "key": "Escape"},
                    {"type": "mouse_out", "at": [10.2, 49.9], "time_ms": 9},
                    {"type": "change_mode", "mode": "direct_select", "options": {"feature_id": "a", "coord_path": "1"}}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(scenario.viewport.pixels_per_degree, 1000.0);
        assert_eq!(scenario.steps.len(), 5);
        assert!(matches!(&scenario.steps[1], Step::MouseMove(p) if p.time_ms == 5 && !p.primary_held));
        let Step::ChangeMode { options, .. } = &scenario.steps[4] else {
            panic!("expected change_mode");
        };
        assert_eq!(options.feature_id.as_ref().map(|id| id.as_str()), Some("a"));
        assert!(options.coord_path.is_some());
    }

    #[test]
    fn test_unknown_step_rejected() {
        assert!(Scenario::from_json(r#"{"steps": [{"type": "pinch"}]}"#).is_err());
    }
}
