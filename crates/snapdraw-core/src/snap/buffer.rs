//! Invisible buffer layers that widen snappable layers for hit-testing.

use crate::host::{LayerKind, LayerSpec};
use serde_json::{Map, Value};

/// Prefix of every buffer layer id.
pub const BUFFER_PREFIX: &str = "_snap_buffer_";

/// Nearly transparent; zero-alpha layers are skipped by hit-testing.
const BUFFER_COLOR: &str = "rgba(0, 0, 0, 0.004)";

pub fn buffer_layer_id(layer_id: &str) -> String {
    format!("{BUFFER_PREFIX}{layer_id}")
}

/// Drop top-level `!=` clauses from a root layer filter.
pub fn strip_negated_clauses(filter: &Value) -> Option<Value> {
    let items = filter.as_array()?;
    let is_negated = |clause: &Value| {
        clause
            .as_array()
            .and_then(|c| c.first())
            .and_then(Value::as_str)
            == Some("!=")
    };
    match items.first().and_then(Value::as_str) {
        Some("!=") => None,
        Some("all") => {
            let kept: Vec<Value> = items
                .iter()
                .skip(1)
                .filter(|clause| !is_negated(clause))
                .cloned()
                .collect();
            if kept.is_empty() {
                return None;
            }
            let mut out = vec![Value::from("all")];
            out.extend(kept);
            Some(Value::Array(out))
        }
        _ => Some(filter.clone()),
    }
}

/// Buffer layer for a snappable root layer, or `None` if the layer type
/// cannot be buffered.
pub fn buffer_layer(root: &LayerSpec, snap_distance_px: f64) -> Option<LayerSpec> {
    let mut paint = Map::new();
    let kind = match root.kind {
        LayerKind::Line | LayerKind::Fill | LayerKind::FillExtrusion => {
            paint.insert("line-color".to_string(), Value::from(BUFFER_COLOR));
            paint.insert("line-width".to_string(), Value::from(snap_distance_px * 2.0));
            LayerKind::Line
        }
        LayerKind::Circle | LayerKind::Symbol => {
            paint.insert("circle-color".to_string(), Value::from(BUFFER_COLOR));
            paint.insert("circle-radius".to_string(), Value::from(snap_distance_px));
            LayerKind::Circle
        }
        other => {
            log::error!("Unsupported snap layer type {:?} for layer {}", other, root.id);
            return None;
        }
    };
    Some(LayerSpec {
        id: buffer_layer_id(&root.id),
        kind,
        source: root.source.clone(),
        source_layer: root.source_layer.clone(),
        filter: root.filter.as_ref().and_then(strip_negated_clauses),
        paint,
    })
}
