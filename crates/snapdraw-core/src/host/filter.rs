//! Evaluation of legacy style filter expressions.
//!
//! Supports `all`, `any`, `none`, `==`, `!=`, `<`, `<=`, `>`, `>=`, `in`,
//! `!in`, `has` and `!has`. The `$type` key compares against the base
//! geometry type (`Point`, `LineString`, `Polygon`).

use crate::geo::GeometryKind;
use serde_json::{Map, Value};
use std::cmp::Ordering;

fn base_type(kind: GeometryKind) -> &'static str {
    match kind {
        GeometryKind::Point | GeometryKind::MultiPoint => "Point",
        GeometryKind::LineString | GeometryKind::MultiLineString => "LineString",
        GeometryKind::Polygon | GeometryKind::MultiPolygon => "Polygon",
    }
}

fn lookup(key: &str, kind: GeometryKind, properties: &Map<String, Value>) -> Option<Value> {
    if key == "$type" {
        Some(Value::String(base_type(kind).to_string()))
    } else {
        properties.get(key).cloned()
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Whether a feature passes the filter. A missing filter passes everything.
pub fn evaluate(filter: Option<&Value>, kind: GeometryKind, properties: &Map<String, Value>) -> bool {
    match filter {
        None => true,
        Some(f) => eval(f, kind, properties),
    }
}

fn eval(filter: &Value, kind: GeometryKind, properties: &Map<String, Value>) -> bool {
    let Some(items) = filter.as_array() else {
        return filter.as_bool().unwrap_or(true);
    };
    let Some(op) = items.first().and_then(Value::as_str) else {
        return true;
    };
    let args = &items[1..];
    let key = args.first().and_then(Value::as_str).unwrap_or_default();
    match op {
        "all" => args.iter().all(|f| eval(f, kind, properties)),
        "any" => args.iter().any(|f| eval(f, kind, properties)),
        "none" => !args.iter().any(|f| eval(f, kind, properties)),
        "has" => lookup(key, kind, properties).is_some(),
        "!has" => lookup(key, kind, properties).is_none(),
        "in" | "!in" => {
            let found = lookup(key, kind, properties)
                .is_some_and(|v| args.iter().skip(1).any(|c| values_equal(&v, c)));
            found == (op == "in")
        }
        "==" | "!=" => {
            let equal = match (lookup(key, kind, properties), args.get(1)) {
                (Some(v), Some(expected)) => values_equal(&v, expected),
                (None, Some(Value::Null)) => true,
                _ => false,
            };
            equal == (op == "==")
        }
        "<" | "<=" | ">" | ">=" => {
            let ordering = lookup(key, kind, properties)
                .zip(args.get(1))
                .and_then(|(v, expected)| compare(&v, expected));
            match (op, ordering) {
                ("<", Some(o)) => o == Ordering::Less,
                ("<=", Some(o)) => o != Ordering::Greater,
                (">", Some(o)) => o == Ordering::Greater,
                (">=", Some(o)) => o != Ordering::Less,
                _ => false,
            }
        }
        other => {
            log::warn!("Unsupported filter operator: {}", other);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_type_filter() {
        let filter = json!(["==", "$type", "Polygon"]);
        assert!(evaluate(Some(&filter), GeometryKind::MultiPolygon, &Map::new()));
        assert!(!evaluate(Some(&filter), GeometryKind::LineString, &Map::new()));
    }

    #[test]
    fn test_all_any_in() {
        let p = props(json!({"meta": "vertex", "class": "street", "lanes": 2}));
        let filter = json!(["all", ["==", "meta", "vertex"], ["in", "class", "street", "road"]]);
        assert!(evaluate(Some(&filter), GeometryKind::Point, &p));
        let filter = json!(["any", ["!=", "meta", "vertex"], [">", "lanes", 3]]);
        assert!(!evaluate(Some(&filter), GeometryKind::Point, &p));
        let filter = json!([">=", "lanes", 2]);
        assert!(evaluate(Some(&filter), GeometryKind::Point, &p));
    }

    #[test]
    fn test_has_and_missing_filter() {
        let p = props(json!({"id": "a"}));
        assert!(evaluate(Some(&json!(["has", "id"])), GeometryKind::Point, &p));
        assert!(evaluate(Some(&json!(["!has", "name"])), GeometryKind::Point, &p));
        assert!(evaluate(None, GeometryKind::Point, &p));
    }
}
