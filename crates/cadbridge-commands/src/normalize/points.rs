//! Point and point-list coercion.
//!
//! Accepted point shapes: `{x, y[, z]}`, `[x, y[, z]]`, and strings
//! `"x,y[,z]"` or `"x y [z]"` whose components may carry units. Point lists
//! accept arrays of any point shape or a string of points separated by `;`
//! or `|`. `z` defaults to 0.

use serde_json::{Map, Value};

use super::scalars::{number_value, parse_component};
use super::{IssueKind, NormalizeIssue, child_path, index_path};

/// Keys holding a single point.
const POINT_KEYS: &[&str] = &[
    "start",
    "end",
    "origin",
    "center",
    "location",
    "point",
    "position",
    "startPoint",
    "endPoint",
    "insertionPoint",
];

/// Keys holding a list of points.
const POINT_LIST_KEYS: &[&str] = &["points", "baseline", "boundary", "vertices", "polyline"];

/// Convert point-like values under known keys, depth-first.
pub(super) fn normalize_points(value: &mut Value, path: &str, issues: &mut Vec<NormalizeIssue>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                let at = child_path(path, key);
                normalize_points(child, &at, issues);
                if POINT_KEYS.contains(&key.as_str()) {
                    replace_with(child, to_point(child), &at, "point", issues);
                } else if POINT_LIST_KEYS.contains(&key.as_str()) {
                    replace_with(child, to_point_list(child), &at, "point list", issues);
                }
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter_mut().enumerate() {
                normalize_points(item, &index_path(path, i), issues);
            }
        }
        _ => {}
    }
}

fn replace_with(
    slot: &mut Value,
    converted: Option<Value>,
    path: &str,
    what: &str,
    issues: &mut Vec<NormalizeIssue>,
) {
    match converted {
        Some(v) if v == *slot => {}
        Some(v) => {
            issues.push(NormalizeIssue::new(
                IssueKind::Point,
                path,
                format!("coerced to {what}"),
            ));
            *slot = v;
        }
        None => issues.push(NormalizeIssue::new(
            IssueKind::Advisory,
            path,
            format!("could not read {what}"),
        )),
    }
}

/// Synthesize top-level `location` from numeric `x`/`y`(/`z`).
pub(super) fn synthesize_location(params: &mut Value, issues: &mut Vec<NormalizeIssue>) {
    let Value::Object(map) = params else {
        return;
    };
    if map.contains_key("location") {
        return;
    }
    let (Some(x), Some(y)) = (
        map.get("x").filter(|v| v.is_number()),
        map.get("y").filter(|v| v.is_number()),
    ) else {
        return;
    };
    let z = map
        .get("z")
        .filter(|v| v.is_number())
        .cloned()
        .unwrap_or_else(|| Value::from(0));
    let location = point(x.clone(), y.clone(), z);
    issues.push(NormalizeIssue::new(
        IssueKind::Point,
        "location",
        "synthesized from x/y/z",
    ));
    let _ = map.insert("location".into(), location);
}

fn point(x: Value, y: Value, z: Value) -> Value {
    let mut map = Map::with_capacity(3);
    let _ = map.insert("x".into(), x);
    let _ = map.insert("y".into(), y);
    let _ = map.insert("z".into(), z);
    Value::Object(map)
}

fn component(value: &Value) -> Option<Value> {
    match value {
        Value::Number(_) => Some(value.clone()),
        Value::String(s) => parse_component(s).map(number_value),
        _ => None,
    }
}

fn from_components(parts: &[Value]) -> Option<Value> {
    match parts {
        [x, y] => Some(point(component(x)?, component(y)?, Value::from(0))),
        [x, y, z] => Some(point(component(x)?, component(y)?, component(z)?)),
        _ => None,
    }
}

/// Read one point.
pub(super) fn to_point(value: &Value) -> Option<Value> {
    match value {
        Value::Object(map) => {
            if !map.get("x").is_some_and(Value::is_number) || !map.get("y").is_some_and(Value::is_number) {
                return None;
            }
            let mut out = map.clone();
            match out.get("z") {
                None | Some(Value::Null) => {
                    let _ = out.insert("z".into(), Value::from(0));
                }
                Some(z) if z.is_number() => {}
                Some(_) => return None,
            }
            Some(Value::Object(out))
        }
        Value::Array(items) => from_components(items),
        Value::String(s) => {
            let parts: Vec<Value> = if s.contains(',') {
                s.split(',').map(|p| Value::String(p.trim().to_owned())).collect()
            } else {
                s.split_whitespace().map(|p| Value::String(p.to_owned())).collect()
            };
            from_components(&parts)
        }
        _ => None,
    }
}

/// Read a list of points; fails if any element is not a point.
pub(super) fn to_point_list(value: &Value) -> Option<Value> {
    match value {
        Value::Array(items) => items.iter().map(to_point).collect::<Option<Vec<_>>>().map(Value::Array),
        Value::String(s) => {
            let pieces: Vec<&str> = s
                .split([';', '|'])
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .collect();
            if pieces.is_empty() {
                return None;
            }
            pieces
                .into_iter()
                .map(|p| to_point(&Value::String(p.to_owned())))
                .collect::<Option<Vec<_>>>()
                .map(Value::Array)
        }
        _ => None,
    }
}

/// Whether a value is a normalized point.
pub(super) fn is_point(value: &Value) -> bool {
    value.get("x").is_some_and(Value::is_number) && value.get("y").is_some_and(Value::is_number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn point_shapes() {
        assert_eq!(to_point(&json!({"x": 1, "y": 2})), Some(json!({"x": 1, "y": 2, "z": 0})));
        assert_eq!(to_point(&json!([1, 2, 3])), Some(json!({"x": 1, "y": 2, "z": 3})));
        assert_eq!(to_point(&json!(["1m", 2])), Some(json!({"x": 1000, "y": 2, "z": 0})));
        assert_eq!(
            to_point(&json!("3000mm,0,1m")),
            Some(json!({"x": 3000, "y": 0, "z": 1000}))
        );
        assert_eq!(to_point(&json!("10 20")), Some(json!({"x": 10, "y": 20, "z": 0})));
        assert_eq!(to_point(&json!("1.5, 2.25")), Some(json!({"x": 1.5, "y": 2.25, "z": 0})));
    }

    #[test]
    fn rejects_non_points() {
        assert_eq!(to_point(&json!([1])), None);
        assert_eq!(to_point(&json!([1, 2, 3, 4])), None);
        assert_eq!(to_point(&json!({"x": 1})), None);
        assert_eq!(to_point(&json!({"x": 1, "y": 2, "z": "up"})), None);
        assert_eq!(to_point(&json!("a,b")), None);
        assert_eq!(to_point(&json!("inf,0")), None);
        assert_eq!(to_point(&json!(true)), None);
    }

    #[test]
    fn point_list_shapes() {
        assert_eq!(
            to_point_list(&json!("0,0;1000,0|2000,0")),
            Some(json!([
                {"x": 0, "y": 0, "z": 0},
                {"x": 1000, "y": 0, "z": 0},
                {"x": 2000, "y": 0, "z": 0}
            ]))
        );
        assert_eq!(
            to_point_list(&json!([[0, 0], {"x": 1, "y": 1}, "2 2"])).unwrap()[2],
            json!({"x": 2, "y": 2, "z": 0})
        );
        assert_eq!(to_point_list(&json!([])), Some(json!([])));
        assert_eq!(to_point_list(&json!([[0, 0], "nope"])), None);
        assert_eq!(to_point_list(&json!("  ")), None);
    }

    #[test]
    fn nested_point_keys_are_converted() {
        let mut v = json!({"segments": [{"start": "0,0", "end": [1000, 0]}]});
        let mut issues = Vec::new();
        normalize_points(&mut v, "", &mut issues);
        assert_eq!(v["segments"][0]["start"], json!({"x": 0, "y": 0, "z": 0}));
        assert_eq!(v["segments"][0]["end"], json!({"x": 1000, "y": 0, "z": 0}));
        assert_eq!(issues[0].path, "segments[0].end");
    }

    #[test]
    fn unreadable_point_is_advisory_and_kept() {
        let mut v = json!({"start": "somewhere"});
        let mut issues = Vec::new();
        normalize_points(&mut v, "", &mut issues);
        assert_eq!(v, json!({"start": "somewhere"}));
        assert!(issues[0].is_advisory());
    }

    #[test]
    fn location_is_synthesized_once() {
        let mut v = json!({"x": 5, "y": 6, "z": 7});
        let mut issues = Vec::new();
        synthesize_location(&mut v, &mut issues);
        assert_eq!(v["location"], json!({"x": 5, "y": 6, "z": 7}));
        synthesize_location(&mut v, &mut issues);
        assert_eq!(issues.len(), 1);
    }
}
