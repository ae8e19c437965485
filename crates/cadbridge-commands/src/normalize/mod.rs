//! Parameter normalization.
//!
//! [`normalize`] takes the loosely-typed parameter tree a caller sent and
//! returns a cleaned copy plus a list of issues. It never fails and never
//! touches shared state. Passes run in order:
//!
//! 1. Key aliasing (`ElementID`, `element_id` -> `elementId`, ...)
//! 2. Scalar coercion (`"42"` -> `42`, `"true"` -> `true`)
//! 3. Unit-suffixed strings to millimeters / degrees
//! 4. Points and point lists to `{x, y, z}`; top-level `x`/`y` synthesize `location`
//! 5. Singular id keys promoted to their plural array form
//! 6. Method-specific soft checks (advisory only)
//!
//! The result is a fixed point: normalizing normalized params changes nothing.

mod checks;
mod keys;
mod points;
mod scalars;

use serde::Serialize;
use serde_json::{Map, Value};

/// Which pass produced an issue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueKind {
    /// A key was renamed or dropped.
    Alias,
    /// A string became a bool or number.
    Coerce,
    /// A unit-suffixed string became a number.
    Unit,
    /// A value became a point or point list.
    Point,
    /// A singular key was promoted to its plural array.
    Promote,
    /// Something looks wrong; surfaced to callers as a warning.
    Advisory,
}

/// One change or observation made while normalizing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NormalizeIssue {
    /// Producing pass.
    pub kind: IssueKind,
    /// Dotted path of the affected value.
    pub path: String,
    /// What happened.
    pub detail: String,
}

impl NormalizeIssue {
    pub(crate) fn new(kind: IssueKind, path: &str, detail: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.to_owned(),
            detail: detail.into(),
        }
    }

    /// Advisory issues are surfaced as envelope warnings.
    pub fn is_advisory(&self) -> bool {
        self.kind == IssueKind::Advisory
    }
}

/// Normalized parameters and the issues collected on the way.
#[derive(Clone, Debug, PartialEq)]
pub struct Normalized {
    /// Cleaned parameter tree.
    pub params: Value,
    /// Changes and advisories, in pass order.
    pub issues: Vec<NormalizeIssue>,
}

/// Normalize `raw` parameters for the canonical command `method`.
pub fn normalize(method: &str, raw: &Value) -> Normalized {
    let mut issues = Vec::new();
    let params = match raw {
        Value::Null => Value::Object(Map::new()),
        Value::Object(_) => raw.clone(),
        other => {
            issues.push(NormalizeIssue::new(
                IssueKind::Advisory,
                "",
                "parameters should be an object",
            ));
            return Normalized {
                params: other.clone(),
                issues,
            };
        }
    };

    let mut params = keys::fold_aliases(params, "", &mut issues);
    scalars::coerce(&mut params, "", false, &mut issues);
    scalars::convert_units(&mut params, "", false, &mut issues);
    points::normalize_points(&mut params, "", &mut issues);
    points::synthesize_location(&mut params, &mut issues);
    promote_plurals(&mut params, &mut issues);
    checks::run(method, &params, &mut issues);

    Normalized { params, issues }
}

/// Singular id keys and their plural array counterparts.
const PLURAL_PAIRS: &[(&str, &str)] = &[
    ("elementId", "elementIds"),
    ("categoryId", "categoryIds"),
    ("typeId", "typeIds"),
    ("viewId", "viewIds"),
    ("uniqueId", "uniqueIds"),
];

fn promote_plurals(params: &mut Value, issues: &mut Vec<NormalizeIssue>) {
    let Value::Object(map) = params else {
        return;
    };
    for (singular, plural) in PLURAL_PAIRS {
        match map.get(*plural) {
            Some(Value::Array(_) | Value::Null) => {}
            Some(scalar) => {
                let wrapped = wrap_plural(plural, scalar);
                issues.push(NormalizeIssue::new(
                    IssueKind::Promote,
                    plural,
                    "wrapped scalar into array",
                ));
                let _ = map.insert((*plural).to_owned(), wrapped);
            }
            None => {
                let Some(value) = map.get(*singular).filter(|v| !v.is_null()) else {
                    continue;
                };
                let promoted = match value {
                    Value::Array(_) => value.clone(),
                    other => Value::Array(vec![other.clone()]),
                };
                issues.push(NormalizeIssue::new(
                    IssueKind::Promote,
                    plural,
                    format!("promoted from {singular}"),
                ));
                let _ = map.insert((*plural).to_owned(), promoted);
            }
        }
    }
}

/// Wrap a scalar; comma-separated numeric id strings are split.
fn wrap_plural(plural: &str, scalar: &Value) -> Value {
    if plural != "uniqueIds" {
        if let Value::String(s) = scalar {
            if s.contains(',') {
                let parsed: Option<Vec<Value>> = s
                    .split(',')
                    .map(|p| p.trim().parse::<i64>().ok().map(Value::from))
                    .collect();
                if let Some(ids) = parsed {
                    return Value::Array(ids);
                }
            }
        }
    }
    Value::Array(vec![scalar.clone()])
}

pub(crate) fn child_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_owned()
    } else {
        format!("{parent}.{key}")
    }
}

pub(crate) fn index_path(parent: &str, index: usize) -> String {
    format!("{parent}[{index}]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn element_id_alias_and_coercion() {
        let out = normalize("element.wall_create", &json!({"ElementID": "42"}));
        assert_eq!(out.params["elementId"], json!(42));
        assert!(out.params.get("ElementID").is_none());
        assert!(out.issues.iter().any(|i| i.kind == IssueKind::Alias));
        assert!(out.issues.iter().any(|i| i.kind == IssueKind::Coerce));
    }

    #[test]
    fn point_string_with_mixed_units() {
        let out = normalize("element.place_family", &json!({"location": "3000mm,0,1m"}));
        assert_eq!(out.params["location"], json!({"x": 3000, "y": 0, "z": 1000}));
    }

    #[test]
    fn null_params_become_empty_object() {
        let out = normalize("element.get_walls", &Value::Null);
        assert_eq!(out.params, json!({}));
        assert!(out.issues.is_empty());
    }

    #[test]
    fn non_object_params_are_kept_with_advisory() {
        let out = normalize("element.get_walls", &json!([1, 2]));
        assert_eq!(out.params, json!([1, 2]));
        assert!(out.issues[0].is_advisory());
    }

    #[test]
    fn singular_promoted_to_plural() {
        let out = normalize("element.delete_elements", &json!({"elementId": "7"}));
        assert_eq!(out.params["elementId"], json!(7));
        assert_eq!(out.params["elementIds"], json!([7]));
    }

    #[test]
    fn plural_scalar_wrapped_and_comma_split() {
        let out = normalize(
            "element.delete_elements",
            &json!({"elementIds": "1, 2,3", "categoryIds": 5, "uniqueIds": "a,b"}),
        );
        assert_eq!(out.params["elementIds"], json!([1, 2, 3]));
        assert_eq!(out.params["categoryIds"], json!([5]));
        assert_eq!(out.params["uniqueIds"], json!(["a,b"]));
    }

    #[test]
    fn existing_plural_is_not_overwritten() {
        let out = normalize(
            "element.delete_elements",
            &json!({"elementId": 1, "elementIds": [2, 3]}),
        );
        assert_eq!(out.params["elementIds"], json!([2, 3]));
    }

    #[test]
    fn top_level_xy_synthesizes_location() {
        let out = normalize("element.place_family", &json!({"x": "1m", "y": 2}));
        assert_eq!(out.params["location"], json!({"x": 1000, "y": 2, "z": 0}));
        assert_eq!(out.params["x"], json!(1000));
    }

    #[test]
    fn nested_params_are_normalized() {
        let out = normalize(
            "element.update_parameters_batch",
            &json!({"Items": [{"Params": {"ElementId": "5", "angle": "90°"}}]}),
        );
        assert_eq!(
            out.params["Items"][0]["params"],
            json!({"elementId": 5, "angleDeg": 90})
        );
    }

    #[test]
    fn normalize_is_idempotent_on_example() {
        let raw = json!({
            "ElementID": "42",
            "start": [0, "1m"],
            "end": "3000mm 0",
            "baseLine": "0,0;1000,0|2000,0",
            "elementIds": "1,2",
            "name": "007",
            "x": "5",
            "y": "6"
        });
        let once = normalize("element.create_wall", &raw).params;
        let twice = normalize("element.create_wall", &once).params;
        assert_eq!(once, twice);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn key() -> impl Strategy<Value = String> {
            prop::sample::select(vec![
                "ElementID", "elementId", "element_id", "elementIds", "ViewId", "viewId",
                "typeId", "newTypeId", "start", "end", "location", "x", "y", "z", "points",
                "baseline", "line", "name", "Params", "params", "angle", "segments", "uniqueId",
                "categoryIds", "value",
            ])
            .prop_map(str::to_owned)
        }

        fn leaf_value() -> impl Strategy<Value = Value> {
            prop_oneof![
                prop::sample::select(vec![
                    "42", "007", "-3", "2.5", "1e3", "true", "FALSE", "3000mm", "1m", "1.5m",
                    "45deg", "90°", "1,2", "3000mm,0,1m", "0 0 0", "0,0;1,1", "abc", "", " 7 ",
                    "inf", "NaN", "1,x",
                ])
                .prop_map(|s| Value::String(s.to_owned())),
                (-1000i64..1000).prop_map(Value::from),
                (-1000.0f64..1000.0).prop_map(Value::from),
                any::<bool>().prop_map(Value::Bool),
                Just(Value::Null),
            ]
        }

        fn tree() -> impl Strategy<Value = Value> {
            leaf_value().prop_recursive(3, 32, 4, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                    prop::collection::btree_map(key(), inner, 0..5)
                        .prop_map(|m| Value::Object(m.into_iter().collect())),
                ]
            })
        }

        fn params() -> impl Strategy<Value = Value> {
            prop::collection::btree_map(key(), tree(), 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect()))
        }

        proptest! {
            #[test]
            fn normalize_is_a_fixed_point(raw in params()) {
                let once = normalize("element.create_wall", &raw).params;
                let twice = normalize("element.create_wall", &once).params;
                prop_assert_eq!(once, twice);
            }
        }
    }
}
