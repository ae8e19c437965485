//! Method-specific soft checks. Never reject; only add advisories.

use serde_json::Value;

use super::points::is_point;
use super::{IssueKind, NormalizeIssue, child_path, index_path};
use crate::naming::leaf;

pub(super) fn run(method: &str, params: &Value, issues: &mut Vec<NormalizeIssue>) {
    match leaf(method) {
        "create_wall" | "wall_create" => {
            require_point(params, "start", issues);
            require_point(params, "end", issues);
        }
        "create_curtain_wall" | "update_curtain_wall_geometry" => {
            let count = params
                .get("baseline")
                .and_then(Value::as_array)
                .map_or(0, |pts| pts.iter().filter(|p| is_point(p)).count());
            if count < 2 {
                advise(issues, "baseline", "expected at least 2 points");
            }
        }
        "create_grids" | "create_grid" => match params.get("segments").and_then(Value::as_array) {
            Some(segments) => {
                for (i, segment) in segments.iter().enumerate() {
                    let at = index_path("segments", i);
                    for key in ["start", "end"] {
                        if !segment.get(key).is_some_and(is_point) {
                            advise(issues, &child_path(&at, key), "expected a point");
                        }
                    }
                }
            }
            None => advise(issues, "segments", "expected an array of segments"),
        },
        _ => {}
    }
}

fn require_point(params: &Value, key: &str, issues: &mut Vec<NormalizeIssue>) {
    if !params.get(key).is_some_and(is_point) {
        advise(issues, key, "expected a point");
    }
}

fn advise(issues: &mut Vec<NormalizeIssue>, path: &str, detail: &str) {
    issues.push(NormalizeIssue::new(IssueKind::Advisory, path, detail));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn advisories(method: &str, params: &Value) -> Vec<String> {
        let mut issues = Vec::new();
        run(method, params, &mut issues);
        assert!(issues.iter().all(NormalizeIssue::is_advisory));
        issues.into_iter().map(|i| i.path).collect()
    }

    #[test]
    fn wall_needs_both_endpoints() {
        let p = json!({"start": {"x": 0, "y": 0, "z": 0}});
        assert_eq!(advisories("element.create_wall", &p), vec!["end"]);
        let ok = json!({"start": {"x": 0, "y": 0, "z": 0}, "end": {"x": 1, "y": 0, "z": 0}});
        assert!(advisories("element.wall_create", &ok).is_empty());
    }

    #[test]
    fn curtain_wall_baseline_needs_two_points() {
        let p = json!({"baseline": [{"x": 0, "y": 0, "z": 0}]});
        assert_eq!(advisories("element.create_curtain_wall", &p), vec!["baseline"]);
    }

    #[test]
    fn grid_segments_are_checked_individually() {
        let p = json!({"segments": [
            {"start": {"x": 0, "y": 0, "z": 0}, "end": {"x": 1, "y": 0, "z": 0}},
            {"start": {"x": 0, "y": 0, "z": 0}}
        ]});
        assert_eq!(advisories("view.create_grids", &p), vec!["segments[1].end"]);
        assert_eq!(advisories("view.create_grid", &json!({})), vec!["segments"]);
    }

    #[test]
    fn other_methods_are_unchecked() {
        assert!(advisories("element.get_walls", &json!({})).is_empty());
    }
}
