//! Key aliasing: alternate spellings and casings fold to one canonical key.

use std::collections::HashSet;

use serde_json::{Map, Value};

use super::{IssueKind, NormalizeIssue, child_path, index_path};

/// Lowercased alternate spelling -> canonical key.
const KEY_ALIASES: &[(&str, &str)] = &[
    ("viewid", "viewId"),
    ("view_id", "viewId"),
    ("viewids", "viewIds"),
    ("view_ids", "viewIds"),
    ("elementid", "elementId"),
    ("element_id", "elementId"),
    ("elementids", "elementIds"),
    ("element_ids", "elementIds"),
    ("typeid", "typeId"),
    ("type_id", "typeId"),
    ("newtypeid", "typeId"),
    ("new_type_id", "typeId"),
    ("typeids", "typeIds"),
    ("type_ids", "typeIds"),
    ("categoryid", "categoryId"),
    ("category_id", "categoryId"),
    ("categoryids", "categoryIds"),
    ("category_ids", "categoryIds"),
    ("levelid", "levelId"),
    ("level_id", "levelId"),
    ("levelname", "levelName"),
    ("level_name", "levelName"),
    ("baselevelid", "baseLevelId"),
    ("base_level_id", "baseLevelId"),
    ("baselevelname", "baseLevelName"),
    ("base_level_name", "baseLevelName"),
    ("toplevelid", "topLevelId"),
    ("top_level_id", "topLevelId"),
    ("toplevelname", "topLevelName"),
    ("top_level_name", "topLevelName"),
    ("uniqueid", "uniqueId"),
    ("unique_id", "uniqueId"),
    ("uniqueids", "uniqueIds"),
    ("unique_ids", "uniqueIds"),
    ("hostid", "hostWallId"),
    ("host_id", "hostWallId"),
    ("hostwallid", "hostWallId"),
    ("host_wall_id", "hostWallId"),
    ("params", "params"),
    ("parameters", "params"),
    ("angle", "angleDeg"),
    ("angledeg", "angleDeg"),
    ("angle_deg", "angleDeg"),
    ("baseline", "baseline"),
    ("baselinepts", "baseline"),
    ("baseline_pts", "baseline"),
    ("line", "baseline"),
    ("points2", "baseline"),
];

fn canonical_key(key: &str) -> Option<&'static str> {
    let lower = key.to_ascii_lowercase();
    KEY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == lower)
        .map(|(_, canonical)| *canonical)
}

/// Rename aliased keys throughout the tree.
///
/// A canonical key already present wins over its aliases; among aliases of
/// the same key the first in map order wins. Dropped keys are reported.
pub(super) fn fold_aliases(value: Value, path: &str, issues: &mut Vec<NormalizeIssue>) -> Value {
    match value {
        Value::Object(map) => {
            let present: HashSet<String> = map.keys().cloned().collect();
            let mut out = Map::with_capacity(map.len());
            for (key, child) in map {
                let child_at = child_path(path, &key);
                let child = fold_aliases(child, &child_at, issues);
                match canonical_key(&key) {
                    Some(canonical) if canonical != key => {
                        if present.contains(canonical) || out.contains_key(canonical) {
                            issues.push(NormalizeIssue::new(
                                IssueKind::Alias,
                                &child_at,
                                format!("dropped: {canonical} already set"),
                            ));
                            continue;
                        }
                        issues.push(NormalizeIssue::new(
                            IssueKind::Alias,
                            &child_at,
                            format!("renamed to {canonical}"),
                        ));
                        let _ = out.insert(canonical.to_owned(), child);
                    }
                    _ => {
                        let _ = out.insert(key, child);
                    }
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| fold_aliases(item, &index_path(path, i), issues))
                .collect(),
        ),
        other => other,
    }
}
