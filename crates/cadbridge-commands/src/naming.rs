//! Command name canonicalization.
//!
//! Canonical names are lowercase `domain.leaf` strings. Handlers register
//! under one or more legacy dispatch names (pipe-delimited); every legacy
//! name stays accepted as an alias of the canonical one.
//!
//! Resolution order:
//! 1. The fixed override table (legacy names whose canonical form is not
//!    derivable, e.g. `get_sheets -> sheet.list`)
//! 2. Names already containing `.` are taken as canonical
//! 3. Otherwise `<domain>.<name>` with the domain inferred from the name and
//!    the handler group

/// Legacy names with hand-picked canonical forms.
pub const OVERRIDES: &[(&str, &str)] = &[
    ("search_commands", "help.search_commands"),
    ("describe_command", "help.describe_command"),
    ("list_commands", "help.list_commands"),
    ("ping_server", "help.ping_server"),
    ("get_project_info", "doc.get_project_info"),
    ("create_sheet", "sheet.create"),
    ("get_sheets", "sheet.list"),
    ("delete_sheet", "sheet.delete"),
    ("place_view_on_sheet", "sheet.place_view"),
    ("remove_view_from_sheet", "sheet.remove_view"),
    ("sheet_inspect", "sheet.inspect"),
    ("viewport_move_to_sheet_center", "viewport.move_to_sheet_center"),
    ("revit_batch", "revit.batch"),
    ("revit_status", "revit.status"),
];

/// Canonicalize a raw method name for a handler in `group`.
///
/// Idempotent: `canonicalize(canonicalize(x, g), g) == canonicalize(x, g)`.
/// Blank input yields an empty string.
pub fn canonicalize(raw: &str, group: &str) -> String {
    let name = raw.trim().to_ascii_lowercase();
    if name.is_empty() {
        return name;
    }
    if let Some(mapped) = override_for(&name) {
        return mapped.to_owned();
    }
    if name.contains('.') {
        return name;
    }
    format!("{}.{name}", infer_domain(&name, group))
}

fn override_for(name: &str) -> Option<&'static str> {
    OVERRIDES
        .iter()
        .find(|(legacy, _)| *legacy == name)
        .map(|(_, canonical)| *canonical)
}

/// Infer the domain segment of an undotted name.
///
/// Name hints (`sheet`, `viewport`) win over the handler group.
pub fn infer_domain(name: &str, group: &str) -> &'static str {
    let lower = name.to_ascii_lowercase();
    if lower.contains("viewport") {
        return "viewport";
    }
    if lower.contains("sheet") {
        return "sheet";
    }

    let head = group
        .split(['/', '.', ':'])
        .find(|s| !s.trim().is_empty())
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    match head.as_str() {
        "meta" | "metaops" | "help" => "help",
        "document" | "documentops" | "doc" | "docops" => "doc",
        "view" | "viewops" | "visualization" | "annotation" | "annotationops" | "schedule"
        | "scheduleops" => "view",
        _ => "element",
    }
}

/// Final segment of a name (text after the last `.`).
pub fn leaf(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

/// Domain segment of a canonical name (text before the first `.`).
pub fn domain(name: &str) -> &str {
    name.split_once('.').map_or("", |(d, _)| d)
}

/// Split a pipe-delimited dispatch string into trimmed, non-empty names.
pub fn split_dispatch_names(names: &str) -> Vec<&str> {
    names
        .split('|')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .collect()
}
