//! Command metadata and the inference rules that fill in undeclared fields.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::naming::{domain, leaf};

/// Whether a command mutates the document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    /// Query only.
    Read,
    /// Mutates the document.
    Write,
}

/// How destructive a write is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    /// Ordinary command.
    Normal,
    /// Destructive write (delete/remove/reset/clear/purge).
    High,
}

/// Risk class; `High` writes require a dry-run confirmation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    /// Read-only.
    Low,
    /// Ordinary write.
    Medium,
    /// Destructive write.
    High,
}

/// Metadata a handler may declare at registration.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandAttributes {
    /// Preferred name; otherwise the first dispatch name is used.
    pub name: Option<String>,
    /// Extra accepted names.
    pub aliases: Vec<String>,
    /// Category override.
    pub category: Option<String>,
    /// Kind override.
    pub kind: Option<CommandKind>,
    /// Risk override.
    pub risk: Option<Risk>,
    /// One-line description.
    pub summary: Option<String>,
    /// Example request.
    pub example: Option<Value>,
    /// Failure codes the transaction guard may dismiss for this command.
    pub failure_whitelist: Vec<String>,
}

/// Read-only metadata for one canonical command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandMeta {
    /// Canonical name.
    pub name: String,
    /// Every other accepted name, sorted.
    pub aliases: Vec<String>,
    /// `Domain/Area` grouping for discovery.
    pub category: String,
    /// Read or write.
    pub kind: CommandKind,
    /// Destructiveness.
    pub importance: Importance,
    /// Risk class.
    pub risk: Risk,
    /// One-line description.
    pub summary: String,
    /// Example request.
    pub example: Value,
    /// Failure codes dismissed by the whitelist policy; empty means the
    /// default proceed-with-warnings policy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failure_whitelist: Vec<String>,
}

impl CommandMeta {
    /// Build metadata for `canonical`, inferring what `attrs` leaves unset.
    pub fn infer(canonical: &str, group: &str, attrs: &CommandAttributes) -> Self {
        let kind = attrs.kind.unwrap_or_else(|| infer_kind(canonical));
        let importance = infer_importance(canonical, kind);
        Self {
            name: canonical.to_owned(),
            aliases: Vec::new(),
            category: attrs
                .category
                .clone()
                .unwrap_or_else(|| infer_category(group)),
            kind,
            importance,
            risk: attrs.risk.unwrap_or_else(|| infer_risk(kind, importance)),
            summary: attrs
                .summary
                .clone()
                .unwrap_or_else(|| infer_summary(canonical)),
            example: attrs
                .example
                .clone()
                .unwrap_or_else(|| default_example(canonical)),
            failure_whitelist: attrs.failure_whitelist.clone(),
        }
    }

    /// High-risk writes need a dry-run token before they execute.
    pub fn requires_confirmation(&self) -> bool {
        self.kind == CommandKind::Write && self.risk == Risk::High
    }

    /// Writes run inside a host transaction.
    pub fn is_write(&self) -> bool {
        self.kind == CommandKind::Write
    }

    /// Case-insensitive substring match over name, aliases, category, and
    /// summary. A blank query matches everything.
    pub fn matches(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        needle.is_empty()
            || self.name.contains(&needle)
            || self.aliases.iter().any(|a| a.contains(&needle))
            || self.category.to_lowercase().contains(&needle)
            || self.summary.to_lowercase().contains(&needle)
    }
}

const READ_VERBS: &[&str] = &[
    "get", "list", "find", "search", "describe", "audit", "validate", "diff", "snapshot", "ping",
    "status",
];

const DESTRUCTIVE_VERBS: &[&str] = &["delete", "remove", "reset", "clear", "purge"];

fn leaf_verb_matches(leaf: &str, verbs: &[&str]) -> bool {
    verbs.iter().any(|verb| {
        leaf == *verb
            || leaf
                .strip_prefix(verb)
                .is_some_and(|rest| rest.starts_with('_'))
    })
}

/// `Read` when the leaf verb is a query verb or the leaf ends in `_status`.
pub fn infer_kind(canonical: &str) -> CommandKind {
    let leaf = leaf(canonical);
    if leaf_verb_matches(leaf, READ_VERBS) || leaf.ends_with("_status") {
        CommandKind::Read
    } else {
        CommandKind::Write
    }
}

/// `High` for writes whose leaf verb is destructive.
pub fn infer_importance(canonical: &str, kind: CommandKind) -> Importance {
    if kind == CommandKind::Write && leaf_verb_matches(leaf(canonical), DESTRUCTIVE_VERBS) {
        Importance::High
    } else {
        Importance::Normal
    }
}

/// Reads are low risk, destructive writes high, other writes medium.
pub fn infer_risk(kind: CommandKind, importance: Importance) -> Risk {
    match (kind, importance) {
        (CommandKind::Read, _) => Risk::Low,
        (CommandKind::Write, Importance::High) => Risk::High,
        (CommandKind::Write, Importance::Normal) => Risk::Medium,
    }
}

/// First two segments of the handler group, or `Other`.
pub fn infer_category(group: &str) -> String {
    let segments: Vec<&str> = group
        .split(['/', '.', ':'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(2)
        .collect();
    if segments.is_empty() {
        "Other".to_owned()
    } else {
        segments.join("/")
    }
}

/// Human-readable summary derived from the canonical name.
pub fn infer_summary(canonical: &str) -> String {
    let words = leaf(canonical).replace('_', " ");
    let mut chars = words.trim().chars();
    let Some(first) = chars.next() else {
        return canonical.to_owned();
    };
    let sentence: String = first.to_uppercase().chain(chars).collect();
    match domain(canonical) {
        "" => sentence,
        d => format!("{sentence} ({d})"),
    }
}

/// JSON-RPC 2.0 call with empty params.
pub fn default_example(canonical: &str) -> Value {
    json!({ "jsonrpc": "2.0", "id": 1, "method": canonical, "params": {} })
}
