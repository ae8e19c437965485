//! Discovery commands answered by the dispatcher itself.
//!
//! They read only the registry and never open a transaction.

use std::sync::LazyLock;

use cadbridge_commands::meta::{CommandAttributes, CommandKind, CommandMeta, Risk};
use cadbridge_commands::naming::canonicalize;
use cadbridge_commands::CommandRegistry;
use cadbridge_core::errors::{INVALID_PARAMS, METHOD_NOT_FOUND};
use cadbridge_core::host::HostDocument;
use cadbridge_core::request::CommandRequest;
use serde_json::{Value, json};

use crate::envelope::ResultEnvelope;

/// `help.list_commands`.
pub const LIST_COMMANDS: &str = "help.list_commands";
/// `help.describe_command`.
pub const DESCRIBE_COMMAND: &str = "help.describe_command";
/// `help.search_commands`.
pub const SEARCH_COMMANDS: &str = "help.search_commands";
/// `help.ping_server`.
pub const PING_SERVER: &str = "help.ping_server";

const DEFAULT_SEARCH_LIMIT: usize = 20;

static BUILTINS: LazyLock<Vec<CommandMeta>> = LazyLock::new(|| {
    [
        (LIST_COMMANDS, "List every command with its metadata"),
        (DESCRIBE_COMMAND, "Describe one command by name or alias"),
        (SEARCH_COMMANDS, "Search commands by name, alias, category, or summary"),
        (PING_SERVER, "Check that the engine is responsive"),
    ]
    .into_iter()
    .map(|(name, summary)| {
        let attrs = CommandAttributes {
            category: Some("MetaOps".into()),
            kind: Some(CommandKind::Read),
            risk: Some(Risk::Low),
            summary: Some(summary.into()),
            ..CommandAttributes::default()
        };
        let mut meta = CommandMeta::infer(name, "MetaOps", &attrs);
        meta.aliases = vec![name.trim_start_matches("help.").to_owned()];
        meta
    })
    .collect()
});

/// Metadata of the built-in commands.
pub fn builtin_metas() -> &'static [CommandMeta] {
    &BUILTINS
}

const NAMES: &[&str] = &[LIST_COMMANDS, DESCRIBE_COMMAND, SEARCH_COMMANDS, PING_SERVER];

/// Canonical built-in name for `method`, if it names one.
pub fn resolve(method: &str) -> Option<&'static str> {
    let canonical = canonicalize(method, "MetaOps");
    NAMES.iter().copied().find(|n| *n == canonical)
}

/// Registry commands plus built-ins, sorted by name.
pub fn all_commands(registry: &CommandRegistry) -> Vec<CommandMeta> {
    let mut all: Vec<CommandMeta> = registry.all().into_iter().cloned().collect();
    for builtin in builtin_metas() {
        if !all.iter().any(|m| m.name == builtin.name) {
            all.push(builtin.clone());
        }
    }
    all.sort_by(|a, b| a.name.cmp(&b.name));
    all
}

/// Look a name up in the registry, then among built-ins.
pub fn describe(registry: &CommandRegistry, name: &str) -> Option<CommandMeta> {
    registry
        .meta(name)
        .cloned()
        .or_else(|| resolve(name).and_then(|b| builtin_metas().iter().find(|m| m.name == b).cloned()))
}

/// Answer a built-in request.
pub fn run(
    builtin: &str,
    registry: &CommandRegistry,
    host: &dyn HostDocument,
    request: &CommandRequest,
) -> ResultEnvelope {
    match builtin {
        LIST_COMMANDS => {
            let commands = all_commands(registry);
            ResultEnvelope::success(json!({ "count": commands.len(), "commands": commands }))
        }
        DESCRIBE_COMMAND => {
            let Some(name) = request
                .param_str("name")
                .or_else(|| request.param_str("method"))
                .filter(|n| !n.trim().is_empty())
            else {
                return ResultEnvelope::error(INVALID_PARAMS, "'name' is required", None);
            };
            match describe(registry, name) {
                Some(meta) => ResultEnvelope::success(json!(meta)),
                None => ResultEnvelope::error(
                    METHOD_NOT_FOUND,
                    format!("unknown command '{name}'"),
                    None,
                )
                .with_next_action(search_action(name)),
            }
        }
        SEARCH_COMMANDS => {
            let query = request
                .param_str("query")
                .or_else(|| request.param_str("q"))
                .unwrap_or("");
            let limit = request
                .param("limit")
                .and_then(Value::as_u64)
                .and_then(|l| usize::try_from(l).ok())
                .filter(|l| *l > 0)
                .unwrap_or(DEFAULT_SEARCH_LIMIT);
            let hits: Vec<CommandMeta> = all_commands(registry)
                .into_iter()
                .filter(|m| m.matches(query))
                .take(limit)
                .collect();
            ResultEnvelope::success(json!({ "query": query, "count": hits.len(), "commands": hits }))
        }
        _ => ResultEnvelope::success(json!({
            "pong": true,
            "pid": host.process_id(),
            "version": env!("CARGO_PKG_VERSION"),
            "hasDocument": host.document().is_some(),
        })),
    }
}

/// Suggested follow-up for an unknown name.
pub fn search_action(name: &str) -> Value {
    let query = cadbridge_commands::naming::leaf(&name.trim().to_ascii_lowercase()).to_owned();
    json!({ "method": SEARCH_COMMANDS, "params": { "query": query } })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names_resolve_from_legacy_spellings() {
        assert_eq!(resolve("ping_server"), Some(PING_SERVER));
        assert_eq!(resolve("HELP.LIST_COMMANDS"), Some(LIST_COMMANDS));
        assert_eq!(resolve("search_commands"), Some(SEARCH_COMMANDS));
        assert_eq!(resolve("element.get_walls"), None);
    }

    #[test]
    fn builtins_are_read_only() {
        assert!(builtin_metas().iter().all(|m| !m.is_write()));
    }

    #[test]
    fn search_action_uses_leaf() {
        assert_eq!(
            search_action("Element.Wall_Make"),
            json!({"method": "help.search_commands", "params": {"query": "wall_make"}})
        );
    }
}
