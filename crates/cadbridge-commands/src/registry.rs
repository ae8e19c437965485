//! Command registry: canonical names, aliases, metadata, and handlers.
//!
//! Built once at startup by explicit [`CommandRegistry::register`] calls and
//! then shared read-only (`Arc<CommandRegistry>`). Lookups are
//! case-insensitive. Registrations whose names canonicalize to an existing
//! command are merged into it: aliases are unioned, the first metadata and
//! handler win. A name claimed by two different commands stays with the
//! first one registered.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::handler::DomainCommandHandler;
use crate::meta::{CommandAttributes, CommandMeta};
use crate::naming::{canonicalize, split_dispatch_names};

/// A command entry: metadata plus the handler that executes it.
pub struct RegisteredCommand {
    /// Metadata.
    pub meta: CommandMeta,
    /// Executing handler.
    pub handler: Arc<dyn DomainCommandHandler>,
}

/// Lookup table from every accepted name to its command.
#[derive(Default)]
pub struct CommandRegistry {
    commands: Vec<RegisteredCommand>,
    index: HashMap<String, usize>,
}

impl CommandRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler with optional declared metadata.
    ///
    /// Returns the canonical name, or `None` when the handler declares no
    /// usable name.
    pub fn register(
        &mut self,
        handler: Arc<dyn DomainCommandHandler>,
        attributes: CommandAttributes,
    ) -> Option<String> {
        let mut names: Vec<String> = Vec::new();
        if let Some(name) = attributes.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            names.push(name.to_owned());
        }
        names.extend(
            split_dispatch_names(handler.dispatch_names())
                .into_iter()
                .map(str::to_owned),
        );
        names.extend(
            attributes
                .aliases
                .iter()
                .map(|a| a.trim().to_owned())
                .filter(|a| !a.is_empty()),
        );

        let Some(primary) = names.first() else {
            warn!(group = handler.group(), "handler has no dispatch name, skipping");
            return None;
        };
        let group = handler.group().to_owned();
        let canonical = canonicalize(primary, &group);

        let slot = if let Some(slot) = self.commands.iter().position(|c| c.meta.name == canonical) {
            debug!(command = %canonical, "merging registration into existing command");
            slot
        } else {
            let meta = CommandMeta::infer(&canonical, &group, &attributes);
            self.commands.push(RegisteredCommand { meta, handler });
            self.commands.len() - 1
        };

        let _ = self.bind(canonical.clone(), slot);
        for alias in names.iter().map(|n| n.to_ascii_lowercase()) {
            if alias == canonical {
                continue;
            }
            if self.bind(alias.clone(), slot) {
                if let Some(cmd) = self.commands.get_mut(slot) {
                    if let Err(pos) = cmd.meta.aliases.binary_search(&alias) {
                        cmd.meta.aliases.insert(pos, alias);
                    }
                }
            }
        }

        debug!(command = %canonical, group = %group, "command registered");
        Some(canonical)
    }

    /// Bind `name` to `slot`. Returns `true` if `name` now resolves to `slot`.
    fn bind(&mut self, name: String, slot: usize) -> bool {
        match self.index.get(&name) {
            Some(&existing) if existing == slot => true,
            Some(&existing) => {
                let kept = self
                    .commands
                    .get(existing)
                    .map_or("", |c| c.meta.name.as_str());
                warn!(name = %name, kept = %kept, "name collision, first registered wins");
                false
            }
            None => {
                let _ = self.index.insert(name, slot);
                true
            }
        }
    }

    /// Resolve a canonical name or alias, case-insensitively.
    ///
    /// Undotted names that are not registered aliases are also tried in
    /// canonical form.
    pub fn resolve(&self, method: &str) -> Option<&RegisteredCommand> {
        let key = method.trim().to_ascii_lowercase();
        self.index
            .get(&key)
            .or_else(|| self.index.get(&canonicalize(&key, "")))
            .and_then(|&slot| self.commands.get(slot))
    }

    /// Metadata for a name or alias.
    pub fn meta(&self, method: &str) -> Option<&CommandMeta> {
        self.resolve(method).map(|c| &c.meta)
    }

    /// Whether a name or alias is registered.
    pub fn contains(&self, method: &str) -> bool {
        self.resolve(method).is_some()
    }

    /// All commands sorted by canonical name.
    pub fn all(&self) -> Vec<&CommandMeta> {
        let mut metas: Vec<&CommandMeta> = self.commands.iter().map(|c| &c.meta).collect();
        metas.sort_by(|a, b| a.name.cmp(&b.name));
        metas
    }

    /// Case-insensitive substring search over name, aliases, category, and
    /// summary. Sorted by name, at most `limit` results.
    pub fn search(&self, query: &str, limit: usize) -> Vec<&CommandMeta> {
        self.all()
            .into_iter()
            .filter(|m| m.matches(query))
            .take(limit)
            .collect()
    }

    /// Number of canonical commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether no commands are registered.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{CommandKind, Risk};
    use cadbridge_core::errors::CommandError;
    use cadbridge_core::host::ExecutionScope;
    use cadbridge_core::logging::capture_logs;
    use cadbridge_core::request::CommandRequest;
    use serde_json::{Value, json};

    struct Named {
        names: &'static str,
        group: &'static str,
        tag: &'static str,
    }

    impl DomainCommandHandler for Named {
        fn dispatch_names(&self) -> &str {
            self.names
        }

        fn group(&self) -> &str {
            self.group
        }

        fn execute(
            &self,
            _scope: &mut dyn ExecutionScope,
            _request: &CommandRequest,
        ) -> Result<Value, CommandError> {
            Ok(json!({ "tag": self.tag }))
        }
    }

    fn handler(names: &'static str, group: &'static str, tag: &'static str) -> Arc<dyn DomainCommandHandler> {
        Arc::new(Named { names, group, tag })
    }

    #[test]
    fn legacy_names_resolve_to_one_command() {
        let mut reg = CommandRegistry::new();
        let canonical = reg
            .register(handler("Wall_Create|create_wall", "ElementOps/Wall", "w"), CommandAttributes::default())
            .unwrap();
        assert_eq!(canonical, "element.wall_create");
        for name in ["Wall_Create", "create_wall", "ELEMENT.WALL_CREATE", "wall_create"] {
            assert_eq!(reg.meta(name).unwrap().name, "element.wall_create", "{name}");
        }
        assert_eq!(
            reg.meta("create_wall").unwrap().aliases,
            vec!["create_wall", "wall_create"]
        );
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn same_canonical_merges_aliases_first_meta_wins() {
        let mut reg = CommandRegistry::new();
        let _ = reg.register(
            handler("get_walls", "ElementOps/Wall", "first"),
            CommandAttributes {
                summary: Some("first".into()),
                ..CommandAttributes::default()
            },
        );
        let _ = reg.register(
            handler("element.get_walls|walls_list", "ElementOps/Other", "second"),
            CommandAttributes {
                summary: Some("second".into()),
                ..CommandAttributes::default()
            },
        );
        let meta = reg.meta("walls_list").unwrap();
        assert_eq!(meta.name, "element.get_walls");
        assert_eq!(meta.summary, "first");
        assert_eq!(meta.category, "ElementOps/Wall");
        assert_eq!(meta.aliases, vec!["get_walls", "walls_list"]);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn alias_collision_keeps_first_and_warns() {
        let (logs, _guard) = capture_logs();
        let mut reg = CommandRegistry::new();
        let _ = reg.register(handler("move_element|move", "ElementOps", "a"), CommandAttributes::default());
        let _ = reg.register(handler("move_view|move", "ViewOps", "b"), CommandAttributes::default());
        assert_eq!(reg.meta("move").unwrap().name, "element.move_element");
        assert!(reg.meta("view.move_view").unwrap().aliases.iter().all(|a| a != "move"));
        assert!(logs.has_event(tracing::Level::WARN, "first registered wins"));
    }

    #[test]
    fn unknown_method_is_none() {
        let reg = CommandRegistry::new();
        assert!(reg.resolve("element.nope").is_none());
        assert!(!reg.contains(""));
    }

    #[test]
    fn handler_without_names_is_skipped() {
        let mut reg = CommandRegistry::new();
        assert!(reg.register(handler(" | ", "ElementOps", "x"), CommandAttributes::default()).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn declared_name_and_aliases_are_used() {
        let mut reg = CommandRegistry::new();
        let canonical = reg.register(
            handler("legacy_delete", "ElementOps", "d"),
            CommandAttributes {
                name: Some("element.delete_elements".into()),
                aliases: vec!["remove_elements".into()],
                ..CommandAttributes::default()
            },
        );
        assert_eq!(canonical.as_deref(), Some("element.delete_elements"));
        let meta = reg.meta("remove_elements").unwrap();
        assert_eq!(meta.risk, Risk::High);
        assert_eq!(meta.kind, CommandKind::Write);
        assert_eq!(meta.aliases, vec!["legacy_delete", "remove_elements"]);
    }

    #[test]
    fn all_is_sorted_and_search_filters() {
        let mut reg = CommandRegistry::new();
        let _ = reg.register(handler("get_sheets", "ElementOps", "s"), CommandAttributes::default());
        let _ = reg.register(handler("wall_create", "ElementOps/Wall", "w"), CommandAttributes::default());
        let _ = reg.register(handler("get_views", "ViewOps", "v"), CommandAttributes::default());
        let names: Vec<&str> = reg.all().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["element.wall_create", "sheet.list", "view.get_views"]);

        let hits: Vec<&str> = reg.search("WALL", 10).iter().map(|m| m.name.as_str()).collect();
        assert_eq!(hits, vec!["element.wall_create"]);
        assert_eq!(reg.search("", 2).len(), 2);
        assert_eq!(reg.meta("get_sheets").unwrap().name, "sheet.list");
    }

    #[test]
    fn resolved_handler_is_the_registered_one() {
        let mut reg = CommandRegistry::new();
        let _ = reg.register(handler("get_views", "ViewOps", "views"), CommandAttributes::default());
        let cmd = reg.resolve("view.get_views").unwrap();
        assert_eq!(cmd.handler.dispatch_names(), "get_views");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn leak(names: Vec<String>) -> &'static str {
            Box::leak(names.join("|").into_boxed_str())
        }

        proptest! {
            #[test]
            fn every_legacy_name_resolves_to_the_same_meta(
                names in proptest::collection::hash_set("[a-z]{1,6}_[a-z]{1,6}", 1..6)
            ) {
                let names: Vec<String> = names.into_iter().collect();
                let mut reg = CommandRegistry::new();
                let canonical = reg
                    .register(handler(leak(names.clone()), "ElementOps", "p"), CommandAttributes::default())
                    .unwrap();
                prop_assert_eq!(reg.len(), 1);
                for name in &names {
                    prop_assert_eq!(&reg.meta(name).unwrap().name, &canonical);
                }
            }
        }
    }
}
