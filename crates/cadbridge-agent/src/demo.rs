//! Demo command handlers bound to [`MemoryHost`].

use std::sync::Arc;
use std::time::Duration;

use cadbridge_commands::{CommandAttributes, CommandKind, CommandRegistry, DomainCommandHandler};
use cadbridge_core::constants::SELECTION_STASH_MAX_AGE_MS;
use cadbridge_core::errors::{CommandError, HostError};
use cadbridge_core::host::{ExecutionScope, HostDocument};
use cadbridge_core::memory_host::MemoryHost;
use cadbridge_core::request::CommandRequest;
use cadbridge_guards::SelectionCache;
use serde_json::{Map, Value, json};

const DEFAULT_WALL_HEIGHT_MM: f64 = 3000.0;

/// Register every demo handler.
pub fn register_all(registry: &mut CommandRegistry, selection: &Arc<SelectionCache>) {
    let _ = registry.register(
        Arc::new(CreateWall),
        CommandAttributes {
            summary: Some("Create a straight wall between two points".into()),
            example: Some(json!({
                "method": "element.wall_create",
                "params": { "start": "0,0,0", "end": "5m,0,0", "height": "3m" },
            })),
            ..CommandAttributes::default()
        },
    );
    let _ = registry.register(
        Arc::new(DeleteElements {
            selection: Arc::clone(selection),
        }),
        CommandAttributes {
            summary: Some("Delete elements by id, or the current selection".into()),
            ..CommandAttributes::default()
        },
    );
    let _ = registry.register(
        Arc::new(ListElements),
        CommandAttributes {
            summary: Some("List elements, optionally filtered by category".into()),
            ..CommandAttributes::default()
        },
    );
    let _ = registry.register(
        Arc::new(SelectElements {
            selection: Arc::clone(selection),
        }),
        CommandAttributes {
            kind: Some(CommandKind::Read),
            summary: Some("Replace the current selection".into()),
            ..CommandAttributes::default()
        },
    );
    let _ = registry.register(
        Arc::new(UpdateParametersBatch),
        CommandAttributes {
            summary: Some("Set parameters on many elements in one call".into()),
            ..CommandAttributes::default()
        },
    );
}

fn unsupported_host() -> CommandError {
    CommandError::Internal {
        message: "demo handlers need the in-memory host".into(),
    }
}

fn memory_host(scope: &mut dyn ExecutionScope) -> Result<&mut MemoryHost, CommandError> {
    scope
        .host()
        .as_any_mut()
        .downcast_mut::<MemoryHost>()
        .ok_or_else(unsupported_host)
}

fn element_ids(request: &CommandRequest) -> Option<Vec<i64>> {
    let ids: Vec<i64> = request
        .param("elementIds")?
        .as_array()?
        .iter()
        .filter_map(Value::as_i64)
        .collect();
    (!ids.is_empty()).then_some(ids)
}

fn point(request: &CommandRequest, key: &str) -> Result<Value, CommandError> {
    request
        .param(key)
        .filter(|p| p.get("x").is_some_and(Value::is_number) && p.get("y").is_some_and(Value::is_number))
        .cloned()
        .ok_or_else(|| CommandError::invalid_params(format!("'{key}' must be a point")))
}

// ── Walls ───────────────────────────────────────────────────────────

struct CreateWall;

impl DomainCommandHandler for CreateWall {
    fn dispatch_names(&self) -> &str {
        "Wall_Create|create_wall"
    }

    fn group(&self) -> &str {
        "ElementOps/Wall"
    }

    fn execute(
        &self,
        scope: &mut dyn ExecutionScope,
        request: &CommandRequest,
    ) -> Result<Value, CommandError> {
        let start = point(request, "start")?;
        let end = point(request, "end")?;
        if start == end {
            return Err(CommandError::invalid_params("'start' and 'end' coincide"));
        }
        let height = request
            .param("height")
            .and_then(Value::as_f64)
            .unwrap_or(DEFAULT_WALL_HEIGHT_MM);
        let level = request.param_str("levelName").unwrap_or("Level 1").to_owned();

        let id = memory_host(scope)?.create_element(json!({
            "category": "Walls",
            "start": start,
            "end": end,
            "height": height,
            "levelName": level,
        }))?;
        Ok(json!({ "ok": true, "elementId": id }))
    }
}

// ── Deletion ────────────────────────────────────────────────────────

struct DeleteElements {
    selection: Arc<SelectionCache>,
}

impl DeleteElements {
    /// Explicit ids, else a fresh selection from the same document and view.
    fn targets(
        &self,
        host: &dyn HostDocument,
        request: &CommandRequest,
    ) -> Result<(Vec<i64>, bool), CommandError> {
        if let Some(ids) = element_ids(request) {
            return Ok((ids, false));
        }
        let doc = host.document().ok_or(HostError::NoDocument)?;
        let view = host.active_view().map(|v| v.id);
        self.selection
            .last_non_empty_matching(
                &doc.key,
                view,
                Duration::from_millis(SELECTION_STASH_MAX_AGE_MS),
            )
            .map(|s| (s.element_ids, true))
            .ok_or_else(|| CommandError::invalid_params("'elementIds' is required when nothing is selected"))
    }
}

impl DomainCommandHandler for DeleteElements {
    fn dispatch_names(&self) -> &str {
        "delete_elements|remove_elements"
    }

    fn group(&self) -> &str {
        "ElementOps"
    }

    fn execute(
        &self,
        scope: &mut dyn ExecutionScope,
        request: &CommandRequest,
    ) -> Result<Value, CommandError> {
        let (ids, from_selection) = self.targets(&*scope.host(), request)?;
        let host = memory_host(scope)?;
        let mut deleted = Vec::new();
        let mut missing = Vec::new();
        for id in ids {
            if host.delete_element(id)? {
                deleted.push(id);
            } else {
                missing.push(id);
            }
        }
        if deleted.is_empty() {
            return Err(CommandError::NotFound {
                message: format!("none of the elements exist: {missing:?}"),
            });
        }
        Ok(json!({
            "ok": true,
            "deleted": deleted,
            "missing": missing,
            "fromSelection": from_selection,
        }))
    }

    fn preview(
        &self,
        host: &dyn HostDocument,
        request: &CommandRequest,
    ) -> Result<Option<Value>, CommandError> {
        let (ids, from_selection) = self.targets(host, request)?;
        let memory = host
            .as_any()
            .downcast_ref::<MemoryHost>()
            .ok_or_else(unsupported_host)?;
        let (existing, missing): (Vec<i64>, Vec<i64>) =
            ids.into_iter().partition(|id| memory.element(*id).is_some());
        Ok(Some(json!({
            "wouldDelete": existing,
            "missing": missing,
            "fromSelection": from_selection,
        })))
    }
}

// ── Queries ─────────────────────────────────────────────────────────

struct ListElements;

impl DomainCommandHandler for ListElements {
    fn dispatch_names(&self) -> &str {
        "get_elements|list_elements"
    }

    fn group(&self) -> &str {
        "ElementOps"
    }

    fn execute(
        &self,
        scope: &mut dyn ExecutionScope,
        request: &CommandRequest,
    ) -> Result<Value, CommandError> {
        let host = scope
            .host()
            .as_any()
            .downcast_ref::<MemoryHost>()
            .ok_or_else(unsupported_host)?;
        let category = request.param_str("category").map(str::to_lowercase);
        let limit = request
            .param("limit")
            .and_then(Value::as_u64)
            .and_then(|l| usize::try_from(l).ok())
            .unwrap_or(usize::MAX);

        let elements: Vec<Value> = host
            .elements()
            .iter()
            .filter(|(_, e)| {
                category.as_deref().is_none_or(|c| {
                    e.get("category")
                        .and_then(Value::as_str)
                        .is_some_and(|ec| ec.to_lowercase() == c)
                })
            })
            .take(limit)
            .map(|(id, e)| {
                let mut row = Map::new();
                let _ = row.insert("elementId".into(), json!(id));
                if let Value::Object(fields) = e {
                    row.extend(fields.clone());
                }
                Value::Object(row)
            })
            .collect();
        Ok(json!({ "ok": true, "count": elements.len(), "elements": elements }))
    }
}

struct SelectElements {
    selection: Arc<SelectionCache>,
}

impl DomainCommandHandler for SelectElements {
    fn dispatch_names(&self) -> &str {
        "select_elements|set_selection"
    }

    fn group(&self) -> &str {
        "ElementOps"
    }

    fn execute(
        &self,
        scope: &mut dyn ExecutionScope,
        request: &CommandRequest,
    ) -> Result<Value, CommandError> {
        let host = scope.host();
        let doc = host.document().ok_or(HostError::NoDocument)?;
        let view = host.active_view().map(|v| v.id);
        let snapshot = self.selection.set(
            element_ids(request).unwrap_or_default(),
            doc.path.as_deref(),
            &doc.key,
            view,
        );
        Ok(json!({
            "ok": true,
            "count": snapshot.element_ids.len(),
            "selectionHash": snapshot.hash,
            "revision": snapshot.revision,
        }))
    }
}

// ── Batch parameters ────────────────────────────────────────────────

struct UpdateParametersBatch;

impl DomainCommandHandler for UpdateParametersBatch {
    fn dispatch_names(&self) -> &str {
        "update_parameters_batch|set_parameters_batch"
    }

    fn group(&self) -> &str {
        "ElementOps/Parameter"
    }

    fn execute(
        &self,
        scope: &mut dyn ExecutionScope,
        request: &CommandRequest,
    ) -> Result<Value, CommandError> {
        let items = request
            .param("items")
            .and_then(Value::as_array)
            .filter(|items| !items.is_empty())
            .ok_or_else(|| CommandError::invalid_params("'items' must be a non-empty array"))?;

        let mut updated = 0_u64;
        let mut skipped = Vec::new();
        for (index, item) in items.iter().enumerate() {
            let target = item.get("elementId").and_then(Value::as_i64);
            let params = item.get("params").and_then(Value::as_object);
            let (Some(id), Some(params)) = (target, params) else {
                skipped.push(json!({ "index": index, "reason": "elementId and params are required" }));
                continue;
            };

            let host = memory_host(scope)?;
            let mut found = true;
            for (key, value) in params {
                found &= host.set_element_field(id, key, value.clone())?;
            }
            if found {
                updated += 1;
            } else {
                skipped.push(json!({ "index": index, "elementId": id, "reason": "element not found" }));
            }
            scope.checkpoint()?;
        }
        Ok(json!({ "ok": true, "updated": updated, "skipped": skipped }))
    }
}
