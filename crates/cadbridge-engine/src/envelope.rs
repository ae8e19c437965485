//! The standard result envelope.
//!
//! Every response, success or failure, has the same shape:
//! `{ ok, code, msg, warnings, nextActions, timings, context, data? }`.
//! [`ResultEnvelope::from_raw`] wraps whatever a handler returned. It only
//! adds: unknown top-level keys are carried through untouched, and the
//! fallback spellings `success`, `errorCode`, and `message` are read without
//! being removed.

use std::cmp::Ordering;

use cadbridge_core::constants::ID_FIELDS;
use cadbridge_core::errors::{ERROR, OK};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Execution timings in milliseconds.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Timings {
    /// Handler execution time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exec_ms: Option<u64>,
    /// Time spent waiting in the queue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_wait_ms: Option<u64>,
    /// Total time inside the engine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_ms: Option<u64>,
    /// Time the host transaction was held, for writes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_ms: Option<u64>,
    /// Handler-supplied timing fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Where the request ran.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvelopeContext {
    /// Canonical method (raw name when unresolved).
    pub method: String,
    /// Document key.
    pub document_key: Option<String>,
    /// Document mutation counter.
    pub document_revision: Option<u64>,
    /// Active view id.
    pub active_view_id: Option<i64>,
    /// Active view name.
    pub active_view_name: Option<String>,
    /// Digest of document, view, revision, and selection.
    pub context_token: String,
    /// Version tag of `context_token`.
    pub context_token_version: String,
    /// Additional fields such as `paramIssues`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response to one command.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEnvelope {
    /// Whether the command succeeded.
    pub ok: bool,
    /// Machine-readable outcome.
    pub code: String,
    /// Human-readable outcome.
    pub msg: String,
    /// Non-fatal observations.
    pub warnings: Vec<Value>,
    /// Suggested follow-up calls.
    pub next_actions: Vec<Value>,
    /// Timings.
    pub timings: Timings,
    /// Execution context.
    pub context: EnvelopeContext,
    /// Payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Handler fields outside the standard shape.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

const OWNED_KEYS: &[&str] = &[
    "ok",
    "code",
    "msg",
    "warnings",
    "nextActions",
    "timings",
    "context",
    "data",
];

impl ResultEnvelope {
    /// Successful envelope carrying `data`.
    pub fn success(data: Value) -> Self {
        Self::from_raw(Value::Null).with_data(data)
    }

    /// Failed envelope.
    pub fn error(code: &str, msg: impl Into<String>, details: Option<Value>) -> Self {
        Self {
            ok: false,
            code: code.to_owned(),
            msg: msg.into(),
            data: details,
            ..Self::default()
        }
    }

    /// Wrap a raw handler return value.
    pub fn from_raw(raw: Value) -> Self {
        let mut map = match raw {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Self {
                    ok: true,
                    code: OK.to_owned(),
                    msg: OK.to_owned(),
                    data: Some(other),
                    ..Self::default()
                };
            }
        };

        let ok = map
            .get("ok")
            .and_then(Value::as_bool)
            .or_else(|| map.get("success").and_then(Value::as_bool))
            .unwrap_or(true);
        let code = text(&map, "code")
            .or_else(|| text(&map, "errorCode"))
            .unwrap_or(if ok { OK } else { ERROR })
            .to_owned();
        let msg = text(&map, "msg")
            .or_else(|| text(&map, "message"))
            .map_or_else(|| code.clone(), str::to_owned);
        let warnings = match map.remove("warnings") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => vec![other],
        };
        let next_actions = match map.remove("nextActions") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => vec![other],
        };
        let timings = match map.remove("timings") {
            Some(v @ Value::Object(_)) => parse_or_extra(v),
            _ => Timings::default(),
        };
        let context = match map.remove("context") {
            Some(v @ Value::Object(_)) => parse_or_extra(v),
            _ => EnvelopeContext::default(),
        };
        let data = map.remove("data").filter(|v| !v.is_null());
        for key in OWNED_KEYS {
            let _ = map.remove(*key);
        }

        Self {
            ok,
            code,
            msg,
            warnings,
            next_actions,
            timings,
            context,
            data,
            extra: map,
        }
    }

    /// Replace the payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Set the human-readable message.
    #[must_use]
    pub fn with_msg(mut self, msg: impl Into<String>) -> Self {
        self.msg = msg.into();
        self
    }

    /// Append a suggested follow-up call.
    #[must_use]
    pub fn with_next_action(mut self, action: Value) -> Self {
        self.next_actions.push(action);
        self
    }

    /// Append a warning line.
    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(Value::String(warning.into()));
    }

    /// Fill timing fields the handler left unset.
    pub fn fill_timings(&mut self, exec_ms: u64, queue_wait_ms: u64, total_ms: u64) {
        let _ = self.timings.exec_ms.get_or_insert(exec_ms);
        let _ = self.timings.queue_wait_ms.get_or_insert(queue_wait_ms);
        let _ = self.timings.total_ms.get_or_insert(total_ms);
    }

    /// Sort id-keyed arrays in `data` and extra fields.
    pub fn sort_id_arrays(&mut self) {
        if let Some(data) = self.data.as_mut() {
            sort_id_arrays(data);
        }
        for value in self.extra.values_mut() {
            sort_id_arrays(value);
        }
    }

    /// Wire form.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn text<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str).filter(|s| !s.trim().is_empty())
}

/// Parse a sub-object; mistyped standard fields keep everything as extras.
fn parse_or_extra<T>(value: Value) -> T
where
    T: for<'de> Deserialize<'de> + Default + WithExtra,
{
    match serde_json::from_value::<T>(value.clone()) {
        Ok(parsed) => parsed,
        Err(_) => {
            let mut fallback = T::default();
            if let Value::Object(map) = value {
                *fallback.extra_mut() = map;
            }
            fallback
        }
    }
}

trait WithExtra {
    fn extra_mut(&mut self) -> &mut Map<String, Value>;
}

impl WithExtra for Timings {
    fn extra_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.extra
    }
}

impl WithExtra for EnvelopeContext {
    fn extra_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.extra
    }
}

// ── Id-array sorting ────────────────────────────────────────────────

/// Sort arrays of objects that all carry the same id field, recursively.
///
/// The id field is the first of [`ID_FIELDS`] present in every element with
/// a consistent type (all integers or all strings). Other arrays keep their
/// order.
pub fn sort_id_arrays(value: &mut Value) {
    match value {
        Value::Array(items) => {
            for item in items.iter_mut() {
                sort_id_arrays(item);
            }
            if let Some(field) = common_id_field(items) {
                items.sort_by(|a, b| compare_ids(a.get(field), b.get(field)));
            }
        }
        Value::Object(map) => {
            for child in map.values_mut() {
                sort_id_arrays(child);
            }
        }
        _ => {}
    }
}

fn common_id_field(items: &[Value]) -> Option<&'static str> {
    if items.len() < 2 {
        return None;
    }
    ID_FIELDS.iter().copied().find(|field| {
        let all_int = items.iter().all(|i| i.get(*field).is_some_and(Value::is_i64));
        let all_str = items.iter().all(|i| i.get(*field).is_some_and(Value::is_string));
        all_int || all_str
    })
}

fn compare_ids(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x.as_i64().cmp(&y.as_i64()),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => Ordering::Equal,
    }
}
