//! Command requests and the control fields lifted out of raw parameters.
//!
//! Callers may embed control fields (`dryRun`, `confirmToken`,
//! `idempotencyKey`, and `expect*`/`__expect*` expectations) directly in
//! `params`. [`split_controls`] removes them before normalization so they
//! never reach handlers or parameter fingerprints.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::RequestId;

/// Opt-in context expectations checked before any handler runs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Expectations {
    /// Expected host process id.
    pub pid: Option<u32>,
    /// Expected persistent document identity.
    pub project_guid: Option<String>,
    /// Expected document title, used only when no GUID is expected.
    pub project_title: Option<String>,
    /// View that must exist in the document.
    pub view_id: Option<i64>,
    /// Require [`Self::view_id`] to be the active view.
    pub view_active: bool,
}

impl Expectations {
    /// True when no check is requested.
    pub fn is_empty(&self) -> bool {
        self.pid.is_none()
            && self.project_guid.is_none()
            && self.project_title.is_none()
            && self.view_id.is_none()
    }

    /// True when a check needs an open document.
    pub fn needs_document(&self) -> bool {
        self.project_guid.is_some() || self.project_title.is_some() || self.view_id.is_some()
    }

    /// Fill unset fields from `other`. Fields already set win.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self {
            pid: self.pid.or(other.pid),
            project_guid: self.project_guid.or(other.project_guid),
            project_title: self.project_title.or(other.project_title),
            view_id: self.view_id.or(other.view_id),
            view_active: self.view_active || other.view_active,
        }
    }
}

/// Control fields extracted from a raw parameter object.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Controls {
    /// Preview only; issue a confirmation token for risky writes.
    pub dry_run: bool,
    /// Token from a previous dry-run.
    pub confirm_token: Option<String>,
    /// Client-chosen retry key.
    pub idempotency_key: Option<String>,
    /// Expectation fields found in params.
    pub expectations: Expectations,
}

/// A request after canonicalization and normalization.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    /// Request id.
    pub id: RequestId,
    /// Method name as sent by the caller.
    pub raw_method: String,
    /// Canonical command name.
    pub canonical_method: String,
    /// Normalized parameters, control fields removed.
    pub params: Value,
    /// Confirmation token, if supplied.
    pub confirm_token: Option<String>,
    /// Idempotency key, if supplied.
    pub idempotency_key: Option<String>,
    /// Whether this is a dry-run.
    pub dry_run: bool,
    /// Expectations checked before execution.
    pub expectations: Expectations,
}

impl CommandRequest {
    /// Parameter by key.
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// Integer parameter by key.
    pub fn param_i64(&self, key: &str) -> Option<i64> {
        self.param(key).and_then(Value::as_i64)
    }

    /// String parameter by key.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.param(key).and_then(Value::as_str)
    }
}

const EXPECT_KEYS: &[&str] = &[
    "expectPid",
    "expectProjectGuid",
    "expectProjectTitle",
    "expectViewId",
    "expectViewActive",
];

/// Whether `key` is a control field rather than a handler parameter.
pub fn is_control_key(key: &str) -> bool {
    let bare = key.strip_prefix("__").unwrap_or(key);
    matches!(bare, "dryRun" | "confirmToken" | "idempotencyKey") || EXPECT_KEYS.contains(&bare)
}

/// Remove control fields from a parameter object.
///
/// Non-object params are returned untouched with default controls.
pub fn split_controls(params: Value) -> (Value, Controls) {
    let Value::Object(map) = params else {
        return (params, Controls::default());
    };

    let mut controls = Controls::default();
    let mut rest = Map::with_capacity(map.len());
    for (key, value) in map {
        if !is_control_key(&key) {
            let _ = rest.insert(key, value);
            continue;
        }
        match key.strip_prefix("__").unwrap_or(&key) {
            "dryRun" => controls.dry_run = as_bool(&value).unwrap_or(false),
            "confirmToken" => controls.confirm_token = as_text(&value),
            "idempotencyKey" => controls.idempotency_key = as_text(&value),
            "expectPid" => controls.expectations.pid = as_i64(&value).and_then(|n| u32::try_from(n).ok()),
            "expectProjectGuid" => controls.expectations.project_guid = as_text(&value),
            "expectProjectTitle" => controls.expectations.project_title = as_text(&value),
            "expectViewId" => controls.expectations.view_id = as_i64(&value),
            "expectViewActive" => controls.expectations.view_active = as_bool(&value).unwrap_or(false),
            _ => {}
        }
    }
    (Value::Object(rest), controls)
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        _ => None,
    }
}
