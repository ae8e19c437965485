//! Layered settings: defaults, then the user file, then environment.
//!
//! Loading flow:
//! 1. Start with compiled [`EngineSettings::default()`]
//! 2. If `settings.json` exists in [`settings_dir`], overlay its keys on the defaults
//! 3. Apply `CADBRIDGE_*` environment overrides (highest priority)
//! 4. Validate the result

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::EngineSettings;

/// Directory holding settings and the wait-mode record.
///
/// `CADBRIDGE_HOME` when set, else `~/.cadbridge`.
pub fn settings_dir() -> PathBuf {
    settings_dir_from(|name| std::env::var_os(name))
}

fn settings_dir_from(lookup: impl Fn(&str) -> Option<std::ffi::OsString>) -> PathBuf {
    if let Some(dir) = lookup("CADBRIDGE_HOME").filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    lookup("HOME")
        .filter(|h| !h.is_empty())
        .map_or_else(std::env::temp_dir, PathBuf::from)
        .join(".cadbridge")
}

/// Resolve the path to the settings file (`~/.cadbridge/settings.json`).
pub fn settings_path() -> PathBuf {
    settings_dir().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<EngineSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON or invalid values are errors.
pub fn load_settings_from_path(path: &Path) -> Result<EngineSettings> {
    let mut settings = read_layered(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn read_layered(path: &Path) -> Result<EngineSettings> {
    let mut layered = serde_json::to_value(EngineSettings::default())?;
    if path.exists() {
        debug!(?path, "overlaying settings file on defaults");
        let user: Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        overlay(&mut layered, user);
    } else {
        debug!(?path, "no settings file, using defaults");
    }
    Ok(serde_json::from_value(layered)?)
}

/// Write the keys of `user` over `base`, descending into sections.
///
/// A `null` in the file means "keep the default"; any other non-object value
/// replaces the default outright.
pub fn overlay(base: &mut Value, user: Value) {
    match (base, user) {
        (Value::Object(sections), Value::Object(user)) => {
            for (key, value) in user {
                match sections.get_mut(&key) {
                    Some(slot) => overlay(slot, value),
                    None if !value.is_null() => {
                        let _ = sections.insert(key, value);
                    }
                    None => {}
                }
            }
        }
        (_, Value::Null) => {}
        (base, user) => *base = user,
    }
}

/// Apply environment variable overrides.
///
/// Integers must parse and fall within range; invalid values are logged
/// and ignored.
pub fn apply_env_overrides(settings: &mut EngineSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

fn apply_overrides_from(settings: &mut EngineSettings, lookup: impl Fn(&str) -> Option<String>) {
    let read_u64 = |name: &str, min: u64, max: u64| {
        let val = lookup(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid integer env var, ignoring");
        }
        result
    };

    // ── Throttle ────────────────────────────────────────────────────
    if let Some(v) = read_u64("CADBRIDGE_THROTTLE_DEFAULT_MS", 1, 60_000) {
        settings.throttle.default_ms = v;
    }
    if let Some(v) = read_u64("CADBRIDGE_THROTTLE_MIN_MS", 1, 60_000) {
        settings.throttle.min_ms = v;
    }
    if let Some(v) = read_u64("CADBRIDGE_THROTTLE_MAX_MS", 1, 60_000) {
        settings.throttle.max_ms = v;
    }

    // ── Confirmation / transactions ─────────────────────────────────
    if let Some(v) = read_u64("CADBRIDGE_CONFIRM_TTL_SECS", 1, 86_400) {
        settings.confirmation.ttl_secs = v;
    }
    if let Some(v) = read_u64("CADBRIDGE_TX_SLICE_MS", 100, 600_000) {
        settings.transaction.slice_budget_ms = v;
    }

    // ── Executor ────────────────────────────────────────────────────
    if let Some(v) = read_u64("CADBRIDGE_QUEUE_CAPACITY", 1, 65_536) {
        settings.executor.queue_capacity = usize::try_from(v).unwrap_or(settings.executor.queue_capacity);
    }
    if let Some(v) = read_u64("CADBRIDGE_REQUEST_TIMEOUT_MS", 100, 3_600_000) {
        settings.executor.request_timeout_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = lookup("CADBRIDGE_LOG_LEVEL").filter(|v| !v.is_empty()) {
        settings.logging.level = v;
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = read_layered(&dir.path().join("nope.json")).unwrap();
        assert_eq!(s, EngineSettings::default());
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"throttle": {"maxMs": 800}, "logging": {"level": "debug"}}"#,
        )
        .unwrap();
        let s = read_layered(&path).unwrap();
        assert_eq!(s.throttle.max_ms, 800);
        assert_eq!(s.throttle.min_ms, 100);
        assert_eq!(s.logging.level, "debug");
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_matches!(read_layered(&path), Err(SettingsError::Json(_)));
    }

    #[test]
    fn invalid_values_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"throttle": {"minMs": 900}}"#).unwrap();
        assert_matches!(
            load_settings_from_path(&path),
            Err(SettingsError::Invalid { key: "throttle.minMs", .. })
        );
    }

    #[test]
    fn overlay_keeps_defaults_for_nulls_and_replaces_arrays() {
        let mut base = json!({"throttle": {"minMs": 100, "steps": [1, 2]}, "logging": {"level": "info"}});
        overlay(
            &mut base,
            json!({"throttle": {"steps": [9], "maxMs": 700}, "logging": null}),
        );
        assert_eq!(
            base,
            json!({"throttle": {"minMs": 100, "steps": [9], "maxMs": 700}, "logging": {"level": "info"}})
        );
    }

    #[test]
    fn settings_dir_prefers_cadbridge_home() {
        let vars = |pairs: &'static [(&'static str, &'static str)]| {
            move |name: &str| {
                pairs
                    .iter()
                    .find(|(k, _)| *k == name)
                    .map(|(_, v)| std::ffi::OsString::from(v))
            }
        };
        assert_eq!(
            settings_dir_from(vars(&[("CADBRIDGE_HOME", "/srv/cad"), ("HOME", "/home/u")])),
            PathBuf::from("/srv/cad")
        );
        assert_eq!(
            settings_dir_from(vars(&[("HOME", "/home/u")])),
            PathBuf::from("/home/u/.cadbridge")
        );
        assert_eq!(settings_dir_from(vars(&[])), std::env::temp_dir().join(".cadbridge"));
    }

    #[test]
    fn env_overrides_apply() {
        let mut s = EngineSettings::default();
        apply_overrides_from(
            &mut s,
            env(&[
                ("CADBRIDGE_THROTTLE_MAX_MS", "900"),
                ("CADBRIDGE_CONFIRM_TTL_SECS", "60"),
                ("CADBRIDGE_QUEUE_CAPACITY", "16"),
                ("CADBRIDGE_LOG_LEVEL", "trace"),
            ]),
        );
        assert_eq!(s.throttle.max_ms, 900);
        assert_eq!(s.confirmation.ttl_secs, 60);
        assert_eq!(s.executor.queue_capacity, 16);
        assert_eq!(s.logging.level, "trace");
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut s = EngineSettings::default();
        apply_overrides_from(
            &mut s,
            env(&[
                ("CADBRIDGE_THROTTLE_MIN_MS", "fast"),
                ("CADBRIDGE_TX_SLICE_MS", "5"),
            ]),
        );
        assert_eq!(s.throttle.min_ms, 100);
        assert_eq!(s.transaction.slice_budget_ms, 2500);
    }

    #[test]
    fn parse_u64_range_bounds() {
        assert_eq!(parse_u64_range("250", 100, 600), Some(250));
        assert_eq!(parse_u64_range(" 100 ", 100, 600), Some(100));
        assert_eq!(parse_u64_range("601", 100, 600), None);
        assert_eq!(parse_u64_range("-1", 0, 600), None);
        assert_eq!(parse_u64_range("abc", 0, 600), None);
    }
}
