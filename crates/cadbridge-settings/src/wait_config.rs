//! Persisted queue wait mode (`~/.cadbridge/config.json`).
//!
//! Read once at startup and rewritten whenever the wait mode or the manual
//! delay changes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::Result;
use crate::loader::settings_dir;

/// How the polling delay is chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitMode {
    /// Adaptive delay.
    #[default]
    Auto,
    /// Fixed delay of `manualMs`.
    Manual,
}

/// The persisted wait-mode record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WaitConfig {
    /// Current mode.
    pub wait_mode: WaitMode,
    /// Delay used in manual mode.
    pub manual_ms: u64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            wait_mode: WaitMode::Auto,
            manual_ms: 200,
        }
    }
}

/// Resolve the wait-config path (`~/.cadbridge/config.json`).
pub fn wait_config_path() -> PathBuf {
    settings_dir().join("config.json")
}

/// Load the record; a missing file yields the default.
pub fn load_wait_config(path: &Path) -> Result<WaitConfig> {
    if !path.exists() {
        debug!(?path, "wait config not found, using defaults");
        return Ok(WaitConfig::default());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Write the record, creating the parent directory.
///
/// Writes to a sibling temp file first and renames it into place.
pub fn save_wait_config(path: &Path, config: &WaitConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(config)?)?;
    std::fs::rename(&tmp, path)?;
    debug!(?path, mode = ?config.wait_mode, manual_ms = config.manual_ms, "wait config saved");
    Ok(())
}
