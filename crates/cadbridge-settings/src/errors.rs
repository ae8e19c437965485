//! Settings errors.

use thiserror::Error;

/// Why settings could not be loaded, validated, or saved.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// File read or write failed.
    #[error("settings file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// The file was not valid JSON for the expected shape.
    #[error("settings JSON is malformed: {0}")]
    Json(#[from] serde_json::Error),
    /// A value is out of range or inconsistent with another.
    #[error("settings key {key} is invalid: {reason}")]
    Invalid {
        /// Dotted camelCase key, e.g. `throttle.alpha`.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl SettingsError {
    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
