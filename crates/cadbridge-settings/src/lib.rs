//! # cadbridge-settings
//!
//! Layered engine settings and the persisted wait-mode record.
//!
//! - [`load_settings`]: compiled defaults, `settings.json` overlaid from `CADBRIDGE_HOME` or `~/.cadbridge`,
//!   then `CADBRIDGE_*` environment overrides
//! - [`WaitConfig`]: the `{ waitMode, manualMs }` record rewritten whenever the
//!   throttle mode changes

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;
pub mod wait_config;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path, settings_path};
pub use types::{
    ConfirmationSettings, EngineSettings, ExecutorSettings, LoggingSettings, ThrottleSettings,
    TransactionSettings,
};
pub use wait_config::{WaitConfig, WaitMode, load_wait_config, save_wait_config, wait_config_path};
