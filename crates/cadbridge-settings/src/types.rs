//! Settings type definitions.
//!
//! All structs use `#[serde(rename_all = "camelCase", default)]` so a
//! partial settings file only overrides what it names.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// Queue polling backpressure.
    pub throttle: ThrottleSettings,
    /// Dry-run confirmation tokens.
    pub confirmation: ConfirmationSettings,
    /// Host transaction handling.
    pub transaction: TransactionSettings,
    /// Execution thread and request queue.
    pub executor: ExecutorSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl EngineSettings {
    /// Reject combinations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.throttle.validate()?;
        if self.confirmation.ttl_secs == 0 {
            return Err(SettingsError::invalid("confirmation.ttlSecs", "must be positive"));
        }
        if self.executor.queue_capacity == 0 {
            return Err(SettingsError::invalid("executor.queueCapacity", "must be positive"));
        }
        Ok(())
    }
}

/// Adaptive polling delay tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThrottleSettings {
    /// Starting delay.
    pub default_ms: u64,
    /// Lower bound.
    pub min_ms: u64,
    /// Upper bound.
    pub max_ms: u64,
    /// EWMA smoothing factor.
    pub alpha: f64,
    /// Additive increase step.
    pub additive_step_ms: u64,
    /// Multiplicative decrease factor.
    pub multiplicative_decrease: f64,
    /// Minimum time between two adjustments.
    pub cooldown_ms: u64,
    /// Raw counters reset after this many polls.
    pub reset_after_polls: u64,
    /// Empty-ratio EWMA above which the delay grows.
    pub empty_ratio_high: f64,
    /// Execution-time EWMA above which the delay shrinks.
    pub slow_exec_ms: f64,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            default_ms: 200,
            min_ms: 100,
            max_ms: 600,
            alpha: 0.25,
            additive_step_ms: 30,
            multiplicative_decrease: 0.70,
            cooldown_ms: 250,
            reset_after_polls: 200,
            empty_ratio_high: 0.8,
            slow_exec_ms: 300.0,
        }
    }
}

impl ThrottleSettings {
    /// Check bounds and factors.
    pub fn validate(&self) -> Result<()> {
        if self.min_ms == 0 || self.min_ms > self.max_ms {
            return Err(SettingsError::invalid(
                "throttle.minMs",
                format!("need 0 < minMs <= maxMs, got {}..{}", self.min_ms, self.max_ms),
            ));
        }
        if !(self.min_ms..=self.max_ms).contains(&self.default_ms) {
            return Err(SettingsError::invalid(
                "throttle.defaultMs",
                format!("{} outside {}..{}", self.default_ms, self.min_ms, self.max_ms),
            ));
        }
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(SettingsError::invalid("throttle.alpha", format!("{} outside (0, 1]", self.alpha)));
        }
        if !(self.multiplicative_decrease > 0.0 && self.multiplicative_decrease < 1.0) {
            return Err(SettingsError::invalid(
                "throttle.multiplicativeDecrease",
                format!("{} outside (0, 1)", self.multiplicative_decrease),
            ));
        }
        Ok(())
    }
}

/// Dry-run confirmation settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfirmationSettings {
    /// Token lifetime.
    pub ttl_secs: u64,
}

impl Default for ConfirmationSettings {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}

/// Host transaction settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionSettings {
    /// Open-transaction time after which a checkpoint commits and reopens.
    pub slice_budget_ms: u64,
}

impl Default for TransactionSettings {
    fn default() -> Self {
        Self {
            slice_budget_ms: 2500,
        }
    }
}

/// Execution thread settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutorSettings {
    /// Bounded request queue size.
    pub queue_capacity: usize,
    /// How long a caller waits for its envelope.
    pub request_timeout_ms: u64,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            request_timeout_ms: 60_000,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_match_documented_values() {
        let s = EngineSettings::default();
        assert_eq!(s.throttle.default_ms, 200);
        assert_eq!(s.throttle.min_ms, 100);
        assert_eq!(s.throttle.max_ms, 600);
        assert_eq!(s.confirmation.ttl_secs, 300);
        assert_eq!(s.transaction.slice_budget_ms, 2500);
        assert_eq!(s.executor.queue_capacity, 256);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn serializes_camel_case() {
        let v = serde_json::to_value(EngineSettings::default()).unwrap();
        assert_eq!(v["throttle"]["additiveStepMs"], 30);
        assert_eq!(v["transaction"]["sliceBudgetMs"], 2500);
        assert_eq!(v["executor"]["requestTimeoutMs"], 60_000);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: EngineSettings =
            serde_json::from_value(json!({"throttle": {"maxMs": 900}})).unwrap();
        assert_eq!(s.throttle.max_ms, 900);
        assert_eq!(s.throttle.min_ms, 100);
        assert_eq!(s.logging.level, "info");
    }

    #[test]
    fn inverted_bounds_rejected() {
        let mut s = EngineSettings::default();
        s.throttle.min_ms = 700;
        assert!(s.validate().is_err());
    }

    #[test]
    fn default_outside_bounds_rejected() {
        let mut t = ThrottleSettings::default();
        t.default_ms = 50;
        assert!(t.validate().is_err());
    }

    #[test]
    fn alpha_must_be_in_unit_interval() {
        let mut t = ThrottleSettings::default();
        t.alpha = 0.0;
        assert!(t.validate().is_err());
        t.alpha = 1.0;
        assert!(t.validate().is_ok());
    }

    #[test]
    fn zero_ttl_rejected() {
        let mut s = EngineSettings::default();
        s.confirmation.ttl_secs = 0;
        assert!(s.validate().is_err());
    }
}
