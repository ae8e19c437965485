//! Adaptive polling delay for the execution thread.
//!
//! The consumer loop reports every poll and every processed batch. On
//! [`AdaptiveThrottle::adjust`] (rate-limited by a cooldown) the delay
//! shrinks multiplicatively while work is flowing or execution runs long,
//! and grows additively while polls come back empty or timeouts/conflicts
//! were reported. The delay is always clamped to `[min_ms, max_ms]`.
//!
//! Manual mode pins the delay. Mode changes and nudges are persisted as a
//! [`WaitConfig`] when a persistence path is configured.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use cadbridge_settings::{ThrottleSettings, WaitConfig, WaitMode, save_wait_config};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

/// Point-in-time view of the throttle state.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrottleSnapshot {
    /// Delay the consumer should sleep now.
    pub current_ms: u64,
    /// Auto or manual.
    pub mode: WaitMode,
    /// Delay used in manual mode.
    pub manual_ms: u64,
    /// Smoothed ratio of empty polls.
    pub empty_ratio_ewma: f64,
    /// Smoothed items processed per second of execution.
    pub processed_per_sec_ewma: f64,
    /// Smoothed execution time per batch.
    pub exec_ms_ewma: f64,
    /// Polls in the current window.
    pub total_polls: u64,
    /// Empty polls in the current window.
    pub empty_polls: u64,
    /// Items processed in the current window.
    pub total_processed: u64,
    /// Timeouts in the current window.
    pub timeouts: u64,
    /// Transaction conflicts in the current window.
    pub conflicts: u64,
}

struct Inner {
    current_ms: u64,
    mode: WaitMode,
    manual_ms: u64,
    ewma_empty_ratio: f64,
    ewma_processed_per_sec: f64,
    ewma_exec_ms: f64,
    last_adjust: Option<Instant>,
    total_polls: u64,
    empty_polls: u64,
    total_processed: u64,
    timeouts: u64,
    conflicts: u64,
}

impl Inner {
    fn reset_window(&mut self) {
        self.total_polls = 0;
        self.empty_polls = 0;
        self.total_processed = 0;
        self.timeouts = 0;
        self.conflicts = 0;
    }

    fn wait_config(&self) -> WaitConfig {
        WaitConfig {
            wait_mode: self.mode,
            manual_ms: self.manual_ms,
        }
    }
}

/// AIMD polling delay controller.
pub struct AdaptiveThrottle {
    settings: ThrottleSettings,
    inner: Mutex<Inner>,
    persist_path: Option<PathBuf>,
}

#[allow(clippy::float_cmp)]
fn ewma(prev: f64, x: f64, alpha: f64) -> f64 {
    if prev == 0.0 {
        x
    } else {
        alpha * x + (1.0 - alpha) * prev
    }
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn scale(ms: u64, factor: f64) -> u64 {
    (ms as f64 * factor).round().max(0.0) as u64
}

impl AdaptiveThrottle {
    /// Auto-mode throttle starting at `settings.default_ms`.
    #[allow(clippy::cast_precision_loss)]
    pub fn new(settings: ThrottleSettings) -> Self {
        let default_ms = settings.default_ms;
        Self {
            inner: Mutex::new(Inner {
                current_ms: default_ms,
                mode: WaitMode::Auto,
                manual_ms: default_ms,
                ewma_empty_ratio: 1.0,
                ewma_processed_per_sec: 0.0,
                ewma_exec_ms: default_ms as f64,
                last_adjust: None,
                total_polls: 0,
                empty_polls: 0,
                total_processed: 0,
                timeouts: 0,
                conflicts: 0,
            }),
            settings,
            persist_path: None,
        }
    }

    /// Throttle restored from a persisted wait config.
    pub fn from_wait_config(settings: ThrottleSettings, config: &WaitConfig) -> Self {
        let throttle = Self::new(settings);
        {
            let mut inner = throttle.inner.lock();
            inner.mode = config.wait_mode;
            inner.manual_ms = throttle.clamp(config.manual_ms);
        }
        throttle
    }

    /// Persist mode changes to `path`.
    #[must_use]
    pub fn with_persistence(mut self, path: PathBuf) -> Self {
        self.persist_path = Some(path);
        self
    }

    fn clamp(&self, ms: u64) -> u64 {
        ms.clamp(self.settings.min_ms, self.settings.max_ms)
    }

    /// Delay before the next poll.
    pub fn current_delay(&self) -> Duration {
        let inner = self.inner.lock();
        Duration::from_millis(match inner.mode {
            WaitMode::Manual => inner.manual_ms,
            WaitMode::Auto => inner.current_ms,
        })
    }

    /// Record one poll of the queue.
    pub fn report_poll(&self, got_work: bool) {
        let mut inner = self.inner.lock();
        inner.total_polls += 1;
        if !got_work {
            inner.empty_polls += 1;
        }
    }

    /// Record `count` items executed in `exec`.
    #[allow(clippy::cast_precision_loss)]
    pub fn report_processed(&self, count: u64, exec: Duration) {
        let exec_ms = exec.as_secs_f64() * 1000.0;
        let alpha = self.settings.alpha;
        let mut inner = self.inner.lock();
        inner.total_processed += count;
        let rate = count as f64 * 1000.0 / exec_ms.max(1.0);
        inner.ewma_processed_per_sec = ewma(inner.ewma_processed_per_sec, rate, alpha);
        inner.ewma_exec_ms = ewma(inner.ewma_exec_ms, exec_ms, alpha);
    }

    /// Record a caller-side timeout.
    pub fn report_timeout(&self) {
        self.inner.lock().timeouts += 1;
    }

    /// Record a transaction conflict.
    pub fn report_conflict(&self) {
        self.inner.lock().conflicts += 1;
    }

    /// Adjust the delay if the cooldown has elapsed. Returns the delay.
    pub fn adjust(&self) -> Duration {
        self.adjust_at(Instant::now())
    }

    /// [`Self::adjust`] with an explicit clock.
    #[allow(clippy::cast_precision_loss)]
    pub fn adjust_at(&self, now: Instant) -> Duration {
        let s = &self.settings;
        let mut inner = self.inner.lock();
        if inner.mode == WaitMode::Manual {
            return Duration::from_millis(inner.manual_ms);
        }
        let cooling = inner
            .last_adjust
            .is_some_and(|at| now.saturating_duration_since(at) < Duration::from_millis(s.cooldown_ms));
        if cooling {
            return Duration::from_millis(inner.current_ms);
        }

        let empty_ratio = if inner.total_polls == 0 {
            1.0
        } else {
            inner.empty_polls as f64 / inner.total_polls as f64
        };
        inner.ewma_empty_ratio = ewma(inner.ewma_empty_ratio, empty_ratio, s.alpha);

        let mut next = inner.current_ms;
        let had_work = inner.total_processed > 0 && inner.total_polls > inner.empty_polls;
        if had_work || inner.ewma_exec_ms > s.slow_exec_ms {
            next = scale(inner.current_ms, s.multiplicative_decrease);
        }
        if inner.ewma_empty_ratio > s.empty_ratio_high || inner.timeouts > 0 || inner.conflicts > 0 {
            next = inner.current_ms + s.additive_step_ms;
        }
        let next = self.clamp(next);
        if next != inner.current_ms {
            debug!(from = inner.current_ms, to = next, "poll delay adjusted");
            inner.current_ms = next;
            inner.last_adjust = Some(now);
        }

        if inner.total_polls >= s.reset_after_polls {
            inner.reset_window();
        }
        Duration::from_millis(inner.current_ms)
    }

    /// Pin the delay to `ms` (clamped).
    pub fn set_manual(&self, ms: u64) {
        let config = {
            let mut inner = self.inner.lock();
            inner.mode = WaitMode::Manual;
            inner.manual_ms = self.clamp(ms);
            inner.wait_config()
        };
        self.persist(&config);
    }

    /// Return to adaptive mode, starting from the manual delay.
    pub fn set_auto(&self) {
        let config = {
            let mut inner = self.inner.lock();
            inner.mode = WaitMode::Auto;
            inner.current_ms = self.clamp(inner.manual_ms);
            inner.wait_config()
        };
        self.persist(&config);
    }

    /// Scale the active delay by `1 + pct` (`-0.1` is 10% faster).
    pub fn nudge_percent(&self, pct: f64) {
        let config = {
            let mut inner = self.inner.lock();
            match inner.mode {
                WaitMode::Manual => inner.manual_ms = self.clamp(scale(inner.manual_ms, 1.0 + pct)),
                WaitMode::Auto => inner.current_ms = self.clamp(scale(inner.current_ms, 1.0 + pct)),
            }
            inner.wait_config()
        };
        self.persist(&config);
    }

    /// Current mode and manual delay as a persistable record.
    pub fn wait_config(&self) -> WaitConfig {
        self.inner.lock().wait_config()
    }

    /// Full state for diagnostics.
    #[allow(clippy::cast_precision_loss)]
    pub fn snapshot(&self) -> ThrottleSnapshot {
        let inner = self.inner.lock();
        ThrottleSnapshot {
            current_ms: match inner.mode {
                WaitMode::Manual => inner.manual_ms,
                WaitMode::Auto => inner.current_ms,
            },
            mode: inner.mode,
            manual_ms: inner.manual_ms,
            empty_ratio_ewma: inner.ewma_empty_ratio,
            processed_per_sec_ewma: inner.ewma_processed_per_sec,
            exec_ms_ewma: inner.ewma_exec_ms,
            total_polls: inner.total_polls,
            empty_polls: inner.empty_polls,
            total_processed: inner.total_processed,
            timeouts: inner.timeouts,
            conflicts: inner.conflicts,
        }
    }

    fn persist(&self, config: &WaitConfig) {
        let Some(path) = &self.persist_path else {
            return;
        };
        if let Err(e) = save_wait_config(path, config) {
            warn!(error = %e, ?path, "failed to persist wait config");
        }
    }
}
