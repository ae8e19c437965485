//! Logging setup and test capture.
//!
//! Everything logs through `tracing`. Binaries call [`init_subscriber`] once;
//! tests use [`capture_logs`] to assert on emitted events.

pub mod test_utils;

pub use test_utils::{CapturedEvent, CapturedLogs, capture_logs};

use tracing_subscriber::EnvFilter;

/// Filter from `RUST_LOG`, falling back to `level`.
fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global stderr subscriber.
///
/// Thread names are included so lines from the execution thread stand out.
/// Only the first call takes effect.
pub fn init_subscriber(level: &str) {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .compact()
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!(level, "logging initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_ignored() {
        init_subscriber("warn");
        init_subscriber("debug");
    }
}
