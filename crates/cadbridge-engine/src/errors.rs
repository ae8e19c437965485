//! Engine-level errors.

use cadbridge_core::errors::ENGINE_UNAVAILABLE;

/// Failures between a transport and the execution thread.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The execution thread could not be started.
    #[error("failed to start execution thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// The execution thread has stopped.
    #[error("execution thread stopped")]
    Stopped,

    /// No reply within the request timeout.
    #[error("no response within {timeout_ms} ms")]
    Timeout {
        /// Configured timeout.
        timeout_ms: u64,
    },
}

impl EngineError {
    /// Wire code.
    pub fn code(&self) -> &'static str {
        ENGINE_UNAVAILABLE
    }
}
