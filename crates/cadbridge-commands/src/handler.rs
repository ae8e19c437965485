//! The domain command handler seam.

use cadbridge_core::errors::CommandError;
use cadbridge_core::host::{ExecutionScope, HostDocument};
use cadbridge_core::request::CommandRequest;
use serde_json::Value;

/// A domain operation exposed to callers.
///
/// Handlers run on the execution thread. Write commands receive a
/// transactional scope and should call [`ExecutionScope::checkpoint`]
/// between units of work in long batches.
pub trait DomainCommandHandler: Send + Sync {
    /// One or more legacy dispatch names, pipe-delimited.
    fn dispatch_names(&self) -> &str;

    /// Logical grouping such as `ElementOps/Wall`; drives domain and
    /// category inference.
    fn group(&self) -> &str {
        ""
    }

    /// Run the command.
    fn execute(
        &self,
        scope: &mut dyn ExecutionScope,
        request: &CommandRequest,
    ) -> Result<Value, CommandError>;

    /// Describe what a dry-run of this request would do, without mutating.
    fn preview(
        &self,
        _host: &dyn HostDocument,
        _request: &CommandRequest,
    ) -> Result<Option<Value>, CommandError> {
        Ok(None)
    }
}
