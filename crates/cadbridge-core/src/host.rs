//! Seams between the engine and the host modeling application.
//!
//! The host API is single-threaded: one execution thread owns the
//! [`HostDocument`] and every mutation happens inside a host transaction.
//! Handlers never see the document directly; they receive an
//! [`ExecutionScope`] which may time-slice the surrounding transaction.

use std::any::Any;

use serde::{Deserialize, Serialize};

use crate::errors::HostError;

/// Identity of the open document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInfo {
    /// Stable per-document key used for binding tokens and caches.
    pub key: String,
    /// Persistent identity that survives reopen, when the host has one.
    pub guid: Option<String>,
    /// Display title.
    pub title: String,
    /// File path, if the document has been saved.
    pub path: Option<String>,
    /// Monotonic mutation counter.
    pub revision: u64,
}

/// Active view descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewInfo {
    /// Host element id of the view.
    pub id: i64,
    /// View name.
    pub name: String,
    /// View type (plan, section, sheet...).
    pub view_type: String,
}

/// Severity the host assigns to a failure raised during commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureSeverity {
    /// Non-fatal; the host can proceed if it is dismissed.
    Warning,
    /// Genuine error; proceeding requires the host to resolve it.
    Error,
}

/// A failure message raised by the host while committing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostFailure {
    /// Host failure definition code.
    pub code: String,
    /// Severity.
    pub severity: FailureSeverity,
    /// Description text.
    pub message: String,
}

/// What the resolver wants the host to do with one failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureDecision {
    /// Delete the warning or let the host resolve the error, then proceed.
    Dismiss,
    /// Abort the commit and roll back.
    RollBack,
}

/// Failure-resolution policy consulted by the host during commit.
pub trait FailureResolver {
    /// Decide the fate of a single failure.
    fn resolve(&mut self, failure: &HostFailure) -> FailureDecision;
}

/// The live document owned by the execution thread.
pub trait HostDocument: Send {
    /// Process id of the host application.
    fn process_id(&self) -> u32 {
        std::process::id()
    }

    /// Currently open document, if any.
    fn document(&self) -> Option<DocumentInfo>;

    /// Active view of the open document.
    fn active_view(&self) -> Option<ViewInfo>;

    /// Whether a view with this id exists in the open document.
    fn view_exists(&self, view_id: i64) -> bool;

    /// Open a named transaction.
    fn begin_transaction(&mut self, name: &str) -> Result<(), HostError>;

    /// Commit the open transaction, consulting `resolver` for every failure.
    ///
    /// If any failure is resolved with [`FailureDecision::RollBack`] the host
    /// rolls back and returns [`HostError::RolledBack`].
    fn commit_transaction(&mut self, resolver: &mut dyn FailureResolver) -> Result<(), HostError>;

    /// Roll back the open transaction. No-op when none is open.
    fn rollback_transaction(&mut self);

    /// Concrete host, for handlers bound to one host API.
    fn as_any(&self) -> &dyn Any;

    /// Concrete host, mutably.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Host access handed to a command handler for one invocation.
pub trait ExecutionScope {
    /// The live document.
    fn host(&mut self) -> &mut dyn HostDocument;

    /// Yield point for long batches.
    ///
    /// Transactional scopes commit and reopen here once the open transaction
    /// has exceeded its time budget.
    fn checkpoint(&mut self) -> Result<(), HostError>;

    /// Whether a host transaction is open around the handler.
    fn in_transaction(&self) -> bool;
}

/// Scope for read commands: no transaction, checkpoints are no-ops.
pub struct DirectScope<'a> {
    host: &'a mut dyn HostDocument,
}

impl<'a> DirectScope<'a> {
    /// Wrap a host without opening a transaction.
    pub fn new(host: &'a mut dyn HostDocument) -> Self {
        Self { host }
    }
}

impl ExecutionScope for DirectScope<'_> {
    fn host(&mut self) -> &mut dyn HostDocument {
        self.host
    }

    fn checkpoint(&mut self) -> Result<(), HostError> {
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        false
    }
}
