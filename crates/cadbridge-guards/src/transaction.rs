//! Host transactions around write commands.
//!
//! [`TransactionGuard::run`] opens a named transaction, hands the handler a
//! [`TransactionScope`], and commits with a failure resolver built from the
//! guard's [`FailurePolicy`]. Handler errors (and panics, via `Drop`) roll
//! the open transaction back. Long batches call
//! [`ExecutionScope::checkpoint`]; once the open transaction is older than
//! the slice budget the scope commits it and reopens `"<name> [cont]"`.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use cadbridge_core::constants::CONTINUATION_SUFFIX;
use cadbridge_core::errors::{CommandError, HostError};
use cadbridge_core::host::{
    ExecutionScope, FailureDecision, FailureResolver, FailureSeverity, HostDocument, HostFailure,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

/// How failures raised at commit are resolved.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Dismiss warnings, roll back on errors.
    #[default]
    ProceedWithWarnings,
    /// Dismiss only the listed failure codes, roll back on anything else.
    Whitelist(HashSet<String>),
}

impl FailurePolicy {
    /// Whitelist policy for non-empty `codes`, default policy otherwise.
    pub fn from_codes(codes: &[String]) -> Self {
        if codes.is_empty() {
            Self::ProceedWithWarnings
        } else {
            Self::Whitelist(codes.iter().cloned().collect())
        }
    }

    fn decide(&self, failure: &HostFailure) -> FailureDecision {
        let dismiss = match self {
            Self::ProceedWithWarnings => failure.severity == FailureSeverity::Warning,
            Self::Whitelist(codes) => codes.contains(&failure.code),
        };
        if dismiss {
            FailureDecision::Dismiss
        } else {
            FailureDecision::RollBack
        }
    }
}

struct PolicyResolver<'a> {
    policy: &'a FailurePolicy,
    dismissed: Vec<HostFailure>,
}

impl FailureResolver for PolicyResolver<'_> {
    fn resolve(&mut self, failure: &HostFailure) -> FailureDecision {
        let decision = self.policy.decide(failure);
        if decision == FailureDecision::Dismiss {
            self.dismissed.push(failure.clone());
        }
        decision
    }
}

/// What happened inside a guarded run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReport {
    /// Successful commits, including time-sliced ones.
    pub commits: u32,
    /// Failures dismissed by the policy.
    pub dismissed: Vec<HostFailure>,
    /// Wall time from first begin to final commit.
    pub transaction_ms: u64,
}

impl TransactionReport {
    /// One warning line per dismissed failure.
    pub fn warnings(&self) -> Vec<String> {
        self.dismissed
            .iter()
            .map(|f| {
                let severity = match f.severity {
                    FailureSeverity::Warning => "warning",
                    FailureSeverity::Error => "error",
                };
                format!("host {severity} dismissed [{}]: {}", f.code, f.message)
            })
            .collect()
    }
}

/// Runs write handlers inside host transactions.
#[derive(Clone, Debug)]
pub struct TransactionGuard {
    budget: Duration,
    policy: FailurePolicy,
}

impl TransactionGuard {
    /// Guard with a time-slice `budget` and failure `policy`.
    pub fn new(budget: Duration, policy: FailurePolicy) -> Self {
        Self { budget, policy }
    }

    /// Run `f` inside transaction `name` and commit.
    #[instrument(skip_all, fields(transaction = name))]
    pub fn run<F>(
        &self,
        host: &mut dyn HostDocument,
        name: &str,
        f: F,
    ) -> Result<(Value, TransactionReport), CommandError>
    where
        F: FnOnce(&mut dyn ExecutionScope) -> Result<Value, CommandError>,
    {
        let started = Instant::now();
        host.begin_transaction(name)?;
        let mut scope = TransactionScope {
            host,
            guard: self,
            name: name.to_owned(),
            opened_at: started,
            open: true,
            commits: 0,
            dismissed: Vec::new(),
        };

        let value = match f(&mut scope) {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "handler failed, rolling back");
                scope.rollback();
                return Err(e);
            }
        };
        if scope.open {
            scope.commit()?;
        }

        let report = TransactionReport {
            commits: scope.commits,
            dismissed: std::mem::take(&mut scope.dismissed),
            transaction_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        Ok((value, report))
    }
}

/// Transactional [`ExecutionScope`] handed to write handlers.
pub struct TransactionScope<'a> {
    host: &'a mut dyn HostDocument,
    guard: &'a TransactionGuard,
    name: String,
    opened_at: Instant,
    open: bool,
    commits: u32,
    dismissed: Vec<HostFailure>,
}

impl TransactionScope<'_> {
    fn commit(&mut self) -> Result<(), HostError> {
        let mut resolver = PolicyResolver {
            policy: &self.guard.policy,
            dismissed: Vec::new(),
        };
        let result = self.host.commit_transaction(&mut resolver);
        self.open = false;
        match result {
            Ok(()) => {
                self.commits += 1;
                self.dismissed.append(&mut resolver.dismissed);
                Ok(())
            }
            Err(e) => {
                warn!(transaction = %self.name, error = %e, "commit rejected");
                Err(e)
            }
        }
    }

    fn rollback(&mut self) {
        if self.open {
            self.host.rollback_transaction();
            self.open = false;
        }
    }

    fn continuation_name(&self) -> String {
        if self.name.ends_with(CONTINUATION_SUFFIX) {
            self.name.clone()
        } else {
            format!("{}{CONTINUATION_SUFFIX}", self.name)
        }
    }
}

impl ExecutionScope for TransactionScope<'_> {
    fn host(&mut self) -> &mut dyn HostDocument {
        self.host
    }

    fn checkpoint(&mut self) -> Result<(), HostError> {
        if !self.open || self.opened_at.elapsed() < self.guard.budget {
            return Ok(());
        }
        self.commit()?;
        self.name = self.continuation_name();
        self.host.begin_transaction(&self.name)?;
        self.open = true;
        self.opened_at = Instant::now();
        debug!(transaction = %self.name, commits = self.commits, "transaction sliced");
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.open
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        self.rollback();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use cadbridge_core::memory_host::{MemoryHost, TransactionOutcome};
    use serde_json::json;

    fn memory(scope: &mut dyn ExecutionScope) -> &mut MemoryHost {
        scope.host().as_any_mut().downcast_mut::<MemoryHost>().unwrap()
    }

    fn failure(code: &str, severity: FailureSeverity) -> HostFailure {
        HostFailure {
            code: code.into(),
            severity,
            message: format!("{code} raised"),
        }
    }

    fn guard(policy: FailurePolicy) -> TransactionGuard {
        TransactionGuard::new(Duration::from_secs(60), policy)
    }

    #[test]
    fn commits_handler_changes() {
        let mut host = MemoryHost::with_document("T", None);
        let (value, report) = guard(FailurePolicy::default())
            .run(&mut host, "Create wall", |scope| {
                assert!(scope.in_transaction());
                let id = memory(scope).create_element(json!({"kind": "wall"}))?;
                Ok(json!({ "elementId": id }))
            })
            .unwrap();
        assert_eq!(value["elementId"], 1000);
        assert_eq!(report.commits, 1);
        assert_eq!(host.elements().len(), 1);
        assert_eq!(host.document().unwrap().revision, 1);
        assert!(host.open_transaction().is_none());
    }

    #[test]
    fn handler_error_rolls_back() {
        let mut host = MemoryHost::with_document("T", None);
        let err = guard(FailurePolicy::default())
            .run(&mut host, "Create wall", |scope| {
                let _ = memory(scope).create_element(json!({}))?;
                Err(CommandError::invalid_params("bad"))
            })
            .unwrap_err();
        assert_matches!(err, CommandError::InvalidParams { .. });
        assert!(host.elements().is_empty());
        assert_eq!(host.history()[0].outcome, TransactionOutcome::RolledBack);
    }

    #[test]
    fn warnings_are_dismissed_and_reported() {
        let mut host = MemoryHost::with_document("T", None);
        host.queue_failure(failure("DUPLICATE_INSTANCES", FailureSeverity::Warning));
        let (_, report) = guard(FailurePolicy::default())
            .run(&mut host, "Create", |scope| {
                let _ = memory(scope).create_element(json!({}))?;
                Ok(Value::Null)
            })
            .unwrap();
        assert_eq!(report.dismissed.len(), 1);
        assert_eq!(
            report.warnings(),
            vec!["host warning dismissed [DUPLICATE_INSTANCES]: DUPLICATE_INSTANCES raised"]
        );
        assert_eq!(host.elements().len(), 1);
    }

    #[test]
    fn errors_roll_back_with_transaction_failed() {
        let mut host = MemoryHost::with_document("T", None);
        host.queue_failure(failure("JOIN_FAILED", FailureSeverity::Error));
        let err = guard(FailurePolicy::default())
            .run(&mut host, "Create", |scope| {
                let _ = memory(scope).create_element(json!({}))?;
                Ok(Value::Null)
            })
            .unwrap_err();
        assert_eq!(err.code(), "TRANSACTION_FAILED");
        assert_eq!(err.details().unwrap()["failures"][0]["code"], "JOIN_FAILED");
        assert!(host.elements().is_empty());
    }

    #[test]
    fn whitelist_policy_dismisses_only_listed_codes() {
        let policy = FailurePolicy::from_codes(&["OVERLAP".to_owned()]);
        let mut host = MemoryHost::with_document("T", None);
        host.queue_failure(failure("OVERLAP", FailureSeverity::Error));
        assert!(guard(policy.clone())
            .run(&mut host, "a", |scope| {
                let _ = memory(scope).create_element(json!({}))?;
                Ok(Value::Null)
            })
            .is_ok());

        host.queue_failure(failure("OTHER_WARNING", FailureSeverity::Warning));
        assert!(guard(policy)
            .run(&mut host, "b", |scope| {
                let _ = memory(scope).create_element(json!({}))?;
                Ok(Value::Null)
            })
            .is_err());
        assert_eq!(host.elements().len(), 1);
    }

    #[test]
    fn empty_whitelist_is_default_policy() {
        assert_eq!(FailurePolicy::from_codes(&[]), FailurePolicy::ProceedWithWarnings);
    }

    #[test]
    fn checkpoint_slices_after_budget() {
        let mut host = MemoryHost::with_document("T", None);
        let guard = TransactionGuard::new(Duration::ZERO, FailurePolicy::default());
        let (_, report) = guard
            .run(&mut host, "Batch", |scope| {
                for i in 0..3 {
                    let _ = memory(scope).create_element(json!({ "n": i }))?;
                    scope.checkpoint()?;
                }
                Ok(Value::Null)
            })
            .unwrap();
        let names: Vec<&str> = host.history().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Batch", "Batch [cont]", "Batch [cont]", "Batch [cont]"]);
        assert_eq!(report.commits, 4);
        assert_eq!(host.elements().len(), 3);
    }

    #[test]
    fn checkpoint_within_budget_is_noop() {
        let mut host = MemoryHost::with_document("T", None);
        let (_, report) = guard(FailurePolicy::default())
            .run(&mut host, "Batch", |scope| {
                scope.checkpoint()?;
                scope.checkpoint()?;
                Ok(Value::Null)
            })
            .unwrap();
        assert_eq!(report.commits, 1);
        assert_eq!(host.history().len(), 1);
    }

    #[test]
    fn no_document_fails_before_handler() {
        let mut host = MemoryHost::new();
        let err = guard(FailurePolicy::default())
            .run(&mut host, "x", |_| panic!("handler must not run"))
            .unwrap_err();
        assert_eq!(err.code(), "NO_DOC");
    }

    #[test]
    fn panic_inside_handler_rolls_back() {
        let mut host = MemoryHost::with_document("T", None);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            guard(FailurePolicy::default()).run(&mut host, "boom", |scope| {
                let _ = memory(scope).create_element(json!({}))?;
                panic!("handler bug");
            })
        }));
        assert!(result.is_err());
        assert!(host.elements().is_empty());
        assert!(host.open_transaction().is_none());
    }
}
