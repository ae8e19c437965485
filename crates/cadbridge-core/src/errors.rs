//! Wire error codes and the error types handlers and hosts return.
//!
//! Every failure that reaches a caller is shaped into an envelope carrying
//! one of the codes below, so callers branch on `code` rather than on
//! message text.

use serde_json::{Value, json};

use crate::host::HostFailure;

// ── Envelope code constants ─────────────────────────────────────────

/// Successful execution.
pub const OK: &str = "OK";
/// Generic failure when a handler reported `ok: false` without a code.
pub const ERROR: &str = "ERROR";
/// Dry-run of a high-risk write; a confirmation token was issued.
pub const DRY_RUN: &str = "DRY_RUN";
/// Unknown command name or alias.
pub const METHOD_NOT_FOUND: &str = "METHOD_NOT_FOUND";
/// Parameters could not be resolved into what the handler needs.
pub const INVALID_PARAMS: &str = "INVALID_PARAMS";
/// Handler-level lookup failure (element, view, type...).
pub const NOT_FOUND: &str = "NOT_FOUND";
/// No document is open in the host.
pub const NO_DOC: &str = "NO_DOC";
/// Caller expected a different host process.
pub const EXPECT_PID_MISMATCH: &str = "EXPECT_PID_MISMATCH";
/// Caller expected a different persistent document identity.
pub const EXPECT_PROJECT_GUID_MISMATCH: &str = "EXPECT_PROJECT_GUID_MISMATCH";
/// Caller expected a different document title.
pub const EXPECT_PROJECT_MISMATCH: &str = "EXPECT_PROJECT_MISMATCH";
/// Expected view does not exist in the document.
pub const EXPECT_VIEW_NOT_FOUND: &str = "EXPECT_VIEW_NOT_FOUND";
/// Expected view exists but is not the active view.
pub const EXPECT_VIEW_NOT_ACTIVE: &str = "EXPECT_VIEW_NOT_ACTIVE";
/// High-risk write attempted without a confirmation token.
pub const CONFIRMATION_REQUIRED: &str = "CONFIRMATION_REQUIRED";
/// Confirmation token unknown, expired, or bound to another operation.
pub const CONFIRMATION_INVALID: &str = "CONFIRMATION_INVALID";
/// Idempotency key reused for a different method.
pub const IDEMPOTENCY_KEY_CONFLICT: &str = "IDEMPOTENCY_KEY_CONFLICT";
/// Host transaction aborted and rolled back.
pub const TRANSACTION_FAILED: &str = "TRANSACTION_FAILED";
/// Unanticipated failure or handler panic.
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
/// Execution thread stopped or did not answer in time.
pub const ENGINE_UNAVAILABLE: &str = "ENGINE_UNAVAILABLE";

/// Errors raised by a [`HostDocument`](crate::host::HostDocument).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HostError {
    /// No document is open.
    #[error("no active document")]
    NoDocument,

    /// A transaction is already open.
    #[error("transaction '{name}' is already open")]
    TransactionOpen {
        /// Name of the open transaction.
        name: String,
    },

    /// A mutation or commit was attempted outside a transaction.
    #[error("no open transaction")]
    NoTransaction,

    /// The host rejected the commit and rolled back.
    #[error("transaction rolled back: {message}")]
    RolledBack {
        /// Summary of the blocking failure.
        message: String,
        /// Failures the host reported during commit.
        failures: Vec<HostFailure>,
    },

    /// Any other modeling API failure.
    #[error("{0}")]
    Api(String),
}

impl HostError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoDocument => NO_DOC,
            Self::RolledBack { .. } => TRANSACTION_FAILED,
            Self::TransactionOpen { .. } | Self::NoTransaction | Self::Api(_) => INTERNAL_ERROR,
        }
    }
}

/// Error returned by a domain command handler.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Required parameter missing or unusable.
    #[error("{message}")]
    InvalidParams {
        /// What is wrong.
        message: String,
    },

    /// A referenced entity does not exist.
    #[error("{message}")]
    NotFound {
        /// What was not found.
        message: String,
    },

    /// Domain failure with its own code.
    #[error("{message}")]
    Failed {
        /// Machine-readable code.
        code: String,
        /// Human-readable message.
        message: String,
        /// Optional structured details.
        details: Option<Value>,
    },

    /// Host API failure.
    #[error(transparent)]
    Host(#[from] HostError),

    /// Unexpected failure.
    #[error("{message}")]
    Internal {
        /// Description.
        message: String,
    },
}

impl CommandError {
    /// Shorthand for [`CommandError::InvalidParams`].
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &str {
        match self {
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::NotFound { .. } => NOT_FOUND,
            Self::Failed { code, .. } => code,
            Self::Host(err) => err.code(),
            Self::Internal { .. } => INTERNAL_ERROR,
        }
    }

    /// Structured details for the envelope `data` field.
    pub fn details(&self) -> Option<Value> {
        match self {
            Self::Failed { details, .. } => details.clone(),
            Self::Host(HostError::RolledBack { failures, .. }) => {
                Some(json!({ "failures": failures }))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::FailureSeverity;

    #[test]
    fn invalid_params_code() {
        let err = CommandError::invalid_params("missing start");
        assert_eq!(err.code(), INVALID_PARAMS);
        assert_eq!(err.to_string(), "missing start");
    }

    #[test]
    fn failed_keeps_custom_code_and_details() {
        let err = CommandError::Failed {
            code: "WALL_TYPE_MISSING".into(),
            message: "no wall type".into(),
            details: Some(json!({"typeId": 7})),
        };
        assert_eq!(err.code(), "WALL_TYPE_MISSING");
        assert_eq!(err.details().unwrap()["typeId"], 7);
    }

    #[test]
    fn rolled_back_maps_to_transaction_failed() {
        let err: CommandError = HostError::RolledBack {
            message: "join failed".into(),
            failures: vec![HostFailure {
                code: "JOIN".into(),
                severity: FailureSeverity::Error,
                message: "cannot join".into(),
            }],
        }
        .into();
        assert_eq!(err.code(), TRANSACTION_FAILED);
        assert_eq!(err.details().unwrap()["failures"][0]["code"], "JOIN");
        assert_eq!(err.to_string(), "transaction rolled back: join failed");
    }

    #[test]
    fn no_document_maps_to_no_doc() {
        let err = CommandError::from(HostError::NoDocument);
        assert_eq!(err.code(), NO_DOC);
        assert!(err.details().is_none());
    }

    #[test]
    fn api_errors_are_internal() {
        assert_eq!(HostError::Api("boom".into()).code(), INTERNAL_ERROR);
        assert_eq!(HostError::NoTransaction.code(), INTERNAL_ERROR);
    }
}
