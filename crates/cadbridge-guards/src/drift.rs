//! Context drift guard.
//!
//! Callers that cache host context (process, document, view) can send the
//! values they expect. Each check runs only when its expectation is present;
//! the first mismatch short-circuits with a recoverable, coded error instead
//! of letting a command run against the wrong target.

use cadbridge_core::errors::{
    EXPECT_PID_MISMATCH, EXPECT_PROJECT_GUID_MISMATCH, EXPECT_PROJECT_MISMATCH,
    EXPECT_VIEW_NOT_ACTIVE, EXPECT_VIEW_NOT_FOUND, NO_DOC,
};
use cadbridge_core::host::HostDocument;
use cadbridge_core::request::Expectations;
use serde_json::{Value, json};

/// A failed expectation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriftError {
    /// Request was meant for another host process.
    #[error("expected host process {expected}, running in {actual}")]
    PidMismatch {
        /// Expected pid.
        expected: u32,
        /// Actual pid.
        actual: u32,
    },

    /// A document expectation was given but nothing is open.
    #[error("no active document")]
    NoDocument,

    /// Persistent document identity differs.
    #[error("expected project guid '{expected}', active document is '{actual}'")]
    ProjectGuidMismatch {
        /// Expected guid.
        expected: String,
        /// Actual guid, empty when the document has none.
        actual: String,
    },

    /// Document title differs.
    #[error("expected project '{expected}', active document is '{actual}'")]
    ProjectTitleMismatch {
        /// Expected title.
        expected: String,
        /// Actual title.
        actual: String,
    },

    /// Expected view is not in the document.
    #[error("view {view_id} not found")]
    ViewNotFound {
        /// Expected view id.
        view_id: i64,
    },

    /// Expected view exists but another view is active.
    #[error("view {expected} is not the active view")]
    ViewNotActive {
        /// Expected active view.
        expected: i64,
        /// Actual active view, if any.
        actual: Option<i64>,
    },
}

impl DriftError {
    /// Wire code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PidMismatch { .. } => EXPECT_PID_MISMATCH,
            Self::NoDocument => NO_DOC,
            Self::ProjectGuidMismatch { .. } => EXPECT_PROJECT_GUID_MISMATCH,
            Self::ProjectTitleMismatch { .. } => EXPECT_PROJECT_MISMATCH,
            Self::ViewNotFound { .. } => EXPECT_VIEW_NOT_FOUND,
            Self::ViewNotActive { .. } => EXPECT_VIEW_NOT_ACTIVE,
        }
    }

    /// Expected/actual pair for the envelope.
    pub fn details(&self) -> Value {
        match self {
            Self::PidMismatch { expected, actual } => json!({ "expected": expected, "actual": actual }),
            Self::NoDocument => json!({}),
            Self::ProjectGuidMismatch { expected, actual }
            | Self::ProjectTitleMismatch { expected, actual } => {
                json!({ "expected": expected, "actual": actual })
            }
            Self::ViewNotFound { view_id } => json!({ "expected": view_id, "actual": null }),
            Self::ViewNotActive { expected, actual } => {
                json!({ "expected": expected, "actual": actual })
            }
        }
    }
}

fn normalized(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Run every requested check against the live host.
///
/// Order: process, document identity (guid, else title), view existence,
/// view activity.
pub fn check_expectations(host: &dyn HostDocument, expect: &Expectations) -> Result<(), DriftError> {
    if let Some(expected) = expect.pid {
        let actual = host.process_id();
        if expected != actual {
            return Err(DriftError::PidMismatch { expected, actual });
        }
    }
    if !expect.needs_document() {
        return Ok(());
    }
    let doc = host.document().ok_or(DriftError::NoDocument)?;

    if let Some(expected) = expect.project_guid.as_deref().filter(|g| !g.trim().is_empty()) {
        let actual = doc.guid.clone().unwrap_or_default();
        if normalized(expected) != normalized(&actual) {
            return Err(DriftError::ProjectGuidMismatch {
                expected: expected.to_owned(),
                actual,
            });
        }
    } else if let Some(expected) = expect.project_title.as_deref() {
        if normalized(expected) != normalized(&doc.title) {
            return Err(DriftError::ProjectTitleMismatch {
                expected: expected.to_owned(),
                actual: doc.title,
            });
        }
    }

    if let Some(view_id) = expect.view_id {
        if !host.view_exists(view_id) {
            return Err(DriftError::ViewNotFound { view_id });
        }
        if expect.view_active {
            let actual = host.active_view().map(|v| v.id);
            if actual != Some(view_id) {
                return Err(DriftError::ViewNotActive {
                    expected: view_id,
                    actual,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use cadbridge_core::memory_host::MemoryHost;

    fn host() -> MemoryHost {
        let mut h = MemoryHost::with_document("Tower A", Some("GUID-1"));
        h.set_process_id(4242);
        h.add_view(7, "Section 1", "Section");
        h
    }

    #[test]
    fn no_expectations_pass() {
        assert!(check_expectations(&host(), &Expectations::default()).is_ok());
        assert!(check_expectations(&MemoryHost::new(), &Expectations::default()).is_ok());
    }

    #[test]
    fn pid_mismatch_wins_over_everything() {
        let expect = Expectations {
            pid: Some(1),
            project_guid: Some("other".into()),
            ..Expectations::default()
        };
        let err = check_expectations(&host(), &expect).unwrap_err();
        assert_matches!(err, DriftError::PidMismatch { expected: 1, actual: 4242 });
        assert_eq!(err.code(), EXPECT_PID_MISMATCH);
    }

    #[test]
    fn guid_compare_ignores_case_and_whitespace() {
        let expect = Expectations {
            project_guid: Some(" guid-1 ".into()),
            ..Expectations::default()
        };
        assert!(check_expectations(&host(), &expect).is_ok());
    }

    #[test]
    fn guid_mismatch_reports_expected_and_actual() {
        let expect = Expectations {
            project_guid: Some("GUID-2".into()),
            project_title: Some("Tower A".into()),
            ..Expectations::default()
        };
        let err = check_expectations(&host(), &expect).unwrap_err();
        assert_eq!(err.code(), EXPECT_PROJECT_GUID_MISMATCH);
        assert_eq!(err.details(), json!({"expected": "GUID-2", "actual": "GUID-1"}));
    }

    #[test]
    fn title_used_only_without_guid() {
        let ok = Expectations {
            project_title: Some("  tower a".into()),
            ..Expectations::default()
        };
        assert!(check_expectations(&host(), &ok).is_ok());
        let bad = Expectations {
            project_title: Some("Tower B".into()),
            ..Expectations::default()
        };
        assert_eq!(check_expectations(&host(), &bad).unwrap_err().code(), EXPECT_PROJECT_MISMATCH);
    }

    #[test]
    fn view_checks() {
        let missing = Expectations {
            view_id: Some(99),
            ..Expectations::default()
        };
        assert_matches!(
            check_expectations(&host(), &missing),
            Err(DriftError::ViewNotFound { view_id: 99 })
        );

        let inactive = Expectations {
            view_id: Some(7),
            view_active: true,
            ..Expectations::default()
        };
        assert_matches!(
            check_expectations(&host(), &inactive),
            Err(DriftError::ViewNotActive { expected: 7, actual: Some(1) })
        );

        let exists = Expectations {
            view_id: Some(7),
            ..Expectations::default()
        };
        assert!(check_expectations(&host(), &exists).is_ok());
    }

    #[test]
    fn document_expectation_without_document() {
        let expect = Expectations {
            view_id: Some(1),
            ..Expectations::default()
        };
        let err = check_expectations(&MemoryHost::new(), &expect).unwrap_err();
        assert_eq!(err, DriftError::NoDocument);
        assert_eq!(err.code(), NO_DOC);
    }
}
