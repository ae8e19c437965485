//! Two-phase confirmation for high-risk writes.
//!
//! A dry-run issues a token bound to the method, the document, and a
//! fingerprint of the normalized parameters. The real call must present the
//! token with the same three values; a matching token is consumed on first
//! use. Expired tickets are swept on every call.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use cadbridge_core::constants::CONFIRM_TOKEN_PREFIX;
use cadbridge_core::errors::{CONFIRMATION_INVALID, CONFIRMATION_REQUIRED};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::hex_sha256;

/// Stable digest of a document key plus normalized parameters.
///
/// Object keys are sorted recursively, so key order never matters.
pub fn fingerprint(document_key: &str, params: &Value) -> String {
    let canonical = sorted(params).to_string();
    hex_sha256(format!("{document_key}\n{canonical}").as_bytes())
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::with_capacity(map.len());
            for key in keys {
                if let Some(child) = map.get(key) {
                    let _ = out.insert(key.clone(), sorted(child));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

/// Why a token was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfirmationError {
    /// No token supplied.
    #[error("confirmation required: run with dryRun first and pass the returned confirmToken")]
    Missing,
    /// Token was never issued or was already used.
    #[error("confirmation token unknown or already used")]
    Unknown,
    /// Token outlived its TTL.
    #[error("confirmation token expired")]
    Expired,
    /// Token was issued for another command.
    #[error("confirmation token was issued for '{issued}'")]
    MethodMismatch {
        /// Method the token belongs to.
        issued: String,
    },
    /// Token was issued against another document.
    #[error("confirmation token was issued for another document")]
    DocumentMismatch,
    /// Parameters changed since the dry-run.
    #[error("parameters changed since the dry-run; preview again")]
    ParamsMismatch,
}

impl ConfirmationError {
    /// Wire code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Missing => CONFIRMATION_REQUIRED,
            _ => CONFIRMATION_INVALID,
        }
    }

    /// Short machine-readable reason.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Unknown => "unknown",
            Self::Expired => "expired",
            Self::MethodMismatch { .. } => "method_mismatch",
            Self::DocumentMismatch => "document_mismatch",
            Self::ParamsMismatch => "params_mismatch",
        }
    }
}

/// A freshly issued token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    /// Opaque token, `ct-` prefixed.
    pub token: String,
    /// Seconds until expiry.
    pub expires_in_sec: u64,
    /// Absolute expiry.
    pub expires_at: DateTime<Utc>,
}

struct Ticket {
    method: String,
    document_key: String,
    fingerprint: String,
    expires_at: Instant,
}

/// Issues and consumes confirmation tokens.
pub struct ConfirmationTokenService {
    ttl: Duration,
    tickets: Mutex<HashMap<String, Ticket>>,
}

impl ConfirmationTokenService {
    /// Service whose tokens live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            tickets: Mutex::new(HashMap::new()),
        }
    }

    /// Token lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `(method, document_key, fingerprint)`.
    pub fn issue(&self, method: &str, document_key: &str, fingerprint: &str) -> IssuedToken {
        self.issue_at(Instant::now(), method, document_key, fingerprint)
    }

    /// [`Self::issue`] with an explicit clock.
    pub fn issue_at(
        &self,
        now: Instant,
        method: &str,
        document_key: &str,
        fingerprint: &str,
    ) -> IssuedToken {
        let token = format!("{CONFIRM_TOKEN_PREFIX}{:032x}", rand::random::<u128>());
        let ticket = Ticket {
            method: method.to_owned(),
            document_key: document_key.to_owned(),
            fingerprint: fingerprint.to_owned(),
            expires_at: now + self.ttl,
        };
        {
            let mut tickets = self.tickets.lock();
            sweep(&mut tickets, now);
            let _ = tickets.insert(token.clone(), ticket);
        }
        debug!(method, "confirmation token issued");

        let wall_ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::zero());
        let issued_at = Utc::now();
        IssuedToken {
            token,
            expires_in_sec: self.ttl.as_secs(),
            expires_at: issued_at.checked_add_signed(wall_ttl).unwrap_or(issued_at),
        }
    }

    /// Validate and consume `token`.
    pub fn validate(
        &self,
        token: Option<&str>,
        method: &str,
        document_key: &str,
        fingerprint: &str,
    ) -> Result<(), ConfirmationError> {
        self.validate_at(Instant::now(), token, method, document_key, fingerprint)
    }

    /// [`Self::validate`] with an explicit clock.
    ///
    /// A token is removed when it matches or has expired. A mismatching
    /// token stays valid for the operation it was issued for.
    pub fn validate_at(
        &self,
        now: Instant,
        token: Option<&str>,
        method: &str,
        document_key: &str,
        fingerprint: &str,
    ) -> Result<(), ConfirmationError> {
        let mut tickets = self.tickets.lock();
        let result = match token.map(str::trim).filter(|t| !t.is_empty()) {
            None => Err(ConfirmationError::Missing),
            Some(token) => match tickets.get(token) {
                None => Err(ConfirmationError::Unknown),
                Some(t) if t.expires_at <= now => {
                    let _ = tickets.remove(token);
                    Err(ConfirmationError::Expired)
                }
                Some(t) if t.method != method => Err(ConfirmationError::MethodMismatch {
                    issued: t.method.clone(),
                }),
                Some(t) if t.document_key != document_key => Err(ConfirmationError::DocumentMismatch),
                Some(t) if t.fingerprint != fingerprint => Err(ConfirmationError::ParamsMismatch),
                Some(_) => {
                    let _ = tickets.remove(token);
                    Ok(())
                }
            },
        };
        sweep(&mut tickets, now);
        result
    }

    /// Outstanding tickets, expired ones included until the next sweep.
    pub fn len(&self) -> usize {
        self.tickets.lock().len()
    }

    /// Whether no tickets are outstanding.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn sweep(tickets: &mut HashMap<String, Ticket>, now: Instant) {
    tickets.retain(|_, t| t.expires_at > now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    const TTL: Duration = Duration::from_secs(300);

    fn service() -> ConfirmationTokenService {
        ConfirmationTokenService::new(TTL)
    }

    #[test]
    fn fingerprint_ignores_key_order() {
        let a = json!({"b": 1, "a": {"y": [1, 2], "x": null}});
        let b = json!({"a": {"x": null, "y": [1, 2]}, "b": 1});
        assert_eq!(fingerprint("doc", &a), fingerprint("doc", &b));
        assert_ne!(fingerprint("doc", &a), fingerprint("other", &a));
        assert_ne!(fingerprint("doc", &a), fingerprint("doc", &json!({"b": 2})));
    }

    #[test]
    fn token_shape_and_expiry() {
        let issued = service().issue("element.delete_elements", "doc", "fp");
        assert!(issued.token.starts_with("ct-"));
        assert_eq!(issued.token.len(), 3 + 32);
        assert_eq!(issued.expires_in_sec, 300);
        assert!(issued.expires_at > Utc::now());
    }

    #[test]
    fn token_is_single_use() {
        let svc = service();
        let t = svc.issue("m", "doc", "fp").token;
        assert_eq!(svc.validate(Some(&t), "m", "doc", "fp"), Ok(()));
        assert_eq!(svc.validate(Some(&t), "m", "doc", "fp"), Err(ConfirmationError::Unknown));
        assert!(svc.is_empty());
    }

    #[test]
    fn mismatches_are_distinct_and_keep_the_ticket() {
        let svc = service();
        let t = svc.issue("m", "doc", "fp").token;
        assert_matches!(
            svc.validate(Some(&t), "other", "doc", "fp"),
            Err(ConfirmationError::MethodMismatch { issued }) if issued == "m"
        );
        assert_eq!(
            svc.validate(Some(&t), "m", "doc2", "fp"),
            Err(ConfirmationError::DocumentMismatch)
        );
        assert_eq!(
            svc.validate(Some(&t), "m", "doc", "fp2"),
            Err(ConfirmationError::ParamsMismatch)
        );
        assert_eq!(svc.validate(Some(&t), "m", "doc", "fp"), Ok(()));
    }

    #[test]
    fn missing_and_unknown() {
        let svc = service();
        let missing = svc.validate(None, "m", "doc", "fp").unwrap_err();
        assert_eq!(missing.code(), CONFIRMATION_REQUIRED);
        assert_eq!(svc.validate(Some("  "), "m", "doc", "fp"), Err(ConfirmationError::Missing));
        let unknown = svc.validate(Some("ct-nope"), "m", "doc", "fp").unwrap_err();
        assert_eq!(unknown.code(), CONFIRMATION_INVALID);
        assert_eq!(unknown.reason(), "unknown");
    }

    #[test]
    fn expired_token_is_rejected_and_removed() {
        let svc = service();
        let start = Instant::now();
        let t = svc.issue_at(start, "m", "doc", "fp").token;
        let later = start + TTL + Duration::from_secs(1);
        assert_eq!(
            svc.validate_at(later, Some(&t), "m", "doc", "fp"),
            Err(ConfirmationError::Expired)
        );
        assert!(svc.is_empty());
    }

    #[test]
    fn sweep_drops_other_expired_tickets() {
        let svc = service();
        let start = Instant::now();
        let _ = svc.issue_at(start, "a", "doc", "fp");
        let fresh = svc.issue_at(start + TTL, "b", "doc", "fp").token;
        let later = start + TTL + Duration::from_secs(1);
        assert_eq!(svc.validate_at(later, Some(&fresh), "b", "doc", "fp"), Ok(()));
        assert!(svc.is_empty());
    }
}
