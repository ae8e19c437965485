//! # cadbridge-guards
//!
//! Independent, explicitly constructed execution-safety services. Each one
//! owns a single coarse lock with short critical sections; none of them
//! locks another.
//!
//! - [`drift`]: opt-in process/document/view expectation checks
//! - [`confirm`]: two-phase confirmation tokens for high-risk writes
//! - [`idempotency`]: process-lifetime retry cache
//! - [`selection`]: latest and last non-empty host selection
//! - [`throttle`]: adaptive polling delay for the execution thread
//! - [`transaction`]: host transactions with failure policies and time slicing
//! - [`context_token`]: digest of the live document context

#![deny(unsafe_code)]

pub mod confirm;
pub mod context_token;
pub mod drift;
pub mod idempotency;
pub mod selection;
pub mod throttle;
pub mod transaction;

pub use confirm::{ConfirmationError, ConfirmationTokenService, IssuedToken, fingerprint};
pub use context_token::context_token;
pub use drift::{DriftError, check_expectations};
pub use idempotency::{IdempotencyStore, Lookup};
pub use selection::{SelectionCache, SelectionSnapshot, selection_hash};
pub use throttle::{AdaptiveThrottle, ThrottleSnapshot};
pub use transaction::{FailurePolicy, TransactionGuard, TransactionReport, TransactionScope};

use sha2::{Digest, Sha256};

pub(crate) fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
