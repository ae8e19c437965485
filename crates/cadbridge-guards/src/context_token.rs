//! Context tokens.
//!
//! A short digest of what the caller is looking at: document identity and
//! path, active view, document revision, and the selection. Any change to
//! one of them yields a different token, so clients can detect stale
//! cached context by comparing tokens.

use cadbridge_core::constants::{CONTEXT_TOKEN_PREFIX, CONTEXT_TOKEN_VERSION};
use cadbridge_core::host::{DocumentInfo, ViewInfo};

use crate::hex_sha256;

/// Token for a closed document.
pub const NO_DOCUMENT_TOKEN: &str = "ctx-nodoc";

/// Hex digits of the digest kept in the token.
const TOKEN_HEX_LEN: usize = 32;

/// Compute the context token. Selection order does not matter.
pub fn context_token(
    document: Option<&DocumentInfo>,
    view: Option<&ViewInfo>,
    selection_ids: &[i64],
) -> String {
    let Some(doc) = document else {
        return NO_DOCUMENT_TOKEN.to_owned();
    };
    let mut ids = selection_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    let selection = ids
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");

    let identity = doc.guid.as_deref().unwrap_or(&doc.key);
    let raw = format!(
        "{CONTEXT_TOKEN_VERSION}|{}|{}|{}|{}|{selection}",
        identity.trim().to_lowercase(),
        doc.path.as_deref().unwrap_or("").trim().to_lowercase(),
        view.map_or(0, |v| v.id),
        doc.revision,
    );
    let digest = hex_sha256(raw.as_bytes());
    format!("{CONTEXT_TOKEN_PREFIX}{}", &digest[..TOKEN_HEX_LEN])
}
