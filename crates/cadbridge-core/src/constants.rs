//! Engine-wide constants.

/// Version tag mixed into every context token.
pub const CONTEXT_TOKEN_VERSION: &str = "ctx.v1";

/// Prefix of context tokens handed to clients.
pub const CONTEXT_TOKEN_PREFIX: &str = "ctx-";

/// Prefix of confirmation tokens.
pub const CONFIRM_TOKEN_PREFIX: &str = "ct-";

/// Suffix appended to transactions reopened by time slicing.
pub const CONTINUATION_SUFFIX: &str = " [cont]";

/// Default maximum age of the stashed non-empty selection.
pub const SELECTION_STASH_MAX_AGE_MS: u64 = 2000;

/// Fields recognised as element identifiers when sorting result arrays.
pub const ID_FIELDS: &[&str] = &["elementId", "id", "viewId", "typeId", "uniqueId"];
