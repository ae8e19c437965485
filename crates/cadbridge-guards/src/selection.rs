//! Latest host selection.
//!
//! The host's selection-changed notification calls [`SelectionCache::set`].
//! The cache keeps the current snapshot and, separately, the last non-empty
//! one so a transient deselection does not lose what the user had picked.
//! Every read returns an owned copy.

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::hex_sha256;

/// One observed selection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionSnapshot {
    /// Selected ids in host order.
    pub element_ids: Vec<i64>,
    /// When the selection was observed.
    pub observed_at: DateTime<Utc>,
    /// Saved path of the document, if any.
    pub document_path: Option<String>,
    /// Document key.
    pub document_key: String,
    /// Active view at the time.
    pub active_view_id: Option<i64>,
    /// Strictly increasing across every `set`.
    pub revision: u64,
    /// Order-independent digest of the ids.
    pub hash: String,
}

impl SelectionSnapshot {
    /// Whether nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.element_ids.is_empty()
    }
}

/// Digest of the distinct ids, independent of order.
pub fn selection_hash(ids: &[i64]) -> String {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    let joined = sorted
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    hex_sha256(joined.as_bytes())
}

#[derive(Default)]
struct Inner {
    current: Option<SelectionSnapshot>,
    last_non_empty: Option<SelectionSnapshot>,
    revision: u64,
}

/// Single-slot selection cache.
#[derive(Default)]
pub struct SelectionCache {
    inner: Mutex<Inner>,
}

impl SelectionCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new selection and return its snapshot.
    pub fn set(
        &self,
        element_ids: Vec<i64>,
        document_path: Option<&str>,
        document_key: &str,
        active_view_id: Option<i64>,
    ) -> SelectionSnapshot {
        self.set_at(Utc::now(), element_ids, document_path, document_key, active_view_id)
    }

    /// [`Self::set`] with an explicit observation time.
    pub fn set_at(
        &self,
        observed_at: DateTime<Utc>,
        element_ids: Vec<i64>,
        document_path: Option<&str>,
        document_key: &str,
        active_view_id: Option<i64>,
    ) -> SelectionSnapshot {
        let hash = selection_hash(&element_ids);
        let mut inner = self.inner.lock();
        inner.revision += 1;
        let snapshot = SelectionSnapshot {
            element_ids,
            observed_at,
            document_path: document_path.map(str::to_owned),
            document_key: document_key.to_owned(),
            active_view_id,
            revision: inner.revision,
            hash,
        };
        if !snapshot.is_empty() {
            inner.last_non_empty = Some(snapshot.clone());
        }
        inner.current = Some(snapshot.clone());
        snapshot
    }

    /// Latest snapshot, empty or not.
    pub fn current(&self) -> Option<SelectionSnapshot> {
        self.inner.lock().current.clone()
    }

    /// Most recent non-empty snapshot.
    pub fn last_non_empty(&self) -> Option<SelectionSnapshot> {
        self.inner.lock().last_non_empty.clone()
    }

    /// Last non-empty snapshot if it belongs to `document_key` and
    /// `active_view_id` and is younger than `max_age`.
    pub fn last_non_empty_matching(
        &self,
        document_key: &str,
        active_view_id: Option<i64>,
        max_age: Duration,
    ) -> Option<SelectionSnapshot> {
        self.last_non_empty_matching_at(Utc::now(), document_key, active_view_id, max_age)
    }

    /// [`Self::last_non_empty_matching`] with an explicit clock.
    pub fn last_non_empty_matching_at(
        &self,
        now: DateTime<Utc>,
        document_key: &str,
        active_view_id: Option<i64>,
        max_age: Duration,
    ) -> Option<SelectionSnapshot> {
        let max_age = chrono::Duration::from_std(max_age).ok()?;
        self.inner
            .lock()
            .last_non_empty
            .as_ref()
            .filter(|s| s.document_key == document_key && s.active_view_id == active_view_id)
            .filter(|s| now.signed_duration_since(s.observed_at) <= max_age)
            .cloned()
    }

    /// Revision of the latest `set`, 0 before the first.
    pub fn revision(&self) -> u64 {
        self.inner.lock().revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadbridge_core::constants::SELECTION_STASH_MAX_AGE_MS;

    const MAX_AGE: Duration = Duration::from_millis(SELECTION_STASH_MAX_AGE_MS);

    #[test]
    fn empty_set_keeps_last_non_empty() {
        let cache = SelectionCache::new();
        let first = cache.set(vec![3, 1], None, "doc", Some(1));
        let second = cache.set(vec![], None, "doc", Some(1));
        assert!(second.revision > first.revision);
        assert!(cache.current().unwrap().is_empty());
        assert_eq!(cache.last_non_empty().unwrap().element_ids, vec![3, 1]);
    }

    #[test]
    fn revision_strictly_increases() {
        let cache = SelectionCache::new();
        let mut last = cache.revision();
        for ids in [vec![1], vec![], vec![], vec![2, 3]] {
            let snap = cache.set(ids, Some("C:/a.rvt"), "doc", None);
            assert!(snap.revision > last);
            last = snap.revision;
        }
    }

    #[test]
    fn hash_is_order_independent() {
        assert_eq!(selection_hash(&[1, 2, 3]), selection_hash(&[3, 2, 1, 1]));
        assert_ne!(selection_hash(&[1, 2]), selection_hash(&[1, 3]));
    }

    #[test]
    fn reads_are_copies() {
        let cache = SelectionCache::new();
        let _ = cache.set(vec![1], None, "doc", None);
        let mut copy = cache.current().unwrap();
        copy.element_ids.push(99);
        assert_eq!(cache.current().unwrap().element_ids, vec![1]);
    }

    #[test]
    fn matching_fallback_checks_document_view_and_age() {
        let cache = SelectionCache::new();
        let t0 = Utc::now();
        let _ = cache.set_at(t0, vec![5], None, "doc", Some(1));
        let _ = cache.set_at(t0, vec![], None, "doc", Some(1));

        let soon = t0 + chrono::Duration::milliseconds(500);
        assert!(cache.last_non_empty_matching_at(soon, "doc", Some(1), MAX_AGE).is_some());
        assert!(cache.last_non_empty_matching_at(soon, "other", Some(1), MAX_AGE).is_none());
        assert!(cache.last_non_empty_matching_at(soon, "doc", Some(2), MAX_AGE).is_none());

        let late = t0 + chrono::Duration::milliseconds(2500);
        assert!(cache.last_non_empty_matching_at(late, "doc", Some(1), MAX_AGE).is_none());
    }
}
