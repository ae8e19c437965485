//! Idempotent-retry store.
//!
//! Maps a client-chosen key to the response of the first successful call
//! made with it. A caller claims a key with [`IdempotencyStore::reserve`],
//! which checks and claims under one lock, then either
//! [`complete`](IdempotencyStore::complete)s it with the response or
//! [`release`](IdempotencyStore::release)s it when the call failed. Entries
//! live for the process lifetime; clients pick a fresh key per logical
//! operation.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;

struct Record {
    method: String,
    /// `None` while the owning call is still running.
    response: Option<Value>,
}

/// Outcome of claiming a key for a method.
#[derive(Clone, Debug, PartialEq)]
pub enum Lookup {
    /// Key was free and is now held by the caller; execute normally.
    Miss,
    /// Key completed for this method; return the stored response.
    Replay(Value),
    /// Another call with this key and method has not finished yet.
    InFlight,
    /// Key was used for another method.
    Conflict {
        /// Method the key was first used with.
        stored_method: String,
    },
}

/// Process-lifetime idempotency cache.
#[derive(Default)]
pub struct IdempotencyStore {
    entries: Mutex<HashMap<String, Record>>,
}

impl IdempotencyStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored response for `key`, if its call completed.
    pub fn try_get(&self, key: &str) -> Option<Value> {
        self.entries.lock().get(key).and_then(|r| r.response.clone())
    }

    /// Get-or-claim `key` on behalf of `method`.
    ///
    /// Only a [`Lookup::Miss`] leaves the key held by the caller, who must
    /// then call [`complete`](Self::complete) or [`release`](Self::release).
    pub fn reserve(&self, key: &str, method: &str) -> Lookup {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            None => {
                let _ = entries.insert(
                    key.to_owned(),
                    Record {
                        method: method.to_owned(),
                        response: None,
                    },
                );
                Lookup::Miss
            }
            Some(r) if r.method != method => Lookup::Conflict {
                stored_method: r.method.clone(),
            },
            Some(Record { response: Some(stored), .. }) => Lookup::Replay(stored.clone()),
            Some(Record { response: None, .. }) => Lookup::InFlight,
        }
    }

    /// Store `response` for a key claimed by [`reserve`](Self::reserve).
    ///
    /// Returns `false` when the key was not pending, leaving any earlier
    /// response untouched.
    pub fn complete(&self, key: &str, response: Value) -> bool {
        match self.entries.lock().get_mut(key) {
            Some(record) if record.response.is_none() => {
                record.response = Some(response);
                true
            }
            _ => false,
        }
    }

    /// Drop a pending claim so the key can be retried.
    ///
    /// Completed entries are kept.
    pub fn release(&self, key: &str) {
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|r| r.response.is_none()) {
            let _ = entries.remove(key);
        }
    }

    /// Number of keys, pending ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
