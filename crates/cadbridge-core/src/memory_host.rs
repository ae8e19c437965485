//! In-memory [`HostDocument`] implementation.
//!
//! Models just enough of a modeling application for the stdio agent and
//! for tests: one document with views and a flat element table, mutations
//! only inside transactions, snapshot-based rollback, and failures that can
//! be queued to fire on the next commit.

use std::any::Any;
use std::collections::BTreeMap;

use serde_json::Value;

use crate::errors::HostError;
use crate::host::{
    DocumentInfo, FailureDecision, FailureResolver, HostDocument, HostFailure, ViewInfo,
};

/// First id handed out to created elements.
const FIRST_ELEMENT_ID: i64 = 1000;

/// How a transaction ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionOutcome {
    /// Changes were kept.
    Committed,
    /// Changes were discarded.
    RolledBack,
}

/// One finished transaction, in completion order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionRecord {
    /// Transaction name.
    pub name: String,
    /// How it ended.
    pub outcome: TransactionOutcome,
}

struct OpenTransaction {
    name: String,
    snapshot: BTreeMap<i64, Value>,
    next_id: i64,
    dirty: bool,
}

/// A document held entirely in memory.
pub struct MemoryHost {
    pid: u32,
    document: Option<DocumentInfo>,
    views: Vec<ViewInfo>,
    active_view: Option<i64>,
    elements: BTreeMap<i64, Value>,
    next_id: i64,
    open: Option<OpenTransaction>,
    pending_failures: Vec<HostFailure>,
    history: Vec<TransactionRecord>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self {
            pid: std::process::id(),
            document: None,
            views: Vec::new(),
            active_view: None,
            elements: BTreeMap::new(),
            next_id: FIRST_ELEMENT_ID,
            open: None,
            pending_failures: Vec::new(),
            history: Vec::new(),
        }
    }
}

impl MemoryHost {
    /// Host with no open document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Host with one open document and a single active floor plan (id 1).
    pub fn with_document(title: &str, guid: Option<&str>) -> Self {
        let key = guid.map_or_else(|| format!("doc:{}", title.to_lowercase()), str::to_owned);
        Self {
            document: Some(DocumentInfo {
                key,
                guid: guid.map(str::to_owned),
                title: title.to_owned(),
                path: None,
                revision: 0,
            }),
            views: vec![ViewInfo {
                id: 1,
                name: "Level 1".into(),
                view_type: "FloorPlan".into(),
            }],
            active_view: Some(1),
            ..Self::default()
        }
    }

    /// Pretend to be a different host process.
    pub fn set_process_id(&mut self, pid: u32) {
        self.pid = pid;
    }

    /// Set the saved path of the open document.
    pub fn set_document_path(&mut self, path: &str) {
        if let Some(doc) = self.document.as_mut() {
            doc.path = Some(path.to_owned());
        }
    }

    /// Close the document, dropping views and elements.
    pub fn close_document(&mut self) {
        self.document = None;
        self.views.clear();
        self.active_view = None;
        self.elements.clear();
        self.open = None;
    }

    /// Add a view to the document.
    pub fn add_view(&mut self, id: i64, name: &str, view_type: &str) {
        self.views.push(ViewInfo {
            id,
            name: name.to_owned(),
            view_type: view_type.to_owned(),
        });
    }

    /// Make an existing view active. Returns `false` for unknown ids.
    pub fn set_active_view(&mut self, id: i64) -> bool {
        if self.view_exists(id) {
            self.active_view = Some(id);
            true
        } else {
            false
        }
    }

    /// Queue a failure the host will raise on the next commit.
    pub fn queue_failure(&mut self, failure: HostFailure) {
        self.pending_failures.push(failure);
    }

    /// Create an element. Requires an open transaction.
    pub fn create_element(&mut self, data: Value) -> Result<i64, HostError> {
        self.mark_dirty()?;
        let id = self.next_id;
        self.next_id += 1;
        let _ = self.elements.insert(id, data);
        Ok(id)
    }

    /// Set one field on an element. Returns `false` for unknown ids.
    pub fn set_element_field(&mut self, id: i64, key: &str, value: Value) -> Result<bool, HostError> {
        self.mark_dirty()?;
        match self.elements.get_mut(&id) {
            Some(Value::Object(map)) => {
                let _ = map.insert(key.to_owned(), value);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Delete an element. Returns `false` for unknown ids.
    pub fn delete_element(&mut self, id: i64) -> Result<bool, HostError> {
        self.mark_dirty()?;
        Ok(self.elements.remove(&id).is_some())
    }

    /// Look up an element.
    pub fn element(&self, id: i64) -> Option<&Value> {
        self.elements.get(&id)
    }

    /// All elements keyed by id.
    pub fn elements(&self) -> &BTreeMap<i64, Value> {
        &self.elements
    }

    /// Finished transactions in completion order.
    pub fn history(&self) -> &[TransactionRecord] {
        &self.history
    }

    /// Name of the open transaction, if any.
    pub fn open_transaction(&self) -> Option<&str> {
        self.open.as_ref().map(|t| t.name.as_str())
    }

    fn mark_dirty(&mut self) -> Result<(), HostError> {
        let tx = self.open.as_mut().ok_or(HostError::NoTransaction)?;
        tx.dirty = true;
        Ok(())
    }

    fn finish(&mut self, outcome: TransactionOutcome) {
        let Some(tx) = self.open.take() else {
            return;
        };
        if outcome == TransactionOutcome::RolledBack {
            self.elements = tx.snapshot;
            self.next_id = tx.next_id;
        } else if tx.dirty {
            if let Some(doc) = self.document.as_mut() {
                doc.revision += 1;
            }
        }
        self.history.push(TransactionRecord {
            name: tx.name,
            outcome,
        });
    }
}

impl HostDocument for MemoryHost {
    fn process_id(&self) -> u32 {
        self.pid
    }

    fn document(&self) -> Option<DocumentInfo> {
        self.document.clone()
    }

    fn active_view(&self) -> Option<ViewInfo> {
        let id = self.active_view?;
        self.views.iter().find(|v| v.id == id).cloned()
    }

    fn view_exists(&self, view_id: i64) -> bool {
        self.views.iter().any(|v| v.id == view_id)
    }

    fn begin_transaction(&mut self, name: &str) -> Result<(), HostError> {
        if self.document.is_none() {
            return Err(HostError::NoDocument);
        }
        if let Some(tx) = &self.open {
            return Err(HostError::TransactionOpen {
                name: tx.name.clone(),
            });
        }
        self.open = Some(OpenTransaction {
            name: name.to_owned(),
            snapshot: self.elements.clone(),
            next_id: self.next_id,
            dirty: false,
        });
        Ok(())
    }

    fn commit_transaction(&mut self, resolver: &mut dyn FailureResolver) -> Result<(), HostError> {
        if self.open.is_none() {
            return Err(HostError::NoTransaction);
        }
        let failures = std::mem::take(&mut self.pending_failures);
        let blocking = failures
            .iter()
            .find(|f| resolver.resolve(f) == FailureDecision::RollBack)
            .cloned();

        if let Some(blocking) = blocking {
            self.finish(TransactionOutcome::RolledBack);
            return Err(HostError::RolledBack {
                message: blocking.message,
                failures,
            });
        }
        self.finish(TransactionOutcome::Committed);
        Ok(())
    }

    fn rollback_transaction(&mut self) {
        self.finish(TransactionOutcome::RolledBack);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
