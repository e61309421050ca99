//! Test-only in-memory collaborators and builders.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::core::types::{Identity, SelectorRule};
use crate::io::directory::{DirectoryError, IdentityDirectory, IdentityPage};
use crate::io::store::{ConfigStore, Document, StoreError};
use crate::schedule::{EventSource, LoopEvent};

/// Build a document from key/value pairs.
pub fn document(pairs: &[(&str, &str)]) -> Document {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Build a selector rule.
pub fn rule(pattern: &str, groups: &[&str], username: &str) -> SelectorRule {
    SelectorRule {
        pattern: pattern.to_string(),
        groups: groups.iter().map(|g| g.to_string()).collect(),
        username: username.to_string(),
    }
}

/// In-memory [`ConfigStore`] with failure injection and write counting.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RefCell<BTreeMap<String, Document>>,
    failing_reads: RefCell<BTreeSet<String>>,
    fail_writes: Cell<bool>,
    writes: Cell<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str, document: Document) {
        self.documents.borrow_mut().insert(name.to_string(), document);
    }

    pub fn get(&self, name: &str) -> Option<Document> {
        self.documents.borrow().get(name).cloned()
    }

    /// Make every read of `name` fail.
    pub fn fail_reads_of(&self, name: &str) {
        self.failing_reads.borrow_mut().insert(name.to_string());
    }

    /// Make every write fail.
    pub fn fail_writes(&self) {
        self.fail_writes.set(true);
    }

    /// Number of successful writes.
    pub fn writes(&self) -> usize {
        self.writes.get()
    }
}

impl ConfigStore for MemoryStore {
    fn read_document(&self, name: &str) -> Result<Option<Document>, StoreError> {
        if self.failing_reads.borrow().contains(name) {
            return Err(StoreError::Unavailable {
                name: name.to_string(),
                reason: "injected read failure".to_string(),
            });
        }
        Ok(self.get(name))
    }

    fn write_document(&self, name: &str, document: &Document) -> Result<(), StoreError> {
        if self.fail_writes.get() {
            return Err(StoreError::Unavailable {
                name: name.to_string(),
                reason: "injected write failure".to_string(),
            });
        }
        self.insert(name, document.clone());
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }
}

/// In-memory [`IdentityDirectory`] serving fixed pages.
///
/// Markers are page indexes. An optional failing page (1-indexed) returns an
/// error when requested.
#[derive(Debug, Default)]
pub struct PagedDirectory {
    pages: Vec<Vec<Identity>>,
    failing_page: Option<usize>,
    fetched: Cell<usize>,
}

impl PagedDirectory {
    pub fn new(pages: Vec<Vec<Identity>>) -> Self {
        Self {
            pages,
            failing_page: None,
            fetched: Cell::new(0),
        }
    }

    pub fn single(identities: Vec<Identity>) -> Self {
        Self::new(vec![identities])
    }

    /// Fail when page `page` (1-indexed) is requested.
    pub fn failing_on(mut self, page: usize) -> Self {
        self.failing_page = Some(page);
        self
    }

    /// Number of page requests made, including failed ones.
    pub fn pages_fetched(&self) -> usize {
        self.fetched.get()
    }
}

impl IdentityDirectory for PagedDirectory {
    fn list_page(&self, marker: Option<&str>) -> Result<IdentityPage, DirectoryError> {
        self.fetched.set(self.fetched.get() + 1);
        let index = match marker {
            None => 0,
            Some(raw) => raw.parse::<usize>().map_err(|_| DirectoryError::InvalidMarker {
                marker: raw.to_string(),
            })?,
        };
        if self.failing_page == Some(index + 1) {
            return Err(DirectoryError::Unavailable {
                reason: format!("injected failure on page {}", index + 1),
            });
        }
        let identities = self.pages.get(index).cloned().unwrap_or_default();
        let next_marker = (index + 1 < self.pages.len()).then(|| (index + 1).to_string());
        Ok(IdentityPage {
            identities,
            next_marker,
        })
    }
}

/// [`EventSource`] replaying a fixed script, then cancelling.
#[derive(Debug)]
pub struct ScriptedEvents {
    events: VecDeque<LoopEvent>,
}

impl ScriptedEvents {
    pub fn new(events: Vec<LoopEvent>) -> Self {
        Self {
            events: events.into(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

impl EventSource for ScriptedEvents {
    fn next_event(&mut self) -> LoopEvent {
        self.events.pop_front().unwrap_or(LoopEvent::Cancel)
    }
}
