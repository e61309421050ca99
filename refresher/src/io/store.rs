//! Document store abstraction for the rules source and the result target.
//!
//! The [`ConfigStore`] trait decouples reconciliation from the backend that
//! holds the documents. [`FileConfigStore`] keeps each document as a YAML map
//! on disk; tests use in-memory stores.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument};

/// A named key/value document, shaped like a config map's data section.
///
/// Keys are kept sorted so a rewritten document serializes deterministically.
pub type Document = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read document {name:?} at {path}")]
    Read {
        name: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("document {name:?} at {path} is not a string map")]
    Parse {
        name: String,
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to serialize document {name:?}")]
    Serialize {
        name: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to write document {name:?} at {path}")]
    Write {
        name: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("store unavailable for document {name:?}: {reason}")]
    Unavailable { name: String, reason: String },
}

/// Read and replace whole named documents.
pub trait ConfigStore {
    /// Read a document. `Ok(None)` means the document does not exist.
    fn read_document(&self, name: &str) -> Result<Option<Document>, StoreError>;

    /// Replace a document in full. Either the whole write lands or nothing does.
    fn write_document(&self, name: &str, document: &Document) -> Result<(), StoreError>;
}

/// Store that keeps each document at `<dir>/<name>.yaml`.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    dir: PathBuf,
}

impl FileConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn document_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.yaml"))
    }
}

impl ConfigStore for FileConfigStore {
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    fn read_document(&self, name: &str) -> Result<Option<Document>, StoreError> {
        let path = self.document_path(name);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "document not found");
                return Ok(None);
            }
            Err(source) => {
                return Err(StoreError::Read {
                    name: name.to_string(),
                    path,
                    source,
                });
            }
        };
        if contents.trim().is_empty() {
            return Ok(Some(Document::new()));
        }
        let document: Option<Document> =
            serde_yaml::from_str(&contents).map_err(|source| StoreError::Parse {
                name: name.to_string(),
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), keys = document.as_ref().map_or(0, |d| d.len()), "document loaded");
        Ok(Some(document.unwrap_or_default()))
    }

    #[instrument(skip(self, document), fields(dir = %self.dir.display(), keys = document.len()))]
    fn write_document(&self, name: &str, document: &Document) -> Result<(), StoreError> {
        let buf = serde_yaml::to_string(document).map_err(|source| StoreError::Serialize {
            name: name.to_string(),
            source,
        })?;
        let path = self.document_path(name);
        write_atomic(&path, &buf).map_err(|source| StoreError::Write {
            name: name.to_string(),
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "document written");
        Ok(())
    }
}

/// Write via temp file + rename so readers never see a half-written document.
fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("yaml.tmp");
    fs::write(&tmp_path, contents)?;
    fs::rename(&tmp_path, path)
}
