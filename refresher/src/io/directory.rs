//! Identity directory abstraction and the paged listing drain.
//!
//! Directories expose a marker-based paged protocol. [`list_identities`] drains
//! it to exhaustion before any matching happens; a failure on any page discards
//! everything fetched so far.

use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::core::types::Identity;

/// One page of a directory listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityPage {
    pub identities: Vec<Identity>,
    /// Marker for the next page; `None` when the listing is complete.
    pub next_marker: Option<String>,
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("failed to read identity source {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("identity source {path} is not a list of identities")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid page marker {marker:?}")]
    InvalidMarker { marker: String },
    #[error("directory unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("failed to list identities on page {page}")]
    Page {
        page: usize,
        #[source]
        source: Box<DirectoryError>,
    },
    #[error("identity listing did not finish within {max_pages} pages")]
    TooManyPages { max_pages: usize },
}

/// A source of identities served in pages.
pub trait IdentityDirectory {
    /// Fetch the page starting at `marker` (`None` for the first page).
    fn list_page(&self, marker: Option<&str>) -> Result<IdentityPage, DirectoryError>;
}

/// Drain every page of `directory` and return the complete population.
///
/// Stops with [`DirectoryError::TooManyPages`] once `max_pages` pages have been
/// fetched and the directory still reports more.
#[instrument(skip(directory))]
pub fn list_identities<D: IdentityDirectory + ?Sized>(
    directory: &D,
    max_pages: usize,
) -> Result<Vec<Identity>, DirectoryError> {
    let mut identities = Vec::new();
    let mut marker: Option<String> = None;
    for page in 1..=max_pages {
        let fetched = directory
            .list_page(marker.as_deref())
            .map_err(|source| DirectoryError::Page {
                page,
                source: Box::new(source),
            })?;
        debug!(page, count = fetched.identities.len(), "fetched identity page");
        identities.extend(fetched.identities);
        match fetched.next_marker {
            Some(next) => marker = Some(next),
            None => return Ok(identities),
        }
    }
    warn!(max_pages, "identity listing still truncated at page limit");
    Err(DirectoryError::TooManyPages { max_pages })
}

/// Directory backed by a YAML list of identity records on disk.
///
/// The file is read once when the first page is requested; later pages are
/// served from that snapshot so a listing never mixes two versions of the
/// file. Markers are offsets into the snapshot.
#[derive(Debug, Clone)]
pub struct FileIdentityDirectory {
    path: PathBuf,
    page_size: usize,
    snapshot: RefCell<Vec<Identity>>,
}

impl FileIdentityDirectory {
    pub fn new(path: impl Into<PathBuf>, page_size: usize) -> Self {
        Self {
            path: path.into(),
            page_size: page_size.max(1),
            snapshot: RefCell::new(Vec::new()),
        }
    }

    fn load(&self) -> Result<Vec<Identity>, DirectoryError> {
        let contents = fs::read_to_string(&self.path).map_err(|source| DirectoryError::Read {
            path: self.path.clone(),
            source,
        })?;
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        let identities: Option<Vec<Identity>> =
            serde_yaml::from_str(&contents).map_err(|source| DirectoryError::Parse {
                path: self.path.clone(),
                source,
            })?;
        Ok(identities.unwrap_or_default())
    }
}

impl IdentityDirectory for FileIdentityDirectory {
    fn list_page(&self, marker: Option<&str>) -> Result<IdentityPage, DirectoryError> {
        if marker.is_none() {
            *self.snapshot.borrow_mut() = self.load()?;
        }
        let all = self.snapshot.borrow();
        let offset = match marker {
            None => 0,
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|offset| *offset <= all.len())
                .ok_or_else(|| DirectoryError::InvalidMarker {
                    marker: raw.to_string(),
                })?,
        };
        let end = offset.saturating_add(self.page_size).min(all.len());
        Ok(IdentityPage {
            identities: all[offset..end].to_vec(),
            next_marker: (end < all.len()).then(|| end.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_source(dir: &std::path::Path, count: usize) -> PathBuf {
        let path = dir.join("identities.yaml");
        let mut buf = String::new();
        for i in 0..count {
            buf.push_str(&format!(
                "- arn: arn:aws:iam::111:user/u{i}\n  userName: u{i}\n"
            ));
        }
        fs::write(&path, buf).expect("write identities");
        path
    }

    #[test]
    fn file_directory_pages_through_all_identities() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = write_source(temp.path(), 5);
        let directory = FileIdentityDirectory::new(&path, 2);

        let first = directory.list_page(None).expect("page 1");
        assert_eq!(first.identities.len(), 2);
        assert_eq!(first.next_marker.as_deref(), Some("2"));

        let identities = list_identities(&directory, 10).expect("list");
        let refs: Vec<_> = identities
            .iter()
            .filter_map(|i| i.reference.as_deref())
            .collect();
        assert_eq!(
            refs,
            vec![
                "arn:aws:iam::111:user/u0",
                "arn:aws:iam::111:user/u1",
                "arn:aws:iam::111:user/u2",
                "arn:aws:iam::111:user/u3",
                "arn:aws:iam::111:user/u4",
            ]
        );
    }

    #[test]
    fn records_without_arn_decode_as_anonymous() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("identities.yaml");
        fs::write(&path, "- userName: ghost\n- arn: arn:x\n").expect("write");
        let directory = FileIdentityDirectory::new(&path, 10);

        let identities = list_identities(&directory, 1).expect("list");
        assert_eq!(identities, vec![Identity::anonymous(), Identity::new("arn:x")]);
    }

    #[test]
    fn exhausting_page_limit_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = write_source(temp.path(), 3);
        let directory = FileIdentityDirectory::new(&path, 1);

        let err = list_identities(&directory, 2).unwrap_err();
        assert!(matches!(err, DirectoryError::TooManyPages { max_pages: 2 }));
    }

    #[test]
    fn huge_page_size_returns_everything_in_one_page() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = write_source(temp.path(), 3);
        let directory = FileIdentityDirectory::new(&path, usize::MAX);

        let first = directory.list_page(None).expect("page 1");
        assert_eq!(first.identities.len(), 3);
        assert!(first.next_marker.is_none());

        let rest = directory.list_page(Some("1")).expect("from offset 1");
        assert_eq!(rest.identities.len(), 2);
        assert!(rest.next_marker.is_none());
    }

    #[test]
    fn listing_uses_one_snapshot_even_if_file_changes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = write_source(temp.path(), 4);
        let directory = FileIdentityDirectory::new(&path, 2);

        let first = directory.list_page(None).expect("page 1");
        fs::write(&path, "- arn: arn:aws:iam::111:user/new\n").expect("rewrite");
        let second = directory
            .list_page(first.next_marker.as_deref())
            .expect("page 2");
        let refs: Vec<_> = second
            .identities
            .iter()
            .filter_map(|i| i.reference.as_deref())
            .collect();
        assert_eq!(refs, vec!["arn:aws:iam::111:user/u2", "arn:aws:iam::111:user/u3"]);
        assert!(second.next_marker.is_none());

        let fresh = list_identities(&directory, 10).expect("relist");
        assert_eq!(fresh, vec![Identity::new("arn:aws:iam::111:user/new")]);
    }

    #[test]
    fn bogus_marker_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = write_source(temp.path(), 1);
        let directory = FileIdentityDirectory::new(&path, 1);

        assert!(matches!(
            directory.list_page(Some("nope")),
            Err(DirectoryError::InvalidMarker { .. })
        ));
        assert!(matches!(
            directory.list_page(Some("7")),
            Err(DirectoryError::InvalidMarker { .. })
        ));
    }

    #[test]
    fn missing_source_fails_first_page() {
        let temp = tempfile::tempdir().expect("tempdir");
        let directory = FileIdentityDirectory::new(temp.path().join("absent.yaml"), 1);

        let err = list_identities(&directory, 3).unwrap_err();
        assert!(matches!(err, DirectoryError::Page { page: 1, .. }));
    }
}
