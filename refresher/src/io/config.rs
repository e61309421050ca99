//! Refresher configuration loaded from an optional TOML file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Longest accepted refresh interval (one week).
pub const MAX_REFRESH_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

/// Refresher configuration (TOML).
///
/// Missing fields default to the values the refresher has always shipped with.
/// Command-line flags override whatever is loaded here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RefresherConfig {
    /// Seconds between reconciliation cycles.
    pub refresh_interval_secs: u64,

    /// Directory holding one YAML file per document.
    pub store_dir: PathBuf,

    /// YAML list of identities served by the file-backed directory.
    pub directory_file: PathBuf,

    /// Identities per directory page.
    pub page_size: usize,

    /// Give up on a listing that is still truncated after this many pages.
    pub max_pages: usize,

    pub documents: DocumentNames,
}

/// Names of the documents and keys the reconciler reads and writes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DocumentNames {
    /// Document holding the selector rules.
    pub source: String,
    /// Key within `source` holding the rules list.
    pub rules_key: String,
    /// Document receiving the built mapping.
    pub target: String,
    /// Key within `target` that is replaced each cycle.
    pub result_key: String,
}

impl Default for DocumentNames {
    fn default() -> Self {
        Self {
            source: "aws-auth-refresher".to_string(),
            rules_key: "mapUsers".to_string(),
            target: "aws-auth".to_string(),
            result_key: "mapUsers".to_string(),
        }
    }
}

impl Default for RefresherConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 15,
            store_dir: PathBuf::from("documents"),
            directory_file: PathBuf::from("identities.yaml"),
            page_size: 100,
            max_pages: 10_000,
            documents: DocumentNames::default(),
        }
    }
}

impl RefresherConfig {
    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval_secs == 0 {
            return Err(anyhow!("refresh_interval_secs must be > 0"));
        }
        if self.refresh_interval_secs > MAX_REFRESH_INTERVAL_SECS {
            return Err(anyhow!(
                "refresh_interval_secs must be <= {MAX_REFRESH_INTERVAL_SECS}"
            ));
        }
        if self.page_size == 0 {
            return Err(anyhow!("page_size must be > 0"));
        }
        if self.max_pages == 0 {
            return Err(anyhow!("max_pages must be > 0"));
        }
        let names = [
            ("documents.source", &self.documents.source),
            ("documents.rules_key", &self.documents.rules_key),
            ("documents.target", &self.documents.target),
            ("documents.result_key", &self.documents.result_key),
        ];
        for (field, value) in names {
            if value.trim().is_empty() {
                return Err(anyhow!("{field} must be non-empty"));
            }
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RefresherConfig::default()`.
pub fn load_config(path: &Path) -> Result<RefresherConfig> {
    if !path.exists() {
        let cfg = RefresherConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RefresherConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, RefresherConfig::default());
        assert_eq!(cfg.refresh_interval(), Duration::from_secs(15));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("refresher.toml");
        fs::write(
            &path,
            "refresh_interval_secs = 60\n\n[documents]\ntarget = \"auth-map\"\n",
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.refresh_interval_secs, 60);
        assert_eq!(cfg.documents.target, "auth-map");
        assert_eq!(cfg.documents.source, "aws-auth-refresher");
        assert_eq!(cfg.page_size, 100);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("refresher.toml");
        fs::write(&path, "refresh_interval_secs = 0\n").expect("write");

        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("refresh_interval_secs"));
    }

    #[test]
    fn oversized_interval_is_rejected() {
        let cfg = RefresherConfig {
            refresh_interval_secs: u64::MAX,
            ..RefresherConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("refresh_interval_secs must be <="));

        let cfg = RefresherConfig {
            refresh_interval_secs: MAX_REFRESH_INTERVAL_SECS,
            ..RefresherConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn blank_document_name_is_rejected() {
        let cfg = RefresherConfig {
            documents: DocumentNames {
                result_key: " ".to_string(),
                ..DocumentNames::default()
            },
            ..RefresherConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("documents.result_key"));
    }
}
