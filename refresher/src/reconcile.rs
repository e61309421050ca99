//! Orchestration for a single reconciliation cycle.
//!
//! A cycle reads the selector rules, drains the identity directory, builds the
//! mapping, and rewrites the result key of the target document. The target is
//! only written after every earlier step has succeeded.

use std::fmt;

use thiserror::Error;
use tracing::{debug, error, info, instrument};

use crate::core::builder::{PatternError, build_entries};
use crate::core::types::SelectorRule;
use crate::io::codec::{DecodeError, EncodeError, decode_rules, encode_entries};
use crate::io::config::DocumentNames;
use crate::io::directory::{DirectoryError, IdentityDirectory, list_identities};
use crate::io::store::{ConfigStore, StoreError};

/// The step of a cycle, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStep {
    ReadRules,
    DecodeRules,
    ListIdentities,
    BuildEntries,
    ReadTarget,
    EncodeEntries,
    WriteTarget,
}

impl CycleStep {
    pub fn as_str(self) -> &'static str {
        match self {
            CycleStep::ReadRules => "read_rules",
            CycleStep::DecodeRules => "decode_rules",
            CycleStep::ListIdentities => "list_identities",
            CycleStep::BuildEntries => "build_entries",
            CycleStep::ReadTarget => "read_target",
            CycleStep::EncodeEntries => "encode_entries",
            CycleStep::WriteTarget => "write_target",
        }
    }
}

impl fmt::Display for CycleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a cycle ended early.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("read rules document {name:?}")]
    ReadRules {
        name: String,
        #[source]
        source: StoreError,
    },
    #[error("decode rules from {name:?} key {key:?}")]
    DecodeRules {
        name: String,
        key: String,
        #[source]
        source: DecodeError,
    },
    #[error("list identities")]
    ListIdentities(#[source] DirectoryError),
    #[error("build mapping entries")]
    BuildEntries(#[source] PatternError),
    #[error("read target document {name:?}")]
    ReadTarget {
        name: String,
        #[source]
        source: StoreError,
    },
    #[error("target document {name:?} does not exist")]
    MissingTarget { name: String },
    #[error("encode mapping entries")]
    EncodeEntries(#[source] EncodeError),
    #[error("write target document {name:?}")]
    WriteTarget {
        name: String,
        #[source]
        source: StoreError,
    },
}

impl CycleError {
    pub fn step(&self) -> CycleStep {
        match self {
            CycleError::ReadRules { .. } => CycleStep::ReadRules,
            CycleError::DecodeRules { .. } => CycleStep::DecodeRules,
            CycleError::ListIdentities(_) => CycleStep::ListIdentities,
            CycleError::BuildEntries(_) => CycleStep::BuildEntries,
            CycleError::ReadTarget { .. } | CycleError::MissingTarget { .. } => {
                CycleStep::ReadTarget
            }
            CycleError::EncodeEntries(_) => CycleStep::EncodeEntries,
            CycleError::WriteTarget { .. } => CycleStep::WriteTarget,
        }
    }
}

/// Counts from a cycle that wrote its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedCycle {
    pub rules: usize,
    pub identities: usize,
    pub entries: usize,
    /// Whether the written value differs from the one it replaced.
    pub changed: bool,
}

/// Result of [`Reconciler::run_once`]. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Applied(AppliedCycle),
    Aborted { step: CycleStep },
}

/// Runs reconciliation cycles against a store and a directory.
pub struct Reconciler<'a, S: ?Sized, D: ?Sized> {
    store: &'a S,
    directory: &'a D,
    names: DocumentNames,
    max_pages: usize,
}

impl<'a, S: ConfigStore + ?Sized, D: IdentityDirectory + ?Sized> Reconciler<'a, S, D> {
    pub fn new(store: &'a S, directory: &'a D, names: DocumentNames, max_pages: usize) -> Self {
        Self {
            store,
            directory,
            names,
            max_pages,
        }
    }

    /// Run one cycle. Failures are logged and reported as
    /// [`CycleOutcome::Aborted`]; they never propagate.
    #[instrument(skip(self), fields(source = %self.names.source, target = %self.names.target))]
    pub fn run_once(&self) -> CycleOutcome {
        match self.try_run_once() {
            Ok(applied) => {
                info!(
                    rules = applied.rules,
                    identities = applied.identities,
                    entries = applied.entries,
                    changed = applied.changed,
                    "reconciliation cycle applied"
                );
                CycleOutcome::Applied(applied)
            }
            Err(err) => {
                let step = err.step();
                let err = anyhow::Error::new(err);
                error!(step = %step, "reconciliation cycle failed: {err:#}");
                CycleOutcome::Aborted { step }
            }
        }
    }

    /// Run one cycle and return the first failure, if any.
    pub fn try_run_once(&self) -> Result<AppliedCycle, CycleError> {
        let rules = self.load_rules()?;

        let identities =
            list_identities(self.directory, self.max_pages).map_err(CycleError::ListIdentities)?;
        debug!(count = identities.len(), "identities listed");

        let entries = build_entries(&rules, &identities).map_err(CycleError::BuildEntries)?;
        debug!(count = entries.len(), "mapping entries built");

        let target_name = &self.names.target;
        let mut target = self
            .store
            .read_document(target_name)
            .map_err(|source| CycleError::ReadTarget {
                name: target_name.clone(),
                source,
            })?
            .ok_or_else(|| CycleError::MissingTarget {
                name: target_name.clone(),
            })?;

        let value = encode_entries(&entries).map_err(CycleError::EncodeEntries)?;

        let previous = target.insert(self.names.result_key.clone(), value);
        let changed = previous.as_ref() != target.get(&self.names.result_key);
        self.store
            .write_document(target_name, &target)
            .map_err(|source| CycleError::WriteTarget {
                name: target_name.clone(),
                source,
            })?;

        Ok(AppliedCycle {
            rules: rules.len(),
            identities: identities.len(),
            entries: entries.len(),
            changed,
        })
    }

    /// Read and decode the rules. A missing document or key means no rules.
    fn load_rules(&self) -> Result<Vec<SelectorRule>, CycleError> {
        let source_name = &self.names.source;
        let key = &self.names.rules_key;
        let document = self
            .store
            .read_document(source_name)
            .map_err(|source| CycleError::ReadRules {
                name: source_name.clone(),
                source,
            })?;
        let Some(document) = document else {
            debug!(document = %source_name, "rules document not found, using no rules");
            return Ok(Vec::new());
        };
        let Some(text) = document.get(key) else {
            debug!(document = %source_name, key = %key, "no rules found");
            return Ok(Vec::new());
        };
        let rules = decode_rules(text).map_err(|source| CycleError::DecodeRules {
            name: source_name.clone(),
            key: key.clone(),
            source,
        })?;
        debug!(count = rules.len(), "rules decoded");
        Ok(rules)
    }
}
