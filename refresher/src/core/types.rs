//! Shared value types for selector matching.
//!
//! These types are rebuilt from scratch on every reconciliation cycle and are
//! never cached across cycles.

use serde::{Deserialize, Serialize};

/// One declarative selector rule from the rules document.
///
/// `pattern` is matched against identity references; matching identities are
/// bound to `groups` under `username`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SelectorRule {
    #[serde(alias = "arnRegex")]
    pub pattern: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub username: String,
}

/// A principal fetched from the identity directory.
///
/// Only the reference is used for matching; other attributes in the source are
/// ignored on decode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Identity {
    #[serde(rename = "arn", default)]
    pub reference: Option<String>,
}

impl Identity {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: Some(reference.into()),
        }
    }

    /// An identity with no reference. Never matches any rule.
    pub fn anonymous() -> Self {
        Self { reference: None }
    }
}

/// One output record binding an identity reference to groups and a username.
///
/// Field order is part of the written format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub groups: Vec<String>,
    #[serde(rename = "identity-reference")]
    pub identity_reference: String,
    pub username: String,
}
