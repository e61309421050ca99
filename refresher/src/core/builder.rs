//! Selector matching: turns rules and identities into mapping entries.

use regex::Regex;
use thiserror::Error;

use crate::core::types::{Identity, MappingEntry, SelectorRule};

/// A rule pattern failed to compile. The whole rule set is rejected.
#[derive(Debug, Error)]
#[error("rule {index} has invalid pattern {pattern:?}")]
pub struct PatternError {
    pub index: usize,
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

/// Build the mapping entries for `identities` according to `rules`.
///
/// Entries are emitted rule by rule in declaration order, and within a rule in
/// directory order. Matching is an unanchored search over the identity
/// reference. Identities matching several rules appear once per rule.
///
/// Every pattern is compiled before any matching starts, so a bad pattern
/// anywhere yields no entries at all.
pub fn build_entries(
    rules: &[SelectorRule],
    identities: &[Identity],
) -> Result<Vec<MappingEntry>, PatternError> {
    let compiled = compile_rules(rules)?;

    let mut entries = Vec::new();
    for (rule, regex) in rules.iter().zip(&compiled) {
        for reference in identities.iter().filter_map(|i| i.reference.as_deref()) {
            if regex.is_match(reference) {
                entries.push(MappingEntry {
                    groups: rule.groups.clone(),
                    identity_reference: reference.to_string(),
                    username: rule.username.clone(),
                });
            }
        }
    }
    Ok(entries)
}

fn compile_rules(rules: &[SelectorRule]) -> Result<Vec<Regex>, PatternError> {
    rules
        .iter()
        .enumerate()
        .map(|(index, rule)| {
            Regex::new(&rule.pattern).map_err(|source| PatternError {
                index,
                pattern: rule.pattern.clone(),
                source,
            })
        })
        .collect()
}
