//! YAML encoding for the rules and result values.

use thiserror::Error;

use crate::core::types::{MappingEntry, SelectorRule};

/// The rules text is not a well-formed list of selector rules.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("rules value is blank")]
    Blank,
    #[error("malformed rules document")]
    Malformed(#[from] serde_yaml::Error),
}

/// The built entries could not be serialized.
#[derive(Debug, Error)]
#[error("failed to encode mapping entries")]
pub struct EncodeError(#[from] serde_yaml::Error);

/// Decode the rules value. An explicit `null` means no rules.
///
/// Blank text is rejected: an emptied value aborts the cycle instead of
/// clearing every mapping in the target.
pub fn decode_rules(text: &str) -> Result<Vec<SelectorRule>, DecodeError> {
    if text.trim().is_empty() {
        return Err(DecodeError::Blank);
    }
    let rules: Option<Vec<SelectorRule>> = serde_yaml::from_str(text)?;
    Ok(rules.unwrap_or_default())
}

/// Encode entries in the same format the rules are read in.
///
/// An empty list encodes as `[]` so stale values are always overwritten.
pub fn encode_entries(entries: &[MappingEntry]) -> Result<String, EncodeError> {
    Ok(serde_yaml::to_string(entries)?)
}
