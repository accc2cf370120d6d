//! Injection check for values written to the environment store.
//!
//! The store is sourced by shell tooling on the host, so any value carrying a
//! command substitution, separator, or redirection is refused outright. A
//! newline would split one record into two and is refused for the same reason.

use thiserror::Error;

/// Sequences that must never appear in a stored value.
pub const FORBIDDEN_SEQUENCES: &[&str] = &["$(", "${", "`", ";", "|", ">", "<", "&", "\n", "\r"];

/// A value refused by [`check_value`]. The value itself is never rendered,
/// since it may be a secret.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("value for {key} contains forbidden sequence {sequence:?}")]
pub struct UnsafeValue {
    pub key: String,
    pub sequence: &'static str,
}

/// Check a single assignment. Returns the first forbidden sequence found.
pub fn check_value(key: &str, value: &str) -> Result<(), UnsafeValue> {
    match FORBIDDEN_SEQUENCES.iter().find(|seq| value.contains(**seq)) {
        Some(sequence) => Err(UnsafeValue {
            key: key.to_string(),
            sequence,
        }),
        None => Ok(()),
    }
}

pub fn is_safe_value(value: &str) -> bool {
    check_value("", value).is_ok()
}
