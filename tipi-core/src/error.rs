//! Error types for tipi-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from store and layout operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure, with the path that caused it.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A version string that is not `MAJOR.MINOR.PATCH[.rN]`.
    #[error("invalid package version '{input}': {reason}")]
    InvalidVersion { input: String, reason: &'static str },

    /// An unknown backup kind name.
    #[error("unknown backup kind '{0}'; expected: scheduled, pre-upgrade")]
    UnknownBackupKind(String),
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
