//! Error types for tipi-backup.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from backup operations.
#[derive(Debug, Error)]
pub enum BackupError {
    /// The install root is missing, or none of the archived subpaths exist.
    #[error("nothing to back up under {root}")]
    NothingToBackup { root: PathBuf },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BackupError {
    /// `NothingToBackup` is the expected outcome of a fresh install.
    pub fn is_empty_source(&self) -> bool {
        matches!(self, BackupError::NothingToBackup { .. })
    }
}

/// Convenience constructor for [`BackupError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> BackupError {
    BackupError::Io {
        path: path.into(),
        source,
    }
}
