//! Error types for tipi-env.

use std::path::PathBuf;

use thiserror::Error;

use tipi_core::StoreError;

/// All errors that can arise from reconciliation and settings sync.
#[derive(Debug, Error)]
pub enum EnvError {
    /// An error reading or writing the store itself.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The secure random source refused to produce bytes. Fatal: a secret
    /// must never be written with weak or missing entropy.
    #[error("secure random source failed: {0}")]
    Entropy(String),

    /// The settings document could not be read.
    #[error("cannot read settings at {path}: {source}")]
    SettingsRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The settings document is not valid JSON.
    #[error("malformed settings at {path}: {source}")]
    SettingsParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The settings document parsed, but its root is not an object.
    #[error("settings at {path} must be a JSON object")]
    SettingsNotObject { path: PathBuf },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience constructor for [`EnvError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> EnvError {
    EnvError::Io {
        path: path.into(),
        source,
    }
}
