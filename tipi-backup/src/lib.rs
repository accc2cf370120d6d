//! # tipi-backup
//!
//! Timestamped `.tar.gz` archives of an installation, with per-kind retention.
//!
//! Call [`create_backup`] before any destructive step. [`BackupError::NothingToBackup`]
//! is expected on a fresh install and callers treat it as a warning.

pub mod archive;
pub mod error;
pub mod retention;

pub use archive::{create_backup, create_backup_at, BackupRecord};
pub use error::BackupError;
pub use retention::{list_backups, prune_backups};
