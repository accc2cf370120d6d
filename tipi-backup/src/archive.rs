//! Archive creation.
//!
//! Archives are named `<prefix>-<kind>-<YYYYMMDDHHMMSS>.tar.gz` under
//! `<root>/backups/`. The archive is written to a `.partial` sibling that is
//! created owner-only, renamed into place once complete, and chmod `0600`
//! again so that secrets in the archived store never become readable.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;

use tipi_core::{BackupKind, InstallLayout};

use crate::error::{io_err, BackupError};
use crate::retention::prune_backups;

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// A backup archive on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    pub path: PathBuf,
    pub timestamp: DateTime<Utc>,
    pub kind: BackupKind,
}

/// Create a backup of `layout` now, then prune `kind` down to `retention`.
pub fn create_backup(
    layout: &InstallLayout,
    prefix: &str,
    kind: BackupKind,
    retention: usize,
) -> Result<BackupRecord, BackupError> {
    create_backup_at(layout, prefix, kind, retention, Utc::now())
}

/// Create a backup stamped `now`.
///
/// If an archive with the same stamp already exists, the stamp advances one
/// second at a time until the name is free.
pub fn create_backup_at(
    layout: &InstallLayout,
    prefix: &str,
    kind: BackupKind,
    retention: usize,
    now: DateTime<Utc>,
) -> Result<BackupRecord, BackupError> {
    let root = layout.root();
    let sources: Vec<&str> = if root.is_dir() {
        layout
            .backup_sources()
            .into_iter()
            .filter(|rel| root.join(rel).exists())
            .collect()
    } else {
        Vec::new()
    };
    if sources.is_empty() {
        return Err(BackupError::NothingToBackup {
            root: root.to_path_buf(),
        });
    }

    let dir = layout.backups_dir();
    fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    set_mode(&dir, 0o700)?;

    let mut timestamp = truncate_to_seconds(now);
    let target = loop {
        let candidate = dir.join(archive_name(prefix, kind, timestamp));
        if !candidate.exists() {
            break candidate;
        }
        timestamp += Duration::seconds(1);
    };
    let partial = PathBuf::from(format!("{}.partial", target.display()));

    if let Err(err) = write_archive(root, &sources, &partial) {
        let _ = fs::remove_file(&partial);
        return Err(err);
    }
    if let Err(e) = fs::rename(&partial, &target) {
        let _ = fs::remove_file(&partial);
        return Err(io_err(&target, e));
    }
    set_mode(&target, 0o600)?;

    tracing::info!(path = %target.display(), kind = %kind, sources = sources.len(), "backup created");

    let removed = prune_backups(layout, prefix, kind, retention)?;
    for path in &removed {
        tracing::info!(path = %path.display(), "old backup removed");
    }

    Ok(BackupRecord {
        path: target,
        timestamp,
        kind,
    })
}

/// `<prefix>-<kind>-<YYYYMMDDHHMMSS>.tar.gz`
pub fn archive_name(prefix: &str, kind: BackupKind, at: DateTime<Utc>) -> String {
    format!(
        "{prefix}-{kind}-{}{ARCHIVE_SUFFIX}",
        at.format(TIMESTAMP_FORMAT)
    )
}

/// Recover the timestamp from an archive file name of the given prefix and kind.
pub fn parse_archive_name(prefix: &str, kind: BackupKind, file_name: &str) -> Option<DateTime<Utc>> {
    let stamp = file_name
        .strip_prefix(&format!("{prefix}-{kind}-"))?
        .strip_suffix(ARCHIVE_SUFFIX)?;
    if stamp.len() != 14 || !stamp.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

fn write_archive(root: &Path, sources: &[&str], partial: &Path) -> Result<(), BackupError> {
    let file = create_owner_only(partial)?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);

    for rel in sources {
        let path = root.join(rel);
        let appended = if path.is_dir() {
            builder.append_dir_all(rel, &path)
        } else {
            builder.append_path_with_name(&path, rel)
        };
        appended.map_err(|e| io_err(&path, e))?;
    }

    let encoder = builder.into_inner().map_err(|e| io_err(partial, e))?;
    let file = encoder.finish().map_err(|e| io_err(partial, e))?;
    file.sync_all().map_err(|e| io_err(partial, e))
}

fn truncate_to_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(at.timestamp(), 0).unwrap_or(at)
}

#[cfg(unix)]
fn create_owner_only(path: &Path) -> Result<File, BackupError> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn create_owner_only(path: &Path) -> Result<File, BackupError> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| io_err(path, e))
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), BackupError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), BackupError> {
    Ok(())
}
