//! Listing and pruning of backup archives, per kind.

use std::fs;
use std::path::PathBuf;

use tipi_core::{BackupKind, InstallLayout};

use crate::archive::{parse_archive_name, BackupRecord};
use crate::error::{io_err, BackupError};

/// All archives of `kind` under `<root>/backups/`, newest first.
///
/// A missing backups directory yields an empty list. Files whose names do not
/// match the archive pattern are ignored.
pub fn list_backups(
    layout: &InstallLayout,
    prefix: &str,
    kind: BackupKind,
) -> Result<Vec<BackupRecord>, BackupError> {
    let dir = layout.backups_dir();
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(&dir, e)),
    };

    let mut records = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_err(&dir, e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(timestamp) = parse_archive_name(prefix, kind, name) {
            records.push(BackupRecord {
                path: entry.path(),
                timestamp,
                kind,
            });
        }
    }
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Ok(records)
}

/// Delete all but the `keep` newest archives of `kind`. Returns removed paths.
///
/// Other kinds are never touched, so a burst of scheduled backups cannot
/// evict the pre-upgrade ones.
pub fn prune_backups(
    layout: &InstallLayout,
    prefix: &str,
    kind: BackupKind,
    keep: usize,
) -> Result<Vec<PathBuf>, BackupError> {
    let records = list_backups(layout, prefix, kind)?;
    let mut removed = Vec::new();
    for record in records.into_iter().skip(keep) {
        fs::remove_file(&record.path).map_err(|e| io_err(&record.path, e))?;
        removed.push(record.path);
    }
    Ok(removed)
}
