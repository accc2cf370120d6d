//! Store snapshots taken before every settings sync.
//!
//! Snapshots sit next to the store as `<store>.bak.<YYYYMMDDHHMMSS>` and only
//! the newest [`SNAPSHOT_RETENTION`] are kept.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};

use crate::error::{io_err, EnvError};

pub const SNAPSHOT_RETENTION: usize = 5;
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Copy the store at `env_path` to a timestamped sibling, then prune.
///
/// A timestamp already taken by an earlier snapshot is advanced one second
/// at a time so names stay unique and sortable.
pub fn snapshot_store(env_path: &Path, now: DateTime<Utc>, keep: usize) -> Result<PathBuf, EnvError> {
    let mut at = now;
    let target = loop {
        let candidate = snapshot_path(env_path, at);
        if !candidate.exists() {
            break candidate;
        }
        at += Duration::seconds(1);
    };

    fs::copy(env_path, &target).map_err(|e| io_err(&target, e))?;
    set_owner_only(&target)?;
    tracing::debug!(path = %target.display(), "store snapshot taken");

    let removed = prune_snapshots(env_path, keep)?;
    if !removed.is_empty() {
        tracing::debug!(removed = removed.len(), "old store snapshots pruned");
    }
    Ok(target)
}

/// `<store>.bak.<timestamp>`
pub fn snapshot_path(env_path: &Path, at: DateTime<Utc>) -> PathBuf {
    let name = env_file_name(env_path);
    env_path.with_file_name(format!("{name}.bak.{}", at.format(TIMESTAMP_FORMAT)))
}

/// All snapshots of `env_path`, newest first.
pub fn list_snapshots(env_path: &Path) -> Result<Vec<PathBuf>, EnvError> {
    let Some(dir) = env_path.parent() else {
        return Ok(vec![]);
    };
    let dir = if dir.as_os_str().is_empty() { Path::new(".") } else { dir };
    let prefix = format!("{}.bak.", env_file_name(env_path));

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(vec![]),
        Err(err) => return Err(io_err(dir, err)),
    };

    let mut snapshots: Vec<(String, PathBuf)> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            let stamp = name.strip_prefix(&prefix)?;
            is_timestamp(stamp).then(|| (stamp.to_string(), e.path()))
        })
        .collect();
    snapshots.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(snapshots.into_iter().map(|(_, p)| p).collect())
}

/// Delete every snapshot beyond the newest `keep`. Returns the removed paths.
pub fn prune_snapshots(env_path: &Path, keep: usize) -> Result<Vec<PathBuf>, EnvError> {
    let mut removed = Vec::new();
    for stale in list_snapshots(env_path)?.into_iter().skip(keep) {
        fs::remove_file(&stale).map_err(|e| io_err(&stale, e))?;
        removed.push(stale);
    }
    Ok(removed)
}

fn env_file_name(env_path: &Path) -> String {
    env_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(".env")
        .to_string()
}

fn is_timestamp(stamp: &str) -> bool {
    stamp.len() == 14 && stamp.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(unix)]
fn set_owner_only(path: &Path) -> Result<(), EnvError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_owner_only(_path: &Path) -> Result<(), EnvError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn snapshot_name_is_sortable_timestamp() {
        let path = snapshot_path(Path::new("/opt/runtipi/.env"), base_time());
        assert_eq!(path, PathBuf::from("/opt/runtipi/.env.bak.20260301120000"));
    }

    #[test]
    fn retention_keeps_newest_five() {
        let tmp = TempDir::new().unwrap();
        let env = tmp.path().join(".env");
        fs::write(&env, "A=1\n").unwrap();

        for i in 0..8 {
            snapshot_store(&env, base_time() + Duration::minutes(i), SNAPSHOT_RETENTION).unwrap();
        }

        let remaining = list_snapshots(&env).unwrap();
        assert_eq!(remaining.len(), SNAPSHOT_RETENTION);
        assert_eq!(remaining[0], snapshot_path(&env, base_time() + Duration::minutes(7)));
        assert_eq!(remaining[4], snapshot_path(&env, base_time() + Duration::minutes(3)));
    }

    #[test]
    fn same_second_snapshots_do_not_collide() {
        let tmp = TempDir::new().unwrap();
        let env = tmp.path().join(".env");
        fs::write(&env, "A=1\n").unwrap();

        let first = snapshot_store(&env, base_time(), 5).unwrap();
        let second = snapshot_store(&env, base_time(), 5).unwrap();
        assert_ne!(first, second);
        assert_eq!(list_snapshots(&env).unwrap().len(), 2);
    }

    #[test]
    fn unrelated_files_are_ignored() {
        let tmp = TempDir::new().unwrap();
        let env = tmp.path().join(".env");
        fs::write(&env, "A=1\n").unwrap();
        fs::write(tmp.path().join(".env.bak.manual"), "x").unwrap();
        fs::write(tmp.path().join(".env.tmp"), "x").unwrap();

        snapshot_store(&env, base_time(), 1).unwrap();
        assert!(tmp.path().join(".env.bak.manual").exists());
        assert_eq!(list_snapshots(&env).unwrap().len(), 1);
    }
}
