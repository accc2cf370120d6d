//! Environment store: the `KEY=VALUE` file consumed by the running service.
//!
//! ## Wire format
//!
//! One record per line, split at the first `=`. Keys are trimmed; values are
//! taken verbatim with no quoting or escaping, so a value cannot hold a
//! newline. Blank lines and `#` comments are accepted on read and dropped.
//!
//! ## `save_at`: hash-gated atomic write
//!
//! 1. Serialize the store.
//! 2. SHA-256 the new content and the current file; skip if identical.
//! 3. Write to `<path>.tmp` in the same directory. The temp file is created
//!    `0600` before any content lands in it, then given the current mode of
//!    the target (if one exists) once the content is flushed to disk.
//! 4. Rename over the target. A reader sees the old file or the new one,
//!    never a partial write.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use sha2::{Digest, Sha256};

use crate::error::{io_err, StoreError};

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Ordered mapping of unique keys to values. Iteration follows file order;
/// new keys append at the end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvStore {
    entries: IndexMap<String, String>,
}

impl EnvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse store text. Malformed lines are skipped with a warning.
    pub fn parse(content: &str) -> Self {
        let mut store = Self::new();
        for (idx, raw) in content.lines().enumerate() {
            let line = raw.strip_suffix('\r').unwrap_or(raw);
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                tracing::warn!(line = idx + 1, "skipping store line without '='");
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                tracing::warn!(line = idx + 1, "skipping store line with empty key");
                continue;
            }
            store.insert(key, value);
        }
        store
    }

    /// Render as newline-terminated `KEY=VALUE` records.
    pub fn to_env_string(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace a value. A replaced key keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvStore {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut store = Self::new();
        for (k, v) in iter {
            store.insert(k, v);
        }
        store
    }
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Outcome of a store write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// File was written (content changed or did not previously exist).
    Written { path: PathBuf },
    /// File was left untouched; content on disk is already identical.
    Unchanged { path: PathBuf },
}

impl WriteResult {
    pub fn path(&self) -> &Path {
        match self {
            WriteResult::Written { path } | WriteResult::Unchanged { path } => path,
        }
    }

    pub fn was_written(&self) -> bool {
        matches!(self, WriteResult::Written { .. })
    }
}

/// Load the store at `path`. A missing file is an empty store.
pub fn load_at(path: &Path) -> Result<EnvStore, StoreError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(EnvStore::parse(&content)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(EnvStore::new()),
        Err(err) => Err(io_err(path, err)),
    }
}

/// Atomically save `store` to `path`.
pub fn save_at(path: &Path, store: &EnvStore) -> Result<WriteResult, StoreError> {
    write_atomic(path, &store.to_env_string())
}

/// Atomically replace `path` with `content`, skipping identical content.
///
/// Used for the store itself and for small sibling files such as the version
/// marker, which share the same no-partial-write requirement.
pub fn write_atomic(path: &Path, content: &str) -> Result<WriteResult, StoreError> {
    let tmp = tmp_path_for(path);
    write_atomic_with_tmp(path, content, &tmp)
}

pub(crate) fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_atomic_with_tmp(path: &Path, content: &str, tmp: &Path) -> Result<WriteResult, StoreError> {
    let existing = match fs::read(path) {
        Ok(bytes) => Some(bytes),
        Err(err) if err.kind() == ErrorKind::NotFound => None,
        Err(err) => return Err(io_err(path, err)),
    };

    if let Some(existing) = &existing {
        if digest(existing) == digest(content.as_bytes()) {
            tracing::debug!(path = %path.display(), "store unchanged");
            return Ok(WriteResult::Unchanged {
                path: path.to_path_buf(),
            });
        }
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
    }

    let result = write_tmp(tmp, content, existing.is_some().then_some(path));
    if let Err(err) = result {
        let _ = fs::remove_file(tmp);
        return Err(err);
    }

    if let Err(e) = fs::rename(tmp, path) {
        let _ = fs::remove_file(tmp);
        return Err(io_err(path, e));
    }

    tracing::debug!(path = %path.display(), "store written");
    Ok(WriteResult::Written {
        path: path.to_path_buf(),
    })
}

fn write_tmp(tmp: &Path, content: &str, mode_from: Option<&Path>) -> Result<(), StoreError> {
    let mut file = create_owner_only(tmp)?;
    file.write_all(content.as_bytes())
        .map_err(|e| io_err(tmp, e))?;
    file.sync_all().map_err(|e| io_err(tmp, e))?;
    drop(file);

    match mode_from {
        Some(original) => {
            let perms = fs::metadata(original)
                .map_err(|e| io_err(original, e))?
                .permissions();
            fs::set_permissions(tmp, perms).map_err(|e| io_err(tmp, e))
        }
        None => set_owner_only(tmp),
    }
}

/// Create `tmp` fresh with mode `0600`. A leftover temp file from an
/// interrupted save is removed first, since `mode` only applies on creation.
fn create_owner_only(tmp: &Path) -> Result<File, StoreError> {
    match fs::remove_file(tmp) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(io_err(tmp, e)),
    }
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(tmp).map_err(|e| io_err(tmp, e))
}

fn digest(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}

#[cfg(unix)]
fn set_owner_only(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_owner_only(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
