//! Secure permission policy applied at Finalize.

use std::fs;
use std::path::PathBuf;

use tipi_core::InstallLayout;

use crate::error::{io_err, LifecycleError};

/// `(path relative to root, mode)`. Secrets are owner-only; state
/// directories are restored to what the service expects.
pub const PERMISSION_POLICY: [(&str, u32); 8] = [
    (".env", 0o600),
    ("state/settings.json", 0o600),
    ("traefik/shared/acme.json", 0o600),
    ("backups", 0o700),
    ("state", 0o755),
    ("logs", 0o755),
    ("traefik", 0o755),
    ("user-config", 0o755),
];

/// Apply [`PERMISSION_POLICY`] to the paths that exist. Returns the paths changed.
pub fn apply_secure_permissions(layout: &InstallLayout) -> Result<Vec<PathBuf>, LifecycleError> {
    let mut applied = Vec::new();
    for (rel, mode) in PERMISSION_POLICY {
        let path = layout.root().join(rel);
        if !path.exists() {
            continue;
        }
        set_mode(&path, mode)?;
        applied.push(path);
    }
    tracing::debug!(count = applied.len(), "permission policy applied");
    Ok(applied)
}

#[cfg(unix)]
fn set_mode(path: &std::path::Path, mode: u32) -> Result<(), LifecycleError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_mode(_path: &std::path::Path, _mode: u32) -> Result<(), LifecycleError> {
    Ok(())
}
