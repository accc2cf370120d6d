//! Size-based rotation for the structured lifecycle log.
//!
//! The live file is never renamed or deleted, because the running process (or
//! an earlier one tailing it) may hold an open handle. Instead its content is
//! copied to `lifecycle.log.1` (older copies shift up to `.5`) and the live
//! file is truncated in place, keeping only its last lines.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Maximum log file size before rotation (10 MiB).
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Maximum number of rotated copies to keep.
pub const MAX_ROTATED_FILES: usize = 5;

/// Lines carried over into the live file after rotation.
pub const TAIL_LINES: usize = 200;

/// Rotate `log_path` if its size reached `max_bytes`.
///
/// Returns `true` if rotation occurred, `false` if the file was under the
/// threshold or does not exist yet.
pub fn rotate_in_place(
    log_path: &Path,
    max_bytes: u64,
    max_files: usize,
    keep_lines: usize,
) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };

    if size < max_bytes || max_files == 0 {
        return Ok(false);
    }

    let oldest = numbered_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..max_files).rev() {
        let src = numbered_path(log_path, n);
        if src.exists() {
            fs::rename(&src, numbered_path(log_path, n + 1))?;
        }
    }

    fs::copy(log_path, numbered_path(log_path, 1))?;

    let content = fs::read(log_path)?;
    let text = String::from_utf8_lossy(&content);
    let tail = tail_lines(&text, keep_lines);

    let mut live = OpenOptions::new().write(true).open(log_path)?;
    live.set_len(0)?;
    live.write_all(tail.as_bytes())?;
    live.sync_all()?;

    Ok(true)
}

/// Rotate the lifecycle log with the standard limits.
///
/// This runs before the subscriber exists, so the outcome is returned for
/// the caller to report once logging is up.
pub fn rotate_log(log_path: &Path) -> io::Result<bool> {
    rotate_in_place(log_path, MAX_LOG_BYTES, MAX_ROTATED_FILES, TAIL_LINES)
}

/// Emit the outcome of [`rotate_log`].
pub fn report_rotation(log_path: &Path, outcome: &io::Result<bool>) {
    match outcome {
        Ok(true) => tracing::info!(path = %log_path.display(), "log file rotated"),
        Ok(false) => {}
        Err(err) => tracing::warn!(path = %log_path.display(), error = %err, "log rotation failed"),
    }
}

fn tail_lines(text: &str, keep: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(keep);
    let mut out = lines[start..].join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Path of the `n`-th rotated copy of `base` (e.g. `lifecycle.log.2`).
fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("lifecycle.log");
    base.with_file_name(format!("{name}.{n}"))
}
