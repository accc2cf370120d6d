//! Tracing setup: human output on stderr, JSON lines in `logs/lifecycle.log`.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use tipi_core::InstallLayout;

use crate::log_rotation;

/// Install the global subscriber.
///
/// With a layout, the structured log is rotated and then opened for append;
/// its path is returned. When it cannot be opened only stderr is used. The
/// rotation outcome is logged once the subscriber is installed.
pub fn init(layout: Option<&InstallLayout>) -> Option<PathBuf> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let log_path = layout.map(InstallLayout::lifecycle_log);
    let (file, rotation) = match log_path.as_deref() {
        Some(path) => {
            let (file, rotation) = open_log_file(path);
            (file, Some(rotation))
        }
        None => (None, None),
    };
    let opened = file.is_some();
    let file_layer = file.map(|file| {
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_current_span(false)
            .with_writer(Mutex::new(file))
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    if let (Some(path), Some(rotation)) = (log_path.as_deref(), rotation.as_ref()) {
        log_rotation::report_rotation(path, rotation);
    }

    if opened {
        log_path
    } else {
        None
    }
}

/// Rotate then open the structured log, returning the rotation outcome
/// unreported.
fn open_log_file(path: &Path) -> (Option<File>, io::Result<bool>) {
    if let Some(dir) = path.parent() {
        if let Err(err) = fs::create_dir_all(dir) {
            return (None, Err(err));
        }
    }
    let rotation = log_rotation::rotate_log(path);
    let file = OpenOptions::new().create(true).append(true).open(path).ok();
    (file, rotation)
}
