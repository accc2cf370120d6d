//! Install layout: every path the lifecycle touches, derived from one root.
//!
//! # Storage layout
//!
//! ```text
//! <root>/
//!   .env                    (environment store, mode 0600)
//!   VERSION                 (version marker, written at finalize)
//!   runtipi-cli             (provisioned lifecycle binary)
//!   state/settings.json     (settings document, read-only to us)
//!   traefik/                (reverse-proxy configuration)
//!   user-config/            (user overrides)
//!   logs/lifecycle.log      (structured log)
//!   logs/runtipi-cli.log    (secondary, append-only CLI log)
//!   backups/                (archives, mode 0700)
//! ```

use std::path::{Path, PathBuf};

pub const ENV_FILE: &str = ".env";
pub const VERSION_FILE: &str = "VERSION";
pub const CLI_BINARY: &str = "runtipi-cli";
pub const STATE_DIR: &str = "state";
pub const SETTINGS_FILE: &str = "settings.json";
pub const TRAEFIK_DIR: &str = "traefik";
pub const USER_CONFIG_DIR: &str = "user-config";
pub const LOGS_DIR: &str = "logs";
pub const BACKUPS_DIR: &str = "backups";
pub const LIFECYCLE_LOG: &str = "lifecycle.log";
pub const CLI_LOG: &str = "runtipi-cli.log";

/// Resolved paths of one installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    root: PathBuf,
}

impl InstallLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn env_file(&self) -> PathBuf {
        self.root.join(ENV_FILE)
    }

    pub fn version_file(&self) -> PathBuf {
        self.root.join(VERSION_FILE)
    }

    pub fn cli_binary(&self) -> PathBuf {
        self.root.join(CLI_BINARY)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    pub fn settings_file(&self) -> PathBuf {
        self.state_dir().join(SETTINGS_FILE)
    }

    pub fn traefik_dir(&self) -> PathBuf {
        self.root.join(TRAEFIK_DIR)
    }

    pub fn user_config_dir(&self) -> PathBuf {
        self.root.join(USER_CONFIG_DIR)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS_DIR)
    }

    pub fn lifecycle_log(&self) -> PathBuf {
        self.logs_dir().join(LIFECYCLE_LOG)
    }

    pub fn cli_log(&self) -> PathBuf {
        self.logs_dir().join(CLI_LOG)
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.root.join(BACKUPS_DIR)
    }

    /// Root-relative subpaths captured by every backup archive, in archive order.
    pub fn backup_sources(&self) -> [&'static str; 4] {
        [ENV_FILE, STATE_DIR, TRAEFIK_DIR, USER_CONFIG_DIR]
    }

    /// An install exists when either the version marker or the store is present.
    pub fn is_installed(&self) -> bool {
        self.version_file().exists() || self.env_file().exists()
    }
}
