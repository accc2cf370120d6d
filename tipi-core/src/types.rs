//! Shared domain enums.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Why a backup archive was taken. Each kind has its own retention budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BackupKind {
    #[default]
    Scheduled,
    PreUpgrade,
}

impl BackupKind {
    /// Number of archives kept when no explicit retention is configured.
    pub fn default_retention(self) -> usize {
        match self {
            BackupKind::Scheduled => 5,
            BackupKind::PreUpgrade => 3,
        }
    }

    /// Name used inside archive file names.
    pub fn as_str(self) -> &'static str {
        match self {
            BackupKind::Scheduled => "scheduled",
            BackupKind::PreUpgrade => "pre-upgrade",
        }
    }

    pub fn all() -> &'static [BackupKind] {
        &[BackupKind::Scheduled, BackupKind::PreUpgrade]
    }
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "scheduled" => Ok(BackupKind::Scheduled),
            "pre-upgrade" | "pre_upgrade" => Ok(BackupKind::PreUpgrade),
            other => Err(StoreError::UnknownBackupKind(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_kind_display_and_parse() {
        for kind in BackupKind::all() {
            let parsed: BackupKind = kind.to_string().parse().expect("parse");
            assert_eq!(parsed, *kind);
        }
        assert_eq!(BackupKind::PreUpgrade.to_string(), "pre-upgrade");
    }

    #[test]
    fn default_retention_per_kind() {
        assert_eq!(BackupKind::Scheduled.default_retention(), 5);
        assert_eq!(BackupKind::PreUpgrade.default_retention(), 3);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = "nightly".parse::<BackupKind>().unwrap_err();
        assert!(err.to_string().contains("nightly"));
    }
}
