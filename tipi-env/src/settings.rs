//! Settings synchronizer: projects `state/settings.json` onto the store.
//!
//! The projection is deliberately one-sided compared to the reconciler: it
//! only ever updates keys that already exist in the store, and never adds
//! one. Empty or null settings leave the store value alone.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use tipi_core::validate::{check_value, UnsafeValue};
use tipi_core::{env_store, EnvStore, WriteResult};

use crate::error::EnvError;
use crate::snapshot::{snapshot_store, SNAPSHOT_RETENTION};

/// A versioned mapping from settings keys (camelCase) to store keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslationTable {
    pub version: u32,
    pub entries: &'static [(&'static str, &'static str)],
}

impl TranslationTable {
    pub fn store_key(&self, setting: &str) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(from, _)| *from == setting)
            .map(|(_, to)| *to)
    }
}

pub const SETTINGS_TABLE_V1: TranslationTable = TranslationTable {
    version: 1,
    entries: &[
        ("appsRepoUrl", "APPS_REPOSITORY_URL"),
        ("domain", "DOMAIN"),
        ("localDomain", "LOCAL_DOMAIN"),
        ("internalIp", "INTERNAL_IP"),
        ("dnsIp", "DNS_IP"),
        ("port", "NGINX_PORT"),
        ("sslPort", "NGINX_PORT_SSL"),
        ("listenIp", "LISTEN_IP"),
        ("postgresPort", "POSTGRES_PORT"),
        ("appDataPath", "RUNTIPI_APP_DATA_PATH"),
        ("demoMode", "DEMO_MODE"),
        ("guestDashboard", "GUEST_DASHBOARD"),
        ("allowAutoThemes", "ALLOW_AUTO_THEMES"),
        ("allowErrorMonitoring", "ALLOW_ERROR_MONITORING"),
        ("persistTraefikConfig", "PERSIST_TRAEFIK_CONFIG"),
        ("timeZone", "TZ"),
        ("eventsTimeout", "EVENTS_TIMEOUT"),
        ("advancedSettings", "ADVANCED_SETTINGS"),
        ("forwardAuthUrl", "FORWARD_AUTH_URL"),
        ("logLevel", "LOG_LEVEL"),
    ],
};

/// Result of projecting a settings document onto a store in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub store: EnvStore,
    /// Store keys whose value changed.
    pub updated: Vec<String>,
    /// Store keys named by a non-empty setting but absent from the store.
    pub skipped_missing: Vec<String>,
    pub rejected: Vec<UnsafeValue>,
}

/// Outcome of a full sync against files on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsSyncOutcome {
    pub updated: Vec<String>,
    pub skipped_missing: Vec<String>,
    pub rejected: Vec<UnsafeValue>,
    /// Snapshot taken before the write, if the store existed.
    pub snapshot: Option<PathBuf>,
    /// `None` when there was no store to update.
    pub write: Option<WriteResult>,
}

/// Read and parse a settings document. The root must be a JSON object.
pub fn load_settings(path: &Path) -> Result<Map<String, Value>, EnvError> {
    let raw = std::fs::read_to_string(path).map_err(|source| EnvError::SettingsRead {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_str(&raw).map_err(|source| EnvError::SettingsParse {
        path: path.to_path_buf(),
        source,
    })?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(EnvError::SettingsNotObject {
            path: path.to_path_buf(),
        }),
    }
}

/// Project `settings` onto `store` through `table`.
pub fn project_settings(
    settings: &Map<String, Value>,
    store: &EnvStore,
    table: &TranslationTable,
) -> Projection {
    let mut next = store.clone();
    let mut updated = Vec::new();
    let mut skipped_missing = Vec::new();
    let mut rejected = Vec::new();

    for (setting, store_key) in table.entries {
        let Some(raw) = settings.get(*setting) else {
            continue;
        };
        let Some(value) = project_value(setting, raw) else {
            continue;
        };
        if !store.contains_key(store_key) {
            tracing::debug!(setting, key = store_key, "store key absent; not introducing it");
            skipped_missing.push(store_key.to_string());
            continue;
        }
        if let Err(refused) = check_value(store_key, &value) {
            tracing::warn!(setting, key = store_key, sequence = ?refused.sequence, "refusing unsafe setting value");
            rejected.push(refused);
            continue;
        }
        if store.get(store_key) != Some(value.as_str()) {
            next.insert(*store_key, value);
            updated.push(store_key.to_string());
        }
    }

    Projection {
        store: next,
        updated,
        skipped_missing,
        rejected,
    }
}

/// Sync `settings_path` onto the store at `env_path` with the current table.
pub fn sync_settings_to_env(settings_path: &Path, env_path: &Path) -> Result<SettingsSyncOutcome, EnvError> {
    sync_settings_with(settings_path, env_path, &SETTINGS_TABLE_V1, Utc::now())
}

/// Sync with an explicit table and clock.
///
/// The settings document is parsed first; if it is unreadable the sync fails
/// before the store is read, snapshotted, or written.
pub fn sync_settings_with(
    settings_path: &Path,
    env_path: &Path,
    table: &TranslationTable,
    now: DateTime<Utc>,
) -> Result<SettingsSyncOutcome, EnvError> {
    let settings = load_settings(settings_path)?;

    if !env_path.exists() {
        tracing::info!(path = %env_path.display(), "no store to sync settings into");
        return Ok(SettingsSyncOutcome {
            updated: vec![],
            skipped_missing: vec![],
            rejected: vec![],
            snapshot: None,
            write: None,
        });
    }

    let store = env_store::load_at(env_path)?;
    let snapshot = snapshot_store(env_path, now, SNAPSHOT_RETENTION)?;
    let projection = project_settings(&settings, &store, table);
    let write = env_store::save_at(env_path, &projection.store)?;

    tracing::info!(
        table_version = table.version,
        updated = projection.updated.len(),
        skipped = projection.skipped_missing.len(),
        rejected = projection.rejected.len(),
        "settings synced to environment",
    );

    Ok(SettingsSyncOutcome {
        updated: projection.updated,
        skipped_missing: projection.skipped_missing,
        rejected: projection.rejected,
        snapshot: Some(snapshot),
        write: Some(write),
    })
}

/// Render one settings value as store text. `None` means "leave the store alone".
fn project_value(setting: &str, value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if s.is_empty() => None,
        Value::String(s) if s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false") => {
            Some(s.to_ascii_lowercase())
        }
        Value::String(s) => Some(s.clone()),
        Value::Array(_) | Value::Object(_) => {
            tracing::warn!(setting, "settings value is not a scalar; ignored");
            None
        }
    }
}
