//! The configuration object threaded through every lifecycle stage.
//!
//! Sources, lowest precedence first: built-in defaults, a YAML file, then
//! command-line overrides applied by the binary on the loaded value.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use tipi_core::{BackupKind, InstallLayout};
use tipi_env::ReconcilePlan;

use crate::error::{io_err, LifecycleError};

pub const DEFAULT_DOWNLOAD_URL: &str =
    "https://github.com/runtipi/runtipi/releases/download/{version}/runtipi-cli-linux-{arch}.tar.gz";

/// Keys always overwritten with values derived from this config.
pub const FORCED_KEYS: [&str; 3] = ["TIPI_VERSION", "ARCHITECTURE", "ROOT_FOLDER_HOST"];

/// Keys generated once and then preserved.
pub const SECRET_KEYS: [&str; 3] = ["JWT_SECRET", "POSTGRES_PASSWORD", "REDIS_PASSWORD"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay_secs: 2,
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    pub scheduled: usize,
    pub pre_upgrade: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            scheduled: BackupKind::Scheduled.default_retention(),
            pre_upgrade: BackupKind::PreUpgrade.default_retention(),
        }
    }
}

impl RetentionPolicy {
    pub fn for_kind(&self, kind: BackupKind) -> usize {
        match kind {
            BackupKind::Scheduled => self.scheduled,
            BackupKind::PreUpgrade => self.pre_upgrade,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LifecycleConfig {
    pub root: PathBuf,
    /// Target package version, e.g. `v3.7.0`. Required for install.
    pub version: String,
    pub server_addr: String,
    pub timezone: String,
    pub architecture: String,
    pub required_dependencies: Vec<String>,
    pub required_ports: Vec<u16>,
    pub download_url: String,
    pub retry: RetryPolicy,
    pub connect_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub retention: RetentionPolicy,
    pub backup_prefix: String,
    pub prepull_images: Vec<String>,
    pub image_pull_timeout_secs: u64,
    /// Unset means the wrapped CLI may run for as long as it needs.
    pub cli_timeout_secs: Option<u64>,
    pub start_service: bool,
    pub extra_defaults: IndexMap<String, String>,
    pub extra_forced: IndexMap<String, String>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            version: String::new(),
            server_addr: "0.0.0.0".into(),
            timezone: "Etc/UTC".into(),
            architecture: default_architecture().into(),
            required_dependencies: vec!["docker".into()],
            required_ports: vec![80, 443],
            download_url: DEFAULT_DOWNLOAD_URL.into(),
            retry: RetryPolicy::default(),
            connect_timeout_secs: 10,
            download_timeout_secs: 300,
            retention: RetentionPolicy::default(),
            backup_prefix: "runtipi".into(),
            prepull_images: vec![
                "postgres:14".into(),
                "redis:7.4-alpine".into(),
                "traefik:v3.2".into(),
            ],
            image_pull_timeout_secs: 120,
            cli_timeout_secs: None,
            start_service: true,
            extra_defaults: IndexMap::new(),
            extra_forced: IndexMap::new(),
        }
    }
}

fn default_root() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join("runtipi"))
        .unwrap_or_else(|| PathBuf::from("runtipi"))
}

fn default_architecture() -> &'static str {
    match std::env::consts::ARCH {
        "aarch64" | "arm64" => "aarch64",
        _ => "x86_64",
    }
}

impl LifecycleConfig {
    /// Load from YAML. Keys absent from the file keep their defaults.
    pub fn load(path: &Path) -> Result<Self, LifecycleError> {
        let raw = fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        Self::from_yaml(&raw).map_err(|source| LifecycleError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    /// Load `path` when given, otherwise start from defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, LifecycleError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn layout(&self) -> InstallLayout {
        InstallLayout::new(&self.root)
    }

    /// Checks that cannot be expressed in the type.
    pub fn validate(&self) -> Result<(), LifecycleError> {
        if self.version.trim().is_empty() {
            return Err(LifecycleError::InvalidConfig(
                "no target version given (set `version` or pass --version)".into(),
            ));
        }
        if self.retry.attempts == 0 {
            return Err(LifecycleError::InvalidConfig(
                "retry.attempts must be at least 1".into(),
            ));
        }
        if self.backup_prefix.is_empty() || self.backup_prefix.contains('/') {
            return Err(LifecycleError::InvalidConfig(format!(
                "invalid backup_prefix {:?}",
                self.backup_prefix
            )));
        }
        Ok(())
    }

    pub fn download_url(&self) -> String {
        self.download_url
            .replace("{version}", &self.version)
            .replace("{arch}", &self.architecture)
    }

    pub fn cli_timeout(&self) -> Option<Duration> {
        self.cli_timeout_secs.map(Duration::from_secs)
    }

    pub fn image_pull_timeout(&self) -> Duration {
        Duration::from_secs(self.image_pull_timeout_secs)
    }

    /// The reconciliation inputs for this install.
    pub fn reconcile_plan(&self) -> ReconcilePlan {
        let root = self.root.display().to_string();
        // The first two required ports are the HTTP and HTTPS listeners.
        let port_or = |idx: usize, fallback: &str| {
            self.required_ports
                .get(idx)
                .map(u16::to_string)
                .unwrap_or_else(|| fallback.to_string())
        };

        let mut plan = ReconcilePlan::new()
            .forced_value("TIPI_VERSION", &self.version)
            .forced_value("ARCHITECTURE", &self.architecture)
            .forced_value("ROOT_FOLDER_HOST", &root)
            .default_value("INTERNAL_IP", &self.server_addr)
            .default_value("TZ", &self.timezone)
            .default_value("NGINX_PORT", port_or(0, "80"))
            .default_value("NGINX_PORT_SSL", port_or(1, "443"))
            .default_value("DOMAIN", "example.com")
            .default_value("LOCAL_DOMAIN", "tipi.lan")
            .default_value("APPS_REPOSITORY_URL", "https://github.com/runtipi/runtipi-appstore")
            .default_value("RUNTIPI_APP_DATA_PATH", &root)
            .default_value("POSTGRES_HOST", "runtipi-db")
            .default_value("POSTGRES_PORT", "5432")
            .default_value("POSTGRES_DBNAME", "tipi")
            .default_value("POSTGRES_USERNAME", "tipi")
            .default_value("REDIS_HOST", "runtipi-redis")
            .default_value("DEMO_MODE", "false")
            .default_value("LOG_LEVEL", "info");
        for key in SECRET_KEYS {
            plan = plan.secret(key);
        }
        for (key, value) in &self.extra_defaults {
            plan = plan.default_value(key, value);
        }
        for (key, value) in &self.extra_forced {
            plan = plan.forced_value(key, value);
        }
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tipi_core::EnvStore;

    #[test]
    fn empty_yaml_is_default() {
        assert_eq!(LifecycleConfig::from_yaml("").unwrap(), LifecycleConfig::default());
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let cfg = LifecycleConfig::from_yaml(
            "root: /srv/runtipi\nversion: v3.7.0\nretry:\n  attempts: 5\nrequired_ports: [8880]\n",
        )
        .unwrap();
        assert_eq!(cfg.root, PathBuf::from("/srv/runtipi"));
        assert_eq!(cfg.retry.attempts, 5);
        assert_eq!(cfg.retry.delay_secs, 2);
        assert_eq!(cfg.required_ports, vec![8880]);
        assert_eq!(cfg.retention.pre_upgrade, 3);
        assert_eq!(cfg.cli_timeout_secs, None);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(LifecycleConfig::from_yaml("rooot: /tmp\n").is_err());
    }

    #[test]
    fn download_url_substitutes_version_and_arch() {
        let cfg = LifecycleConfig {
            version: "v3.7.0".into(),
            architecture: "aarch64".into(),
            ..LifecycleConfig::default()
        };
        assert_eq!(
            cfg.download_url(),
            "https://github.com/runtipi/runtipi/releases/download/v3.7.0/runtipi-cli-linux-aarch64.tar.gz"
        );
    }

    #[test]
    fn missing_version_is_invalid() {
        let err = LifecycleConfig::default().validate().unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidConfig(_)));
    }

    #[test]
    fn plan_forces_version_and_generates_secrets() {
        let cfg = LifecycleConfig {
            root: PathBuf::from("/srv/runtipi"),
            version: "v3.7.0".into(),
            required_ports: vec![8880],
            ..LifecycleConfig::default()
        };
        let existing = EnvStore::parse("TIPI_VERSION=v3.6.0\nNGINX_PORT=9000\n");
        let out = tipi_env::reconcile(&existing, &cfg.reconcile_plan()).unwrap();

        assert_eq!(out.store.get("TIPI_VERSION"), Some("v3.7.0"));
        assert_eq!(out.store.get("ROOT_FOLDER_HOST"), Some("/srv/runtipi"));
        assert_eq!(out.store.get("NGINX_PORT"), Some("9000"));
        for key in SECRET_KEYS {
            assert_eq!(out.store.get(key).map(str::len), Some(43), "{key}");
        }
    }

    #[test]
    fn extra_forced_overrides_builtin_default() {
        let mut cfg = LifecycleConfig {
            version: "v3.7.0".into(),
            ..LifecycleConfig::default()
        };
        cfg.extra_forced.insert("DOMAIN".into(), "tipi.example.org".into());
        let existing = EnvStore::parse("DOMAIN=old.example.org\n");
        let out = tipi_env::reconcile(&existing, &cfg.reconcile_plan()).unwrap();
        assert_eq!(out.store.get("DOMAIN"), Some("tipi.example.org"));
    }
}
