use std::path::PathBuf;

use thiserror::Error;

use tipi_env::EnvError;
use tipi_preflight::PreflightError;

/// Every way a lifecycle run can go wrong.
///
/// Fatal variants move the state machine to `Failed`; the rest are logged at
/// `warn` and recorded on the report while the run continues.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("missing required dependencies: {}", .0.join(", "))]
    DependencyMissing(Vec<String>),

    #[error("port {port} is already in use{}", pid_suffix(.pid))]
    PortConflict { port: u16, pid: Option<u32> },

    #[error("secret generation failed: {0}")]
    SecretGeneration(String),

    #[error("environment store error: {0}")]
    Store(#[source] EnvError),

    #[error("provisioning failed: {0}")]
    ProvisionFailed(#[source] ProvisionError),

    #[error("`{action}` failed: {reason}")]
    StartFailed { action: String, reason: String },

    #[error("backup skipped: {0}")]
    BackupFailed(String),

    #[error("image pull failed for {image}: {reason}")]
    ImagePullFailed { image: String, reason: String },

    #[error("rejected unsafe value for {key}")]
    ValidationRejected { key: String },

    #[error("finalize step `{step}` did not complete: {reason}")]
    FinalizeIncomplete { step: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LifecycleError {
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            LifecycleError::BackupFailed(_)
                | LifecycleError::ImagePullFailed { .. }
                | LifecycleError::ValidationRejected { .. }
                | LifecycleError::FinalizeIncomplete { .. }
        )
    }
}

impl From<PreflightError> for LifecycleError {
    fn from(err: PreflightError) -> Self {
        match err {
            PreflightError::MissingDependencies(missing) => LifecycleError::DependencyMissing(missing),
            PreflightError::PortInUse { port, pid } => LifecycleError::PortConflict { port, pid },
            PreflightError::InvalidPort => LifecycleError::InvalidConfig("port 0 is not a valid port".into()),
        }
    }
}

impl From<EnvError> for LifecycleError {
    fn from(err: EnvError) -> Self {
        match err {
            EnvError::Entropy(reason) => LifecycleError::SecretGeneration(reason),
            other => LifecycleError::Store(other),
        }
    }
}

/// Failure to fetch or install the lifecycle binary.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("{url} not found (HTTP 404)")]
    NotFound { url: String },

    #[error("download of {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("artifact has no `{entry}` entry")]
    MissingEntry { entry: String },

    #[error("artifact is not usable: {reason}")]
    InvalidArtifact { reason: String },

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ProvisionError {
    /// Only transport-level failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProvisionError::Http { .. } | ProvisionError::Io { .. })
    }
}

/// Failure to run the lifecycle binary at all. A non-zero exit is not an
/// error here; it is reported on the invocation result.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("cannot run {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("`{action}` did not finish within {secs}s and was killed")]
    TimedOut { action: String, secs: u64 },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn pid_suffix(pid: &Option<u32>) -> String {
    pid.map(|p| format!(" (pid {p})")).unwrap_or_default()
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> LifecycleError {
    LifecycleError::Io {
        path: path.into(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entropy_failure_maps_to_secret_generation() {
        let err = LifecycleError::from(EnvError::Entropy("no entropy".into()));
        assert!(matches!(err, LifecycleError::SecretGeneration(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn warnings_are_not_fatal() {
        assert!(!LifecycleError::BackupFailed("empty".into()).is_fatal());
        assert!(!LifecycleError::ValidationRejected { key: "DOMAIN".into() }.is_fatal());
        assert!(!LifecycleError::ImagePullFailed {
            image: "redis".into(),
            reason: "timeout".into()
        }
        .is_fatal());
        assert!(LifecycleError::PortConflict { port: 80, pid: None }.is_fatal());
    }

    #[test]
    fn port_conflict_names_owner() {
        let err = LifecycleError::from(PreflightError::PortInUse {
            port: 8880,
            pid: Some(12),
        });
        assert_eq!(err.to_string(), "port 8880 is already in use (pid 12)");
    }

    #[test]
    fn only_transport_errors_retry() {
        assert!(!ProvisionError::NotFound { url: "u".into() }.is_retryable());
        assert!(ProvisionError::Http {
            url: "u".into(),
            message: "reset".into()
        }
        .is_retryable());
        assert!(!ProvisionError::MissingEntry { entry: "runtipi-cli".into() }.is_retryable());
        assert!(!ProvisionError::InvalidArtifact { reason: "bad gzip header".into() }.is_retryable());
    }
}
