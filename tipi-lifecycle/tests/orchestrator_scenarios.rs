use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;

use tipi_core::env_store::load_at;
use tipi_lifecycle::{
    LifecycleConfig, LifecycleError, LifecycleState, Orchestrator, ProvisionError, Provisioner,
};
use tipi_preflight::{CommandOutput, SystemInfo};

/// Host with docker and `ss`; `busy` ports show up as listening.
struct Host {
    busy: Vec<u16>,
}

impl SystemInfo for Host {
    fn which(&self, program: &str) -> Option<PathBuf> {
        matches!(program, "docker" | "ss").then(|| PathBuf::from("/usr/bin").join(program))
    }

    fn run_capture(&self, _program: &str, args: &[&str]) -> io::Result<CommandOutput> {
        let stdout = self
            .busy
            .iter()
            .filter(|port| args.iter().any(|a| a.ends_with(&format!(":{port}"))))
            .map(|port| format!("LISTEN 0 511 0.0.0.0:{port} 0.0.0.0:* users:((\"nginx\",pid=77,fd=6))\n"))
            .collect();
        Ok(CommandOutput {
            success: true,
            stdout,
        })
    }
}

/// Serves a `.tar.gz` holding a shell-script `runtipi-cli`.
struct ScriptArtifact {
    script: String,
}

impl Provisioner for ScriptArtifact {
    fn fetch(&self, _url: &str) -> Result<Vec<u8>, ProvisionError> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        let mut header = tar::Header::new_gnu();
        header.set_size(self.script.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder
            .append_data(&mut header, "runtipi-cli", self.script.as_bytes())
            .unwrap();
        Ok(builder.into_inner().unwrap().finish().unwrap())
    }

    fn pull_image(&self, _image: &str, _timeout: Duration) -> Result<(), String> {
        Ok(())
    }
}

fn starting_cli() -> ScriptArtifact {
    ScriptArtifact {
        script: "#!/bin/sh\necho 'pulling'\necho '✓ Runtipi started'\n".into(),
    }
}

fn config(root: &Path) -> LifecycleConfig {
    LifecycleConfig {
        root: root.to_path_buf(),
        version: "v3.7.0".into(),
        required_dependencies: vec!["docker".into()],
        required_ports: vec![8880, 8443],
        prepull_images: Vec::new(),
        start_service: false,
        ..LifecycleConfig::default()
    }
}

#[test]
fn port_conflict_fails_before_reconcile() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(tmp.path());
    let host = Host { busy: vec![8880] };

    let report = Orchestrator::new(&cfg, &host, &starting_cli()).run();

    assert_eq!(
        report.states,
        vec![LifecycleState::Idle, LifecycleState::Preflight, LifecycleState::Failed]
    );
    assert!(matches!(
        report.error,
        Some(LifecycleError::PortConflict {
            port: 8880,
            pid: Some(77)
        })
    ));
    assert!(!cfg.layout().env_file().exists());
}

#[test]
fn missing_dependency_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let mut cfg = config(tmp.path());
    cfg.required_dependencies.push("jq".into());

    let report = Orchestrator::new(&cfg, &Host { busy: vec![] }, &starting_cli()).run();

    assert!(matches!(
        report.error,
        Some(LifecycleError::DependencyMissing(ref missing)) if missing == &["jq"]
    ));
    assert!(!report.entered(LifecycleState::Reconcile));
}

#[test]
fn upgrade_without_data_still_reaches_reconcile() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("VERSION"), "v3.6.0\n").unwrap();
    let cfg = config(tmp.path());

    let report = Orchestrator::new(&cfg, &Host { busy: vec![] }, &starting_cli()).run();

    assert!(report.upgrade);
    assert!(report.entered(LifecycleState::Backup));
    assert!(report.entered(LifecycleState::Reconcile));
    assert!(report.backup.is_none());
    assert!(matches!(
        report.warnings.first(),
        Some(LifecycleError::BackupFailed(_))
    ));
    assert!(report.is_complete());
}

#[test]
fn upgrade_keeps_secrets_and_takes_backup() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join(".env"),
        "JWT_SECRET=abc123\nTIPI_VERSION=v3.6.0\nCUSTOM_FLAG=on\n",
    )
    .unwrap();
    fs::write(tmp.path().join("VERSION"), "v3.6.0\n").unwrap();
    let cfg = config(tmp.path());

    let report = Orchestrator::new(&cfg, &Host { busy: vec![] }, &starting_cli()).run();

    assert!(report.is_complete(), "{:?}", report.error);
    let backup = report.backup.expect("pre-upgrade backup");
    assert!(backup.path.exists());

    let store = load_at(&cfg.layout().env_file()).unwrap();
    assert_eq!(store.get("JWT_SECRET"), Some("abc123"));
    assert_eq!(store.get("TIPI_VERSION"), Some("v3.7.0"));
    assert_eq!(store.get("CUSTOM_FLAG"), Some("on"));
    assert_eq!(
        fs::read_to_string(cfg.layout().version_file()).unwrap(),
        "v3.7.0\n"
    );
}

#[test]
fn unsafe_forced_value_is_skipped_and_reported() {
    let tmp = TempDir::new().unwrap();
    let mut cfg = config(tmp.path());
    cfg.extra_forced.insert("DOMAIN".into(), "; rm -rf /".into());

    let report = Orchestrator::new(&cfg, &Host { busy: vec![] }, &starting_cli()).run();

    assert!(report.is_complete());
    assert!(report
        .warnings
        .iter()
        .any(|w| matches!(w, LifecycleError::ValidationRejected { key } if key == "DOMAIN")));
    let raw = fs::read_to_string(cfg.layout().env_file()).unwrap();
    assert!(!raw.contains("rm -rf"));
}

#[cfg(unix)]
#[test]
fn start_action_success_is_summarised() {
    let tmp = TempDir::new().unwrap();
    let mut cfg = config(tmp.path());
    cfg.start_service = true;

    let report = Orchestrator::new(&cfg, &Host { busy: vec![] }, &starting_cli()).run();

    assert!(report.is_complete(), "{:?}", report.error);
    let start = report.start.expect("start invocation");
    assert_eq!(start.success_lines, vec!["Runtipi started"]);
    let log = fs::read_to_string(cfg.layout().cli_log()).unwrap();
    assert!(log.contains("==> "));
    assert!(log.contains("pulling"));
}

#[cfg(unix)]
#[test]
fn failing_start_action_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let mut cfg = config(tmp.path());
    cfg.start_service = true;
    let cli = ScriptArtifact {
        script: "#!/bin/sh\necho 'Error: cannot reach docker daemon' >&2\nexit 1\n".into(),
    };

    let report = Orchestrator::new(&cfg, &Host { busy: vec![] }, &cli).run();

    assert_eq!(report.final_state(), LifecycleState::Failed);
    assert!(matches!(report.error, Some(LifecycleError::StartFailed { .. })));
    let start = report.start.expect("start invocation recorded");
    assert_eq!(start.error_lines, vec!["Error: cannot reach docker daemon"]);
    assert!(!cfg.layout().version_file().exists());
}
