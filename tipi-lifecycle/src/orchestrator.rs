//! The install/upgrade state machine.

use std::fmt;
use std::fs;

use tipi_backup::{create_backup, BackupRecord};
use tipi_core::env_store::write_atomic;
use tipi_core::{BackupKind, PackageVersion};
use tipi_env::reconcile::ReconcileFileResult;
use tipi_env::reconcile_at;
use tipi_preflight::{check_dependencies, check_required_ports, SystemInfo};

use crate::cli_wrapper::{CliInvocationResult, CliWrapper};
use crate::config::LifecycleConfig;
use crate::error::LifecycleError;
use crate::permissions::apply_secure_permissions;
use crate::provision::{provision_cli, Provisioner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Preflight,
    Backup,
    Reconcile,
    Provision,
    Finalize,
    Complete,
    Failed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Preflight => "preflight",
            LifecycleState::Backup => "backup",
            LifecycleState::Reconcile => "reconcile",
            LifecycleState::Provision => "provision",
            LifecycleState::Finalize => "finalize",
            LifecycleState::Complete => "complete",
            LifecycleState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Everything a run did, in order.
#[derive(Debug)]
pub struct LifecycleReport {
    /// Every state entered, starting with `Idle`.
    pub states: Vec<LifecycleState>,
    pub upgrade: bool,
    pub backup: Option<BackupRecord>,
    pub reconcile: Option<ReconcileFileResult>,
    pub start: Option<CliInvocationResult>,
    /// Non-fatal problems, in the order they happened.
    pub warnings: Vec<LifecycleError>,
    /// The fatal error, when the run ended in `Failed`.
    pub error: Option<LifecycleError>,
}

impl LifecycleReport {
    fn new() -> Self {
        Self {
            states: vec![LifecycleState::Idle],
            upgrade: false,
            backup: None,
            reconcile: None,
            start: None,
            warnings: Vec::new(),
            error: None,
        }
    }

    pub fn final_state(&self) -> LifecycleState {
        self.states.last().copied().unwrap_or(LifecycleState::Idle)
    }

    pub fn is_complete(&self) -> bool {
        self.final_state() == LifecycleState::Complete
    }

    pub fn entered(&self, state: LifecycleState) -> bool {
        self.states.contains(&state)
    }

    fn enter(&mut self, state: LifecycleState) {
        tracing::info!(from = %self.final_state(), to = %state, "lifecycle transition");
        self.states.push(state);
    }

    fn warn(&mut self, warning: LifecycleError) {
        tracing::warn!(error = %warning, "continuing after non-fatal error");
        self.warnings.push(warning);
    }

    fn fail(mut self, error: LifecycleError) -> Self {
        tracing::error!(state = %self.final_state(), error = %error, "lifecycle failed");
        self.enter(LifecycleState::Failed);
        self.error = Some(error);
        self
    }
}

/// Drives one install or upgrade.
pub struct Orchestrator<'a> {
    config: &'a LifecycleConfig,
    system: &'a dyn SystemInfo,
    provisioner: &'a dyn Provisioner,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a LifecycleConfig,
        system: &'a dyn SystemInfo,
        provisioner: &'a dyn Provisioner,
    ) -> Self {
        Self {
            config,
            system,
            provisioner,
        }
    }

    /// Run the state machine to `Complete` or `Failed`.
    pub fn run(&self) -> LifecycleReport {
        let mut report = LifecycleReport::new();
        let layout = self.config.layout();

        if let Err(err) = self.config.validate() {
            return report.fail(err);
        }

        report.enter(LifecycleState::Preflight);
        if let Err(err) = self.preflight() {
            return report.fail(err);
        }
        report.upgrade = layout.is_installed();
        if report.upgrade {
            self.check_downgrade();
        }

        if report.upgrade {
            report.enter(LifecycleState::Backup);
            match create_backup(
                &layout,
                &self.config.backup_prefix,
                BackupKind::PreUpgrade,
                self.config.retention.pre_upgrade,
            ) {
                Ok(record) => report.backup = Some(record),
                Err(err) => report.warn(LifecycleError::BackupFailed(err.to_string())),
            }
        }

        report.enter(LifecycleState::Reconcile);
        let plan = self.config.reconcile_plan();
        match reconcile_at(&layout.env_file(), &plan) {
            Ok(result) => {
                for rejected in &result.outcome.rejected {
                    report.warn(LifecycleError::ValidationRejected {
                        key: rejected.key.clone(),
                    });
                }
                report.reconcile = Some(result);
            }
            Err(err) => return report.fail(err.into()),
        }

        report.enter(LifecycleState::Provision);
        let url = self.config.download_url();
        if let Err(err) = provision_cli(self.provisioner, &layout, &url, &self.config.retry) {
            return report.fail(LifecycleError::ProvisionFailed(err));
        }
        for image in &self.config.prepull_images {
            if let Err(reason) = self
                .provisioner
                .pull_image(image, self.config.image_pull_timeout())
            {
                report.warn(LifecycleError::ImagePullFailed {
                    image: image.clone(),
                    reason,
                });
            }
        }
        if self.config.start_service {
            let wrapper = CliWrapper::from_layout(&layout).with_timeout(self.config.cli_timeout());
            match wrapper.invoke("start", &[]) {
                Ok(result) if result.succeeded() => report.start = Some(result),
                Ok(result) => {
                    let reason = match result.status {
                        Some(code) => format!("exit status {code}"),
                        None => "terminated by signal".to_string(),
                    };
                    report.start = Some(result);
                    return report.fail(LifecycleError::StartFailed {
                        action: "start".into(),
                        reason,
                    });
                }
                Err(err) => {
                    return report.fail(LifecycleError::StartFailed {
                        action: "start".into(),
                        reason: err.to_string(),
                    })
                }
            }
        }

        report.enter(LifecycleState::Finalize);
        let marker = format!("{}\n", self.config.version.trim());
        if let Err(err) = write_atomic(&layout.version_file(), &marker) {
            report.warn(LifecycleError::FinalizeIncomplete {
                step: "version marker".into(),
                reason: err.to_string(),
            });
        }
        if let Err(err) = apply_secure_permissions(&layout) {
            report.warn(LifecycleError::FinalizeIncomplete {
                step: "permission policy".into(),
                reason: err.to_string(),
            });
        }

        report.enter(LifecycleState::Complete);
        tracing::info!(
            version = %self.config.version,
            upgrade = report.upgrade,
            warnings = report.warnings.len(),
            "lifecycle complete",
        );
        report
    }

    fn preflight(&self) -> Result<(), LifecycleError> {
        check_dependencies(self.system, &self.config.required_dependencies)?;
        check_required_ports(self.system, &self.config.required_ports)?;
        Ok(())
    }

    /// Warn when the target version sorts below the installed one.
    fn check_downgrade(&self) {
        let marker = self.config.layout().version_file();
        let Ok(installed) = fs::read_to_string(&marker) else {
            return;
        };
        let installed = installed.trim();
        match (
            installed.parse::<PackageVersion>(),
            self.config.version.trim().parse::<PackageVersion>(),
        ) {
            (Ok(from), Ok(to)) if to < from => {
                tracing::warn!(installed = %from, target = %to, "target version is older than the installed one");
            }
            (Ok(_), Ok(_)) => {}
            _ => tracing::debug!(installed, target = %self.config.version, "versions not comparable"),
        }
    }
}
