//! `tipi-setup install` / `tipi-setup upgrade`: run the lifecycle state machine.

use std::time::Duration;

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;

use tipi_lifecycle::{logging, HttpProvisioner, LifecycleReport, LifecycleState, Orchestrator};
use tipi_preflight::HostSystem;

use super::ConfigArgs;

/// Arguments for `tipi-setup install` and `tipi-setup upgrade`.
#[derive(Args, Debug)]
pub struct InstallArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Target package version, e.g. v3.7.0.
    #[arg(long = "version", value_name = "VERSION")]
    pub target_version: Option<String>,

    /// Server address written as INTERNAL_IP on first install.
    #[arg(long)]
    pub server_addr: Option<String>,

    /// Timezone written as TZ on first install.
    #[arg(long)]
    pub timezone: Option<String>,

    /// Required port; repeat for several. Replaces the configured list.
    #[arg(long = "port", value_name = "PORT")]
    pub ports: Vec<u16>,

    /// Do not run `runtipi-cli start` after provisioning.
    #[arg(long)]
    pub no_start: bool,
}

impl InstallArgs {
    pub fn run(self, upgrade_only: bool) -> Result<()> {
        let mut config = self.config.load()?;
        if let Some(version) = self.target_version {
            config.version = version;
        }
        if let Some(addr) = self.server_addr {
            config.server_addr = addr;
        }
        if let Some(tz) = self.timezone {
            config.timezone = tz;
        }
        if !self.ports.is_empty() {
            config.required_ports = self.ports;
        }
        if self.no_start {
            config.start_service = false;
        }

        let layout = config.layout();
        if upgrade_only && !layout.is_installed() {
            bail!(
                "nothing installed at {}; run `tipi-setup install` first",
                layout.root().display()
            );
        }

        logging::init(Some(&layout));
        let provisioner = HttpProvisioner::new(
            Duration::from_secs(config.connect_timeout_secs),
            Duration::from_secs(config.download_timeout_secs),
        );
        let report = Orchestrator::new(&config, &HostSystem, &provisioner).run();
        print_report(&report);

        match report.error {
            Some(err) => Err(anyhow::Error::new(err).context("lifecycle failed")),
            None => Ok(()),
        }
    }
}

fn print_report(report: &LifecycleReport) {
    let path = report
        .states
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" → ");
    println!("{} {}", "states:".bold(), path);

    if let Some(backup) = &report.backup {
        println!("{} {}", "backup:".bold(), backup.path.display());
    }
    if let Some(reconcile) = &report.reconcile {
        let state = if reconcile.write.was_written() { "written" } else { "unchanged" };
        println!("{} {} ({state})", "store:".bold(), reconcile.write.path().display());
        for key in &reconcile.outcome.generated {
            println!("  {} {key}", "generated".green());
        }
    }
    for warning in &report.warnings {
        println!("{} {warning}", "warning:".yellow().bold());
    }

    match report.final_state() {
        LifecycleState::Complete => {
            let verb = if report.upgrade { "Upgrade" } else { "Install" };
            println!("{}", format!("{verb} complete.").green().bold());
        }
        _ => {
            if let Some(err) = &report.error {
                println!("{} {err}", "failed:".red().bold());
            }
        }
    }
}
