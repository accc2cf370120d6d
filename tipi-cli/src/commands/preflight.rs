//! `tipi-setup preflight`: dependency and port report.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use tipi_lifecycle::logging;
use tipi_preflight::{run_preflight, HostSystem};

use super::ConfigArgs;

#[derive(Args, Debug)]
pub struct PreflightArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Port to check; repeat for several. Replaces the configured list.
    #[arg(long = "port", value_name = "PORT")]
    pub ports: Vec<u16>,

    /// Program that must be on PATH; repeat for several. Replaces the configured list.
    #[arg(long = "dependency", value_name = "NAME")]
    pub dependencies: Vec<String>,
}

#[derive(Tabled)]
struct CheckRow {
    #[tabled(rename = "check")]
    check: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "detail")]
    detail: String,
}

impl PreflightArgs {
    pub fn run(self) -> Result<()> {
        logging::init(None);
        let config = self.config.load()?;
        let ports = if self.ports.is_empty() {
            config.required_ports.clone()
        } else {
            self.ports
        };
        let dependencies = if self.dependencies.is_empty() {
            config.required_dependencies.clone()
        } else {
            self.dependencies
        };

        let report = run_preflight(&HostSystem, &dependencies, &ports).context("preflight failed")?;

        let mut rows = Vec::new();
        for dep in &report.dependencies {
            let (status, detail) = match &dep.path {
                Some(path) => ("ok".green().to_string(), path.display().to_string()),
                None => ("missing".red().to_string(), "not found on PATH".to_string()),
            };
            rows.push(CheckRow {
                check: dep.name.clone(),
                status,
                detail,
            });
        }
        for port in &report.ports {
            let status = if port.available {
                "free".green().to_string()
            } else {
                "in use".red().to_string()
            };
            let detail = match (port.pid, port.probe) {
                (Some(pid), Some(probe)) => format!("pid {pid} (via {probe})"),
                (None, Some(probe)) => format!("via {probe}"),
                (_, None) => "no probe available, assumed free".to_string(),
            };
            rows.push(CheckRow {
                check: format!("port {}", port.port),
                status,
                detail,
            });
        }

        if !rows.is_empty() {
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }

        if !report.passed() {
            bail!("preflight checks failed");
        }
        println!("{}", "All preflight checks passed.".green().bold());
        Ok(())
    }
}
