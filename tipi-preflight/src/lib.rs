//! Host checks that run before anything is mutated.
//!
//! Everything here talks to the host through the [`SystemInfo`] capability so
//! the checks can be driven by a scripted fake in tests. [`HostSystem`] is the
//! only production implementation.

use std::io;
use std::path::PathBuf;
use std::process::Command;

use thiserror::Error;

pub mod ports;

pub use ports::{check_port, check_required_ports, PortCheckResult, PortProbe};

// ---------------------------------------------------------------------------
// Capability
// ---------------------------------------------------------------------------

/// Captured result of running a host program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
}

/// What preflight needs to know about the host.
pub trait SystemInfo {
    /// Resolve `program` on `PATH`.
    fn which(&self, program: &str) -> Option<PathBuf>;

    /// Run `program` with `args` and capture its stdout.
    fn run_capture(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput>;
}

/// The real host.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostSystem;

impl SystemInfo for HostSystem {
    fn which(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }

    fn run_capture(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput> {
        let output = Command::new(program).args(args).output()?;
        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PreflightError {
    #[error("missing required dependencies: {}", .0.join(", "))]
    MissingDependencies(Vec<String>),

    #[error("port {port} is already in use{}", pid_suffix(.pid))]
    PortInUse { port: u16, pid: Option<u32> },

    #[error("invalid port 0")]
    InvalidPort,
}

fn pid_suffix(pid: &Option<u32>) -> String {
    pid.map(|p| format!(" (pid {p})")).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Dependencies
// ---------------------------------------------------------------------------

/// One dependency lookup, for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyStatus {
    pub name: String,
    pub path: Option<PathBuf>,
}

/// Resolve every name in `names`, in order.
pub fn probe_dependencies(sys: &dyn SystemInfo, names: &[String]) -> Vec<DependencyStatus> {
    names
        .iter()
        .map(|name| DependencyStatus {
            name: name.clone(),
            path: sys.which(name),
        })
        .collect()
}

/// Fails with the full list of names not found on `PATH`.
pub fn check_dependencies(sys: &dyn SystemInfo, names: &[String]) -> Result<(), PreflightError> {
    let missing: Vec<String> = probe_dependencies(sys, names)
        .into_iter()
        .filter(|d| d.path.is_none())
        .map(|d| d.name)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        tracing::error!(missing = ?missing, "required dependencies not found");
        Err(PreflightError::MissingDependencies(missing))
    }
}

/// Full preflight report, used by the `preflight` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightReport {
    pub dependencies: Vec<DependencyStatus>,
    pub ports: Vec<PortCheckResult>,
}

impl PreflightReport {
    pub fn passed(&self) -> bool {
        self.dependencies.iter().all(|d| d.path.is_some()) && self.ports.iter().all(|p| p.available)
    }
}

/// Probe everything without stopping at the first failure.
pub fn run_preflight(
    sys: &dyn SystemInfo,
    dependencies: &[String],
    ports: &[u16],
) -> Result<PreflightReport, PreflightError> {
    let ports = ports
        .iter()
        .map(|&port| check_port(sys, port))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(PreflightReport {
        dependencies: probe_dependencies(sys, dependencies),
        ports,
    })
}
