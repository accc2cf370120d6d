use std::io;
use std::path::PathBuf;

use tipi_preflight::{
    check_dependencies, check_required_ports, run_preflight, CommandOutput, HostSystem,
    PreflightError, SystemInfo,
};

/// Host with only `ss`, reporting one listener on 8880.
struct OccupiedHost;

impl SystemInfo for OccupiedHost {
    fn which(&self, program: &str) -> Option<PathBuf> {
        (program == "ss").then(|| PathBuf::from("/usr/sbin/ss"))
    }

    fn run_capture(&self, _program: &str, args: &[&str]) -> io::Result<CommandOutput> {
        let stdout = if args.iter().any(|a| a.ends_with(":8880")) {
            "LISTEN 0 511 0.0.0.0:8880 0.0.0.0:* users:((\"node\",pid=4242,fd=19))\n"
        } else {
            ""
        };
        Ok(CommandOutput {
            success: true,
            stdout: stdout.to_string(),
        })
    }
}

#[test]
fn occupied_port_reports_owner() {
    let err = check_required_ports(&OccupiedHost, &[443, 8880]).unwrap_err();
    assert_eq!(
        err,
        PreflightError::PortInUse {
            port: 8880,
            pid: Some(4242)
        }
    );
}

#[test]
fn free_ports_pass() {
    let results = check_required_ports(&OccupiedHost, &[80, 443]).unwrap();
    assert!(results.iter().all(|r| r.available));
}

#[test]
fn dependencies_resolve_against_fake_path() {
    let err = check_dependencies(&OccupiedHost, &["docker".to_string()]).unwrap_err();
    assert!(matches!(err, PreflightError::MissingDependencies(ref m) if m == &["docker"]));
}

#[test]
fn report_passes_when_everything_is_free() {
    let report = run_preflight(&OccupiedHost, &["ss".to_string()], &[80]).unwrap();
    assert!(report.passed());
}

#[test]
fn host_system_finds_a_shell() {
    assert!(HostSystem.which("sh").is_some());
}
