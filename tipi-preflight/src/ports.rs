//! Port availability probes.
//!
//! Probes are tried in [`PortProbe::ORDER`]; the first one installed on the host
//! and giving a conclusive answer wins. When no probe is available the port is
//! reported free and a warning is logged. That is a known limitation on
//! minimal hosts, not an error.

use std::fmt;

use crate::{CommandOutput, PreflightError, SystemInfo};

/// Result of probing one port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCheckResult {
    pub port: u16,
    pub available: bool,
    /// Owning process, when the probe can see it.
    pub pid: Option<u32>,
    /// The probe that answered, `None` when none was available.
    pub probe: Option<PortProbe>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortProbe {
    Ss,
    Lsof,
    Netstat,
}

impl PortProbe {
    pub const ORDER: [PortProbe; 3] = [PortProbe::Ss, PortProbe::Lsof, PortProbe::Netstat];

    pub fn program(self) -> &'static str {
        match self {
            PortProbe::Ss => "ss",
            PortProbe::Lsof => "lsof",
            PortProbe::Netstat => "netstat",
        }
    }

    fn args(self, port: u16) -> Vec<String> {
        match self {
            PortProbe::Ss => vec!["-tlnp".into(), format!("sport = :{port}")],
            PortProbe::Lsof => vec![
                "-nP".into(),
                format!("-iTCP:{port}"),
                "-sTCP:LISTEN".into(),
                "-Fp".into(),
            ],
            PortProbe::Netstat => vec!["-tlnp".into()],
        }
    }

    /// `Some((occupied, pid))` when conclusive, `None` to fall through.
    fn interpret(self, output: &CommandOutput, port: u16) -> Option<(bool, Option<u32>)> {
        match self {
            PortProbe::Ss => output.success.then(|| parse_ss(&output.stdout, port)),
            // lsof exits 1 with no output when nothing matches.
            PortProbe::Lsof => {
                if !output.success && !output.stdout.trim().is_empty() {
                    return None;
                }
                Some(parse_lsof(&output.stdout))
            }
            PortProbe::Netstat => output.success.then(|| parse_netstat(&output.stdout, port)),
        }
    }
}

impl fmt::Display for PortProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

/// Probe a single port.
pub fn check_port(sys: &dyn SystemInfo, port: u16) -> Result<PortCheckResult, PreflightError> {
    if port == 0 {
        return Err(PreflightError::InvalidPort);
    }

    for probe in PortProbe::ORDER {
        if sys.which(probe.program()).is_none() {
            continue;
        }
        let args = probe.args(port);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = match sys.run_capture(probe.program(), &args) {
            Ok(output) => output,
            Err(e) => {
                tracing::debug!(probe = %probe, error = %e, "port probe failed to run");
                continue;
            }
        };
        if let Some((occupied, pid)) = probe.interpret(&output, port) {
            tracing::debug!(port, probe = %probe, occupied, pid = ?pid, "port probed");
            return Ok(PortCheckResult {
                port,
                available: !occupied,
                pid,
                probe: Some(probe),
            });
        }
    }

    tracing::warn!(port, "no port probe available, assuming the port is free");
    Ok(PortCheckResult {
        port,
        available: true,
        pid: None,
        probe: None,
    })
}

/// Probe `ports` in order and fail on the first one in use.
pub fn check_required_ports(
    sys: &dyn SystemInfo,
    ports: &[u16],
) -> Result<Vec<PortCheckResult>, PreflightError> {
    let mut results = Vec::with_capacity(ports.len());
    for &port in ports {
        let result = check_port(sys, port)?;
        if !result.available {
            tracing::error!(port, pid = ?result.pid, "required port is in use");
            return Err(PreflightError::PortInUse {
                port,
                pid: result.pid,
            });
        }
        results.push(result);
    }
    Ok(results)
}

// ---------------------------------------------------------------------------
// Output parsers
// ---------------------------------------------------------------------------

fn address_has_port(addr: &str, port: u16) -> bool {
    addr.rsplit_once(':')
        .map(|(_, p)| p == port.to_string())
        .unwrap_or(false)
}

fn pid_after(text: &str, marker: &str) -> Option<u32> {
    let start = text.find(marker)? + marker.len();
    let digits: String = text[start..].chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// `ss -tlnp`: `LISTEN 0 511 0.0.0.0:80 0.0.0.0:* users:(("nginx",pid=812,fd=6))`
fn parse_ss(stdout: &str, port: u16) -> (bool, Option<u32>) {
    for line in stdout.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 || fields[0] == "State" {
            continue;
        }
        if address_has_port(fields[3], port) {
            return (true, pid_after(line, "pid="));
        }
    }
    (false, None)
}

/// `lsof -Fp`: one `p<PID>` line per process.
fn parse_lsof(stdout: &str) -> (bool, Option<u32>) {
    let mut pids = stdout
        .lines()
        .filter_map(|line| line.strip_prefix('p'))
        .filter_map(|pid| pid.trim().parse::<u32>().ok());
    match pids.next() {
        Some(pid) => (true, Some(pid)),
        None => (false, None),
    }
}

/// `netstat -tlnp`: `tcp 0 0 0.0.0.0:80 0.0.0.0:* LISTEN 812/nginx`
fn parse_netstat(stdout: &str, port: u16) -> (bool, Option<u32>) {
    for line in stdout.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 || !fields[0].starts_with("tcp") {
            continue;
        }
        if address_has_port(fields[3], port) {
            let pid = fields
                .last()
                .and_then(|last| last.split('/').next())
                .and_then(|pid| pid.parse().ok());
            return (true, pid);
        }
    }
    (false, None)
}
