//! Runs the installed lifecycle binary and classifies what it printed.
//!
//! All child output goes to the append-only secondary log (`logs/runtipi-cli.log`).
//! Only a curated summary reaches the structured log: success lines on a zero
//! exit, matching error lines plus a pointer to the secondary log otherwise.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use wait_timeout::ChildExt;

use tipi_core::InstallLayout;

use crate::error::CliError;

pub const SUCCESS_MARKER: &str = "✓";
pub const SUCCESS_SCAN_LINES: usize = 50;
pub const ERROR_SCAN_LINES: usize = 20;
pub const MAX_ERROR_LINES: usize = 5;
pub const ERROR_KEYWORDS: [&str; 4] = ["error", "failed", "cannot", "unable"];

/// Outcome of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliInvocationResult {
    pub action: String,
    /// Exit code; `None` when the child was ended by a signal.
    pub status: Option<i32>,
    pub success_lines: Vec<String>,
    pub error_lines: Vec<String>,
}

impl CliInvocationResult {
    pub fn succeeded(&self) -> bool {
        self.status == Some(0)
    }
}

#[derive(Debug, Clone)]
pub struct CliWrapper {
    binary: PathBuf,
    log_path: PathBuf,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl CliWrapper {
    pub fn new(binary: impl Into<PathBuf>, log_path: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            log_path: log_path.into(),
            working_dir: None,
            timeout: None,
        }
    }

    /// The installed binary, run from the install root.
    pub fn from_layout(layout: &InstallLayout) -> Self {
        Self::new(layout.cli_binary(), layout.cli_log()).with_working_dir(layout.root())
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Run `<binary> <action> <args...>` to completion.
    ///
    /// Blocks until the child exits unless a timeout was configured, in which
    /// case an overrunning child is killed.
    pub fn invoke(&self, action: &str, args: &[&str]) -> Result<CliInvocationResult, CliError> {
        let mut log = self.open_log()?;
        let header = format!(
            "==> {} {} {}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            action,
            args.join(" ")
        );
        log.write_all(header.as_bytes()).map_err(|e| self.log_err(e))?;
        let start = log.metadata().map_err(|e| self.log_err(e))?.len();

        let stdout = log.try_clone().map_err(|e| self.log_err(e))?;
        let stderr = log.try_clone().map_err(|e| self.log_err(e))?;
        let mut command = Command::new(&self.binary);
        command
            .arg(action)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        tracing::debug!(binary = %self.binary.display(), action, "invoking lifecycle cli");
        let mut child = spawn(&mut command).map_err(|source| CliError::Spawn {
            program: self.binary.clone(),
            source,
        })?;
        let status = self.wait(&mut child, action)?;

        let output = self.read_since(start)?;
        let result = classify(action, status.code(), &output);
        self.report(&result);
        Ok(result)
    }

    fn open_log(&self) -> Result<File, CliError> {
        if let Some(dir) = self.log_path.parent() {
            fs::create_dir_all(dir).map_err(|e| self.log_err(e))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(|e| self.log_err(e))
    }

    fn wait(&self, child: &mut Child, action: &str) -> Result<ExitStatus, CliError> {
        let Some(timeout) = self.timeout else {
            return child.wait().map_err(|e| self.spawn_err(e));
        };
        match child.wait_timeout(timeout).map_err(|e| self.spawn_err(e))? {
            Some(status) => Ok(status),
            None => {
                let _ = child.kill();
                let _ = child.wait();
                tracing::error!(action, secs = timeout.as_secs(), "lifecycle cli timed out");
                Err(CliError::TimedOut {
                    action: action.to_string(),
                    secs: timeout.as_secs(),
                })
            }
        }
    }

    fn read_since(&self, offset: u64) -> Result<String, CliError> {
        let mut file = File::open(&self.log_path).map_err(|e| self.log_err(e))?;
        file.seek(SeekFrom::Start(offset)).map_err(|e| self.log_err(e))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).map_err(|e| self.log_err(e))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn report(&self, result: &CliInvocationResult) {
        let action = result.action.as_str();
        if result.succeeded() {
            for line in &result.success_lines {
                tracing::info!(action, "{line}");
            }
            return;
        }
        for line in &result.error_lines {
            tracing::error!(action, "{line}");
        }
        tracing::error!(
            action,
            status = ?result.status,
            log = %self.log_path.display(),
            "lifecycle cli failed, see the cli log for full output",
        );
    }

    fn log_err(&self, source: std::io::Error) -> CliError {
        CliError::Io {
            path: self.log_path.clone(),
            source,
        }
    }

    fn spawn_err(&self, source: std::io::Error) -> CliError {
        CliError::Spawn {
            program: self.binary.clone(),
            source,
        }
    }
}

/// Classify the output of one invocation.
pub fn classify(action: &str, status: Option<i32>, output: &str) -> CliInvocationResult {
    let lines: Vec<&str> = output.lines().collect();
    let (success_lines, error_lines) = if status == Some(0) {
        (success_lines(&lines), Vec::new())
    } else {
        (Vec::new(), error_lines(&lines))
    };
    CliInvocationResult {
        action: action.to_string(),
        status,
        success_lines,
        error_lines,
    }
}

fn last<'a>(lines: &'a [&'a str], n: usize) -> &'a [&'a str] {
    &lines[lines.len().saturating_sub(n)..]
}

fn success_lines(lines: &[&str]) -> Vec<String> {
    last(lines, SUCCESS_SCAN_LINES)
        .iter()
        .filter_map(|line| line.trim().strip_prefix(SUCCESS_MARKER))
        .map(|rest| rest.trim().to_string())
        .filter(|rest| !rest.is_empty())
        .collect()
}

fn error_lines(lines: &[&str]) -> Vec<String> {
    last(lines, ERROR_SCAN_LINES)
        .iter()
        .filter(|line| {
            let lower = line.to_lowercase();
            ERROR_KEYWORDS.iter().any(|kw| lower.contains(kw))
        })
        .take(MAX_ERROR_LINES)
        .map(|line| line.trim().to_string())
        .collect()
}

// Retry ETXTBSY on a just-written binary.
#[cfg(target_os = "linux")]
fn spawn(command: &mut Command) -> std::io::Result<Child> {
    const ETXTBSY: i32 = 26;
    let mut attempts = 0;
    loop {
        match command.spawn() {
            Err(err) if err.raw_os_error() == Some(ETXTBSY) && attempts < 5 => {
                attempts += 1;
                std::thread::sleep(Duration::from_millis(50));
            }
            other => return other,
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn spawn(command: &mut Command) -> std::io::Result<Child> {
    command.spawn()
}
