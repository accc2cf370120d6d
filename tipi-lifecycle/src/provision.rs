//! Fetching and installing the lifecycle binary, and image pre-pulls.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use flate2::read::GzDecoder;
use wait_timeout::ChildExt;

use tipi_core::layout::CLI_BINARY;
use tipi_core::InstallLayout;

use crate::config::RetryPolicy;
use crate::error::ProvisionError;

/// Upper bound on a downloaded artifact.
const MAX_ARTIFACT_BYTES: u64 = 256 * 1024 * 1024;

/// Network and container side effects of provisioning.
pub trait Provisioner {
    /// Download `url` into memory.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, ProvisionError>;

    /// Pull a container image, giving up after `timeout`.
    fn pull_image(&self, image: &str, timeout: Duration) -> Result<(), String>;
}

/// Production provisioner: `ureq` for downloads, `docker pull` for images.
pub struct HttpProvisioner {
    agent: ureq::Agent,
}

impl HttpProvisioner {
    pub fn new(connect_timeout: Duration, overall_timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(connect_timeout)
            .timeout(overall_timeout)
            .build();
        Self { agent }
    }
}

impl Provisioner for HttpProvisioner {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, ProvisionError> {
        let response = match self.agent.get(url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(404, _)) => {
                return Err(ProvisionError::NotFound { url: url.to_string() })
            }
            Err(ureq::Error::Status(code, _)) => {
                return Err(ProvisionError::Http {
                    url: url.to_string(),
                    message: format!("HTTP {code}"),
                })
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(ProvisionError::Http {
                    url: url.to_string(),
                    message: transport.to_string(),
                })
            }
        };

        read_capped(response.into_reader(), url, MAX_ARTIFACT_BYTES)
    }

    fn pull_image(&self, image: &str, timeout: Duration) -> Result<(), String> {
        let mut child = Command::new("docker")
            .args(["pull", image])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| format!("cannot run docker: {e}"))?;
        match child.wait_timeout(timeout).map_err(|e| e.to_string())? {
            Some(status) if status.success() => Ok(()),
            Some(status) => Err(format!("docker pull exited with {status}")),
            None => {
                let _ = child.kill();
                let _ = child.wait();
                Err(format!("timed out after {}s", timeout.as_secs()))
            }
        }
    }
}

/// Read a response body, rejecting anything larger than `limit` bytes.
fn read_capped(reader: impl Read, url: &str, limit: u64) -> Result<Vec<u8>, ProvisionError> {
    let mut bytes = Vec::new();
    reader
        .take(limit + 1)
        .read_to_end(&mut bytes)
        .map_err(|e| ProvisionError::Http {
            url: url.to_string(),
            message: e.to_string(),
        })?;
    if bytes.len() as u64 > limit {
        return Err(ProvisionError::InvalidArtifact {
            reason: format!("{url} is larger than {limit} bytes"),
        });
    }
    Ok(bytes)
}

/// Download the artifact at `url` and install its `runtipi-cli` entry.
///
/// Transport failures are retried per `retry`; a 404 or a malformed artifact
/// ends the attempt loop immediately.
pub fn provision_cli(
    provisioner: &dyn Provisioner,
    layout: &InstallLayout,
    url: &str,
    retry: &RetryPolicy,
) -> Result<PathBuf, ProvisionError> {
    let attempts = retry.attempts.max(1);
    let mut last = String::new();

    for attempt in 1..=attempts {
        let result = provisioner
            .fetch(url)
            .and_then(|bytes| install_cli_archive(&bytes, layout));
        match result {
            Ok(path) => {
                tracing::info!(url, attempt, path = %path.display(), "lifecycle cli installed");
                return Ok(path);
            }
            Err(err) if !err.is_retryable() => {
                tracing::error!(url, attempt, error = %err, "provisioning failed, not retrying");
                return Err(err);
            }
            Err(err) => {
                tracing::warn!(url, attempt, attempts, error = %err, "provisioning attempt failed");
                last = err.to_string();
                if attempt < attempts {
                    thread::sleep(retry.delay());
                }
            }
        }
    }

    Err(ProvisionError::Exhausted { attempts, last })
}

/// Extract the `runtipi-cli` entry of a `.tar.gz` into the install root.
///
/// The binary is written beside its final path, made executable, then
/// renamed over any previous version. An undecodable archive is an
/// [`ProvisionError::InvalidArtifact`]; the temporary file never outlives a
/// failed call.
pub fn install_cli_archive(bytes: &[u8], layout: &InstallLayout) -> Result<PathBuf, ProvisionError> {
    let body = extract_cli_entry(bytes)?;

    let root = layout.root();
    fs::create_dir_all(root).map_err(|e| io_err(root, e))?;
    let target = layout.cli_binary();
    let tmp = root.join(format!("{CLI_BINARY}.tmp"));

    if let Err(err) = write_executable(&tmp, &body, &target) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    Ok(target)
}

fn extract_cli_entry(bytes: &[u8]) -> Result<Vec<u8>, ProvisionError> {
    let invalid = |e: io::Error| ProvisionError::InvalidArtifact { reason: e.to_string() };

    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    for entry in archive.entries().map_err(invalid)? {
        let mut entry = entry.map_err(invalid)?;
        let is_cli = entry.header().entry_type().is_file()
            && entry
                .path()
                .ok()
                .and_then(|p| p.file_name().map(|n| n == CLI_BINARY))
                .unwrap_or(false);
        if !is_cli {
            continue;
        }
        let mut body = Vec::new();
        (&mut entry)
            .take(MAX_ARTIFACT_BYTES + 1)
            .read_to_end(&mut body)
            .map_err(invalid)?;
        if body.len() as u64 > MAX_ARTIFACT_BYTES {
            return Err(ProvisionError::InvalidArtifact {
                reason: format!("`{CLI_BINARY}` is larger than {MAX_ARTIFACT_BYTES} bytes"),
            });
        }
        return Ok(body);
    }

    Err(ProvisionError::MissingEntry {
        entry: CLI_BINARY.to_string(),
    })
}

fn write_executable(tmp: &Path, body: &[u8], target: &Path) -> Result<(), ProvisionError> {
    let mut out = File::create(tmp).map_err(|e| io_err(tmp, e))?;
    out.write_all(body).map_err(|e| io_err(tmp, e))?;
    out.sync_all().map_err(|e| io_err(tmp, e))?;
    drop(out);
    set_executable(tmp)?;
    fs::rename(tmp, target).map_err(|e| io_err(target, e))
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<(), ProvisionError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<(), ProvisionError> {
    Ok(())
}

fn io_err(path: impl Into<PathBuf>, source: io::Error) -> ProvisionError {
    ProvisionError::Io {
        path: path.into(),
        source,
    }
}
