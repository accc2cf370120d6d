//! Install/upgrade lifecycle runtime: the state machine and everything it drives.
//!
//! [`Orchestrator::run`] walks `Idle → Preflight → (Backup) → Reconcile →
//! Provision → Finalize → Complete`, or stops in `Failed` on the first fatal
//! error. All configuration arrives through one [`LifecycleConfig`].

pub mod cli_wrapper;
pub mod config;
mod error;
pub mod log_rotation;
pub mod logging;
pub mod orchestrator;
pub mod permissions;
pub mod provision;
pub mod watch;

pub use cli_wrapper::{CliInvocationResult, CliWrapper};
pub use config::LifecycleConfig;
pub use error::{CliError, LifecycleError, ProvisionError};
pub use orchestrator::{LifecycleReport, LifecycleState, Orchestrator};
pub use provision::{HttpProvisioner, Provisioner};
