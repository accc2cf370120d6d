pub mod backup;
pub mod cli;
pub mod install;
pub mod preflight;
pub mod reconcile;
pub mod settings;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use tipi_lifecycle::LifecycleConfig;

/// Flags shared by every command that needs a configuration.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// YAML configuration file.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Install root (overrides the config file).
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,
}

impl ConfigArgs {
    /// Defaults, then the YAML file, then `--root`.
    pub fn load(&self) -> Result<LifecycleConfig> {
        let mut config = LifecycleConfig::load_or_default(self.config.as_deref())
            .with_context(|| match &self.config {
                Some(path) => format!("failed to load config {}", path.display()),
                None => "failed to build default config".to_string(),
            })?;
        if let Some(root) = &self.root {
            config.root = root.clone();
        }
        Ok(config)
    }
}
