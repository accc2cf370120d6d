//! `tipi-setup sync-settings` and `tipi-setup watch-settings`.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use tipi_env::sync_settings_to_env;
use tipi_lifecycle::{logging, watch::watch_settings};

use super::ConfigArgs;

#[derive(Args, Debug)]
pub struct SettingsArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}

impl SettingsArgs {
    pub fn sync(self) -> Result<()> {
        let config = self.config.load()?;
        let layout = config.layout();
        logging::init(Some(&layout));

        let outcome = sync_settings_to_env(&layout.settings_file(), &layout.env_file())
            .context("settings sync failed; the store was not modified")?;

        if outcome.write.is_none() {
            println!("No store at {}; nothing to sync.", layout.env_file().display());
            return Ok(());
        }
        if outcome.updated.is_empty() {
            println!("Store already matches settings.");
        }
        for key in &outcome.updated {
            println!("  {} {key}", "updated".green());
        }
        for key in &outcome.skipped_missing {
            println!("  {} {key} (not in store)", "skipped".dimmed());
        }
        for rejected in &outcome.rejected {
            println!("{} {rejected}", "rejected:".yellow().bold());
        }
        Ok(())
    }

    pub fn watch(self) -> Result<()> {
        let config = self.config.load()?;
        let layout = config.layout();
        logging::init(Some(&layout));

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start async runtime")?;
        runtime
            .block_on(watch_settings(layout))
            .context("settings watcher failed")
    }
}
