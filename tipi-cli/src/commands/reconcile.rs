//! `tipi-setup reconcile [--dry-run]`

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use tipi_env::diff::preview_reconcile;
use tipi_env::reconcile_at;
use tipi_lifecycle::logging;

use super::ConfigArgs;

#[derive(Args, Debug)]
pub struct ReconcileArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Target package version, e.g. v3.7.0.
    #[arg(long = "version", value_name = "VERSION")]
    pub target_version: Option<String>,

    /// Print the unified diff and write nothing.
    #[arg(long)]
    pub dry_run: bool,
}

impl ReconcileArgs {
    pub fn run(self) -> Result<()> {
        let mut config = self.config.load()?;
        if let Some(version) = self.target_version {
            config.version = version;
        }
        config.validate()?;
        let layout = config.layout();
        let env_file = layout.env_file();
        let plan = config.reconcile_plan();

        if self.dry_run {
            let preview = preview_reconcile(&env_file, &plan)
                .with_context(|| format!("failed to preview {}", env_file.display()))?;
            match preview.unified_diff {
                Some(diff) => {
                    print!("{diff}");
                    if !diff.ends_with('\n') {
                        println!();
                    }
                }
                None => println!("No changes for {}.", env_file.display()),
            }
            for rejected in &preview.outcome.rejected {
                println!("{} {rejected}", "rejected:".yellow().bold());
            }
            return Ok(());
        }

        logging::init(Some(&layout));
        let result = reconcile_at(&env_file, &plan)
            .with_context(|| format!("failed to reconcile {}", env_file.display()))?;
        if result.write.was_written() {
            println!("{} {}", "Updated".green().bold(), env_file.display());
        } else {
            println!("{} is up to date.", env_file.display());
        }
        for key in &result.outcome.generated {
            println!("  {} {key}", "generated".green());
        }
        for rejected in &result.outcome.rejected {
            println!("{} {rejected}", "rejected:".yellow().bold());
        }
        Ok(())
    }
}
