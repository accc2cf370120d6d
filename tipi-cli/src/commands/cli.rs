//! `tipi-setup cli <action> [args]...`: run the installed runtipi-cli.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use tipi_lifecycle::{logging, CliWrapper};

use super::ConfigArgs;

#[derive(Args, Debug)]
pub struct CliArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Action passed to runtipi-cli, e.g. start, stop, restart.
    pub action: String,

    /// Extra arguments for the action.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl CliArgs {
    pub fn run(self) -> Result<()> {
        let config = self.config.load()?;
        let layout = config.layout();
        logging::init(Some(&layout));

        let wrapper = CliWrapper::from_layout(&layout).with_timeout(config.cli_timeout());
        let args: Vec<&str> = self.args.iter().map(String::as_str).collect();
        let result = wrapper
            .invoke(&self.action, &args)
            .with_context(|| format!("failed to run runtipi-cli {}", self.action))?;

        for line in &result.success_lines {
            println!("{} {line}", "✓".green());
        }
        if !result.succeeded() {
            for line in &result.error_lines {
                println!("{} {line}", "✗".red());
            }
            bail!(
                "runtipi-cli {} failed; full output in {}",
                self.action,
                wrapper.log_path().display()
            );
        }
        Ok(())
    }
}
