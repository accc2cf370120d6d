//! tipi-setup: install and upgrade lifecycle for a self-hosted runtipi.
//!
//! # Usage
//!
//! ```text
//! tipi-setup install [--config F] [--root D] [--version V] [--port P]... [--no-start]
//! tipi-setup upgrade [same flags as install]
//! tipi-setup backup create|list [--kind scheduled|pre-upgrade]
//! tipi-setup preflight [--port P]... [--dependency N]...
//! tipi-setup reconcile [--dry-run]
//! tipi-setup sync-settings
//! tipi-setup watch-settings
//! tipi-setup cli <action> [args]...
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    backup::BackupCommand, cli::CliArgs, install::InstallArgs, preflight::PreflightArgs,
    reconcile::ReconcileArgs, settings::SettingsArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "tipi-setup",
    version,
    about = "Install, upgrade and maintain a runtipi installation",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full lifecycle. An existing installation is upgraded.
    Install(InstallArgs),

    /// Like `install`, but refuses to run when nothing is installed.
    Upgrade(InstallArgs),

    /// Create or list backup archives.
    Backup {
        #[command(subcommand)]
        command: BackupCommand,
    },

    /// Check dependencies and ports without changing anything.
    Preflight(PreflightArgs),

    /// Reconcile the environment store against the configuration.
    Reconcile(ReconcileArgs),

    /// Project state/settings.json onto the environment store once.
    SyncSettings(SettingsArgs),

    /// Keep the environment store in sync with state/settings.json.
    WatchSettings(SettingsArgs),

    /// Invoke the installed runtipi-cli with log capture.
    Cli(CliArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Install(args) => args.run(false),
        Commands::Upgrade(args) => args.run(true),
        Commands::Backup { command } => commands::backup::run(command),
        Commands::Preflight(args) => args.run(),
        Commands::Reconcile(args) => args.run(),
        Commands::SyncSettings(args) => args.sync(),
        Commands::WatchSettings(args) => args.watch(),
        Commands::Cli(args) => args.run(),
    }
}
