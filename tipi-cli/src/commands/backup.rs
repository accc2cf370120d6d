//! `tipi-setup backup` subcommands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use tipi_backup::{create_backup, list_backups};
use tipi_core::BackupKind;
use tipi_lifecycle::logging;

use super::ConfigArgs;

#[derive(Subcommand, Debug)]
pub enum BackupCommand {
    /// Archive the installation now and prune old archives of the same kind.
    Create(BackupArgs),

    /// List archives of one kind, newest first.
    List(BackupArgs),
}

#[derive(Args, Debug)]
pub struct BackupArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Backup kind: scheduled or pre-upgrade.
    #[arg(long, default_value = "scheduled")]
    pub kind: BackupKind,
}

#[derive(Tabled)]
struct BackupRow {
    #[tabled(rename = "archive")]
    archive: String,
    #[tabled(rename = "kind")]
    kind: String,
    #[tabled(rename = "created (UTC)")]
    created: String,
    #[tabled(rename = "size")]
    size: String,
}

pub fn run(command: BackupCommand) -> Result<()> {
    match command {
        BackupCommand::Create(args) => create(args),
        BackupCommand::List(args) => list(args),
    }
}

fn create(args: BackupArgs) -> Result<()> {
    let config = args.config.load()?;
    let layout = config.layout();
    logging::init(Some(&layout));

    match create_backup(
        &layout,
        &config.backup_prefix,
        args.kind,
        config.retention.for_kind(args.kind),
    ) {
        Ok(record) => {
            println!("{} {}", "Created".green().bold(), record.path.display());
            Ok(())
        }
        Err(err) if err.is_empty_source() => {
            println!("{} {err}", "warning:".yellow().bold());
            Ok(())
        }
        Err(err) => Err(err).context("backup failed"),
    }
}

fn list(args: BackupArgs) -> Result<()> {
    let config = args.config.load()?;
    let layout = config.layout();
    let records = list_backups(&layout, &config.backup_prefix, args.kind)
        .with_context(|| format!("failed to list backups in {}", layout.backups_dir().display()))?;

    if records.is_empty() {
        println!("No {} backups.", args.kind);
        return Ok(());
    }

    let rows: Vec<BackupRow> = records
        .iter()
        .map(|r| BackupRow {
            archive: r
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            kind: r.kind.to_string(),
            created: r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            size: std::fs::metadata(&r.path)
                .map(|m| format_size(m.len()))
                .unwrap_or_else(|_| "?".into()),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}
