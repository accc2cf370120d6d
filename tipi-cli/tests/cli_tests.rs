use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;
use predicates::str::contains;

fn tipi_cmd(root: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("tipi-setup"));
    cmd.env("HOME", root)
        .env("RUST_LOG", "warn")
        .env("NO_COLOR", "1");
    cmd
}

fn env_value(root: &Path, key: &str) -> Option<String> {
    let raw = fs::read_to_string(root.join(".env")).ok()?;
    raw.lines()
        .find_map(|line| line.strip_prefix(&format!("{key}=")).map(str::to_string))
}

#[test]
fn dry_run_prints_diff_and_writes_nothing() {
    let root = TempDir::new().unwrap();

    tipi_cmd(root.path())
        .args(["reconcile", "--dry-run", "--version", "v3.7.0", "--root"])
        .arg(root.path())
        .assert()
        .success()
        .stdout(contains("+TIPI_VERSION=v3.7.0"))
        .stdout(contains("+JWT_SECRET=<generated>"));

    root.child(".env").assert(predicate::path::missing());
}

#[test]
fn reconcile_twice_keeps_secrets() {
    let root = TempDir::new().unwrap();
    let run = || {
        tipi_cmd(root.path())
            .args(["reconcile", "--version", "v3.7.0", "--root"])
            .arg(root.path())
            .assert()
            .success();
    };

    run();
    let first = env_value(root.path(), "JWT_SECRET").expect("secret generated");
    let before = fs::read(root.path().join(".env")).unwrap();
    run();
    let after = fs::read(root.path().join(".env")).unwrap();

    assert_eq!(env_value(root.path(), "JWT_SECRET").as_deref(), Some(first.as_str()));
    assert_eq!(before, after);
}

#[test]
fn reconcile_without_version_fails() {
    let root = TempDir::new().unwrap();
    tipi_cmd(root.path())
        .args(["reconcile", "--root"])
        .arg(root.path())
        .assert()
        .failure()
        .stderr(contains("no target version"));
}

#[test]
fn config_file_is_honoured() {
    let root = TempDir::new().unwrap();
    let cfg = root.child("tipi.yaml");
    cfg.write_str(&format!(
        "root: {}\nversion: v3.8.1\nextra_defaults:\n  DOMAIN: tipi.example.org\n",
        root.path().display()
    ))
    .unwrap();

    tipi_cmd(root.path())
        .args(["reconcile", "--config"])
        .arg(cfg.path())
        .assert()
        .success();

    assert_eq!(env_value(root.path(), "TIPI_VERSION").as_deref(), Some("v3.8.1"));
    assert_eq!(env_value(root.path(), "DOMAIN").as_deref(), Some("tipi.example.org"));
}

#[test]
fn backup_of_empty_root_is_a_warning() {
    let root = TempDir::new().unwrap();
    tipi_cmd(root.path())
        .args(["backup", "create", "--root"])
        .arg(root.path())
        .assert()
        .success()
        .stdout(contains("nothing to back up"));
}

#[test]
fn backup_create_then_list() {
    let root = TempDir::new().unwrap();
    root.child(".env").write_str("JWT_SECRET=abc123\n").unwrap();

    tipi_cmd(root.path())
        .args(["backup", "create", "--kind", "pre-upgrade", "--root"])
        .arg(root.path())
        .assert()
        .success()
        .stdout(contains("runtipi-pre-upgrade-"));

    tipi_cmd(root.path())
        .args(["backup", "list", "--kind", "pre-upgrade", "--root"])
        .arg(root.path())
        .assert()
        .success()
        .stdout(contains(".tar.gz"));

    tipi_cmd(root.path())
        .args(["backup", "list", "--root"])
        .arg(root.path())
        .assert()
        .success()
        .stdout(contains("No scheduled backups."));
}

#[test]
fn sync_settings_updates_existing_keys_only() {
    let root = TempDir::new().unwrap();
    root.child(".env")
        .write_str("DOMAIN=old.example.org\nJWT_SECRET=abc123\n")
        .unwrap();
    root.child("state/settings.json")
        .write_str(r#"{"domain": "new.example.org", "localDomain": "tipi.lan"}"#)
        .unwrap();

    tipi_cmd(root.path())
        .args(["sync-settings", "--root"])
        .arg(root.path())
        .assert()
        .success()
        .stdout(contains("DOMAIN"));

    assert_eq!(env_value(root.path(), "DOMAIN").as_deref(), Some("new.example.org"));
    assert_eq!(env_value(root.path(), "LOCAL_DOMAIN"), None);
}

#[test]
fn malformed_settings_leave_store_untouched() {
    let root = TempDir::new().unwrap();
    root.child(".env").write_str("DOMAIN=old.example.org\n").unwrap();
    root.child("state/settings.json").write_str("{ not json").unwrap();

    tipi_cmd(root.path())
        .args(["sync-settings", "--root"])
        .arg(root.path())
        .assert()
        .failure()
        .stderr(contains("settings sync failed"));

    root.child(".env").assert("DOMAIN=old.example.org\n");
}

#[test]
fn upgrade_refuses_fresh_root() {
    let root = TempDir::new().unwrap();
    tipi_cmd(root.path())
        .args(["upgrade", "--version", "v3.7.0", "--root"])
        .arg(root.path())
        .assert()
        .failure()
        .stderr(contains("nothing installed"));
}

#[test]
fn cli_without_installed_binary_fails() {
    let root = TempDir::new().unwrap();
    tipi_cmd(root.path())
        .args(["cli", "--root"])
        .arg(root.path())
        .arg("start")
        .assert()
        .failure()
        .stderr(contains("failed to run runtipi-cli start"));
}

#[test]
fn preflight_reports_missing_dependency() {
    let root = TempDir::new().unwrap();
    tipi_cmd(root.path())
        .args(["preflight", "--dependency", "surely-not-installed-tipi-tool"])
        .assert()
        .failure()
        .stdout(contains("surely-not-installed-tipi-tool"))
        .stderr(contains("preflight checks failed"));
}
