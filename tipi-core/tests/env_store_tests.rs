//! Environment store integration tests: wire format, unknown-key
//! preservation, and atomic-write safety.

use assert_fs::prelude::*;
use filetime::{set_file_mtime, FileTime};
use predicates::prelude::predicate;
use tipi_core::{env_store, EnvStore, WriteResult};

#[test]
fn unknown_keys_survive_load_modify_save() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let env = root.child(".env");
    env.write_str("CUSTOM_FLAG=on\nNGINX_PORT=80\nMY_APP_TOKEN=xyz\n")
        .expect("write");

    let mut store = env_store::load_at(env.path()).expect("load");
    store.insert("NGINX_PORT", "8880");
    env_store::save_at(env.path(), &store).expect("save");

    env.assert(predicate::str::contains("CUSTOM_FLAG=on"));
    env.assert(predicate::str::contains("MY_APP_TOKEN=xyz"));
    env.assert("CUSTOM_FLAG=on\nNGINX_PORT=8880\nMY_APP_TOKEN=xyz\n");
}

#[test]
fn save_then_load_preserves_entries_in_order() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let path = root.path().join(".env");
    let store: EnvStore = [
        ("TIPI_VERSION", "v3.7.0"),
        ("INTERNAL_IP", "192.168.1.10"),
        ("APPS_REPOSITORY_URL", "https://example.com/repo?ref=main"),
    ]
    .into_iter()
    .collect();

    env_store::save_at(&path, &store).expect("save");
    let loaded = env_store::load_at(&path).expect("load");
    assert_eq!(loaded, store);
}

#[test]
fn unchanged_write_keeps_file_untouched() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let env = root.child(".env");
    env.write_str("A=1\n").expect("write");
    let past = FileTime::from_unix_time(1_600_000_000, 0);
    set_file_mtime(env.path(), past).expect("set mtime");

    let store = env_store::load_at(env.path()).expect("load");
    let result = env_store::save_at(env.path(), &store).expect("save");

    assert_eq!(
        result,
        WriteResult::Unchanged {
            path: env.path().to_path_buf()
        }
    );
    let meta = std::fs::metadata(env.path()).unwrap();
    assert_eq!(FileTime::from_last_modification_time(&meta), past);
}

#[test]
fn write_atomic_creates_parent_directories() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let marker = root.path().join("nested").join("VERSION");
    env_store::write_atomic(&marker, "v3.7.0\n").expect("write");
    root.child("nested/VERSION").assert("v3.7.0\n");
    root.child("nested/VERSION.tmp")
        .assert(predicate::path::missing());
}
