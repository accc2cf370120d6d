//! Tipi core library: domain types, the environment store, errors.
//!
//! Public API surface:
//! - [`env_store`]: `KEY=VALUE` store parse / serialize / atomic save
//! - [`layout`]: every path of an install, derived from its root
//! - [`validate`]: injection check applied to every assigned value
//! - [`version`]: package version parsing and ordering
//! - [`types`]: shared enums
//! - [`error`]: [`StoreError`]

pub mod env_store;
pub mod error;
pub mod layout;
pub mod types;
pub mod validate;
pub mod version;

pub use env_store::{EnvStore, WriteResult};
pub use error::StoreError;
pub use layout::InstallLayout;
pub use types::BackupKind;
pub use validate::UnsafeValue;
pub use version::PackageVersion;
