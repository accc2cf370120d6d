//! # tipi-env
//!
//! Everything that mutates the environment store: the reconciler that merges
//! defaults, forced keys, and secrets into it, and the settings synchronizer
//! that projects `state/settings.json` onto keys that already exist.

pub mod diff;
pub mod error;
pub mod reconcile;
pub mod secret;
pub mod settings;
pub mod snapshot;

pub use error::EnvError;
pub use reconcile::{reconcile, reconcile_at, ReconcileOutcome, ReconcilePlan};
pub use settings::{sync_settings_to_env, SettingsSyncOutcome, TranslationTable, SETTINGS_TABLE_V1};
