//! Environment reconciler.
//!
//! Merges a [`ReconcilePlan`] into an existing store. Per key, first match wins:
//!
//! 1. forced key: the supplied value, unconditionally;
//! 2. secret key: the existing non-empty value, else a fresh secret;
//! 3. anything else: the existing value, else the supplied default.
//!
//! Every assigned value goes through the injection check; a refused value
//! skips that one assignment and the pass continues. Keys the plan does not
//! mention are copied through untouched.

use std::path::Path;

use indexmap::{IndexMap, IndexSet};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};

use tipi_core::validate::{check_value, UnsafeValue};
use tipi_core::{env_store, EnvStore, WriteResult};

use crate::error::EnvError;
use crate::secret::generate_secret_with;

/// Inputs of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub defaults: IndexMap<String, String>,
    pub forced: IndexMap<String, String>,
    pub secrets: IndexSet<String>,
}

impl ReconcilePlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }

    pub fn forced_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.forced.insert(key.into(), value.into());
        self
    }

    pub fn secret(mut self, key: impl Into<String>) -> Self {
        self.secrets.insert(key.into());
        self
    }

    /// Every key the plan covers: defaults, then forced, then secrets, each
    /// key once. New keys are appended to the store in this order.
    pub fn keys(&self) -> IndexSet<&str> {
        self.defaults
            .keys()
            .chain(self.forced.keys())
            .chain(self.secrets.iter())
            .map(String::as_str)
            .collect()
    }
}

/// Result of a pure reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub store: EnvStore,
    /// Secret keys that received a freshly generated value.
    pub generated: Vec<String>,
    /// Assignments refused by the injection check.
    pub rejected: Vec<UnsafeValue>,
}

/// Reconcile with secrets drawn from the operating system's CSPRNG.
pub fn reconcile(existing: &EnvStore, plan: &ReconcilePlan) -> Result<ReconcileOutcome, EnvError> {
    reconcile_with_rng(existing, plan, &mut OsRng)
}

/// Reconcile with secrets drawn from `rng`.
///
/// Fails only when secret generation fails; nothing is partially applied
/// because the caller persists the returned store as a whole.
pub fn reconcile_with_rng<R>(
    existing: &EnvStore,
    plan: &ReconcilePlan,
    rng: &mut R,
) -> Result<ReconcileOutcome, EnvError>
where
    R: RngCore + CryptoRng + ?Sized,
{
    let mut store = existing.clone();
    let mut generated = Vec::new();
    let mut rejected = Vec::new();

    for key in plan.keys() {
        let current = existing.get(key);

        let value = if let Some(forced) = plan.forced.get(key) {
            forced.clone()
        } else if plan.secrets.contains(key) {
            match current {
                Some(v) if !v.is_empty() => continue,
                _ => {
                    let secret = generate_secret_with(rng)?;
                    generated.push(key.to_string());
                    secret
                }
            }
        } else if current.is_some() {
            continue;
        } else if let Some(default) = plan.defaults.get(key) {
            default.clone()
        } else {
            continue;
        };

        if let Err(refused) = check_value(key, &value) {
            tracing::warn!(key, sequence = ?refused.sequence, "refusing unsafe value; assignment skipped");
            generated.retain(|k| k != key);
            rejected.push(refused);
            continue;
        }

        store.insert(key, value);
    }

    Ok(ReconcileOutcome {
        store,
        generated,
        rejected,
    })
}

/// Result of reconciling the store file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileFileResult {
    pub outcome: ReconcileOutcome,
    pub write: WriteResult,
}

/// Load the store at `path`, reconcile it, and save it atomically.
///
/// On any error the file on disk is left exactly as it was.
pub fn reconcile_at(path: &Path, plan: &ReconcilePlan) -> Result<ReconcileFileResult, EnvError> {
    let existing = env_store::load_at(path)?;
    let outcome = reconcile(&existing, plan)?;
    let write = env_store::save_at(path, &outcome.store)?;
    tracing::info!(
        path = %path.display(),
        written = write.was_written(),
        generated = outcome.generated.len(),
        rejected = outcome.rejected.len(),
        "environment reconciled",
    );
    Ok(ReconcileFileResult { outcome, write })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::tests::FailingRng;
    use tempfile::TempDir;

    fn plan() -> ReconcilePlan {
        ReconcilePlan::new()
            .default_value("NGINX_PORT", "80")
            .forced_value("TIPI_VERSION", "v3.7.0")
            .secret("JWT_SECRET")
    }

    #[test]
    fn existing_value_beats_default() {
        let existing = EnvStore::parse("NGINX_PORT=8080\n");
        let out = reconcile(&existing, &plan()).unwrap();
        assert_eq!(out.store.get("NGINX_PORT"), Some("8080"));
    }

    #[test]
    fn forced_value_beats_existing() {
        let existing = EnvStore::parse("TIPI_VERSION=v1.0.0\n");
        let out = reconcile(&existing, &plan()).unwrap();
        assert_eq!(out.store.get("TIPI_VERSION"), Some("v3.7.0"));
    }

    #[test]
    fn empty_secret_is_regenerated() {
        let existing = EnvStore::parse("JWT_SECRET=\n");
        let out = reconcile(&existing, &plan()).unwrap();
        assert!(!out.store.get("JWT_SECRET").unwrap().is_empty());
        assert_eq!(out.generated, vec!["JWT_SECRET".to_string()]);
    }

    #[test]
    fn forced_secret_key_is_overwritten() {
        let plan = ReconcilePlan::new()
            .secret("JWT_SECRET")
            .forced_value("JWT_SECRET", "rotated");
        let existing = EnvStore::parse("JWT_SECRET=old\n");
        let out = reconcile(&existing, &plan).unwrap();
        assert_eq!(out.store.get("JWT_SECRET"), Some("rotated"));
        assert!(out.generated.is_empty());
    }

    #[test]
    fn secret_key_with_default_still_generates() {
        let plan = ReconcilePlan::new()
            .default_value("REDIS_PASSWORD", "changeme")
            .secret("REDIS_PASSWORD");
        let out = reconcile(&EnvStore::new(), &plan).unwrap();
        assert_ne!(out.store.get("REDIS_PASSWORD"), Some("changeme"));
    }

    #[test]
    fn rejected_forced_value_keeps_existing() {
        let plan = ReconcilePlan::new().forced_value("DOMAIN", "x; rm -rf /");
        let existing = EnvStore::parse("DOMAIN=example.com\n");
        let out = reconcile(&existing, &plan).unwrap();
        assert_eq!(out.store.get("DOMAIN"), Some("example.com"));
        assert_eq!(out.rejected.len(), 1);
        assert_eq!(out.rejected[0].key, "DOMAIN");
    }

    #[test]
    fn rejected_default_is_not_introduced() {
        let plan = ReconcilePlan::new()
            .default_value("BAD", "$(id)")
            .default_value("GOOD", "1");
        let out = reconcile(&EnvStore::new(), &plan).unwrap();
        assert!(!out.store.contains_key("BAD"));
        assert_eq!(out.store.get("GOOD"), Some("1"));
    }

    #[test]
    fn new_keys_append_in_plan_order() {
        let existing = EnvStore::parse("CUSTOM=1\n");
        let out = reconcile_with_rng(&existing, &plan(), &mut OsRng).unwrap();
        let keys: Vec<_> = out.store.keys().collect();
        assert_eq!(keys, vec!["CUSTOM", "NGINX_PORT", "TIPI_VERSION", "JWT_SECRET"]);
    }

    #[test]
    fn entropy_failure_is_fatal_and_store_untouched() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".env");
        std::fs::write(&path, "NGINX_PORT=80\n").unwrap();

        let existing = env_store::load_at(&path).unwrap();
        let err = reconcile_with_rng(&existing, &plan(), &mut FailingRng).unwrap_err();
        assert!(matches!(err, EnvError::Entropy(_)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "NGINX_PORT=80\n");
    }

    #[test]
    fn entropy_is_not_needed_when_secret_exists() {
        let existing = EnvStore::parse("JWT_SECRET=abc123\n");
        let out = reconcile_with_rng(&existing, &plan(), &mut FailingRng).unwrap();
        assert_eq!(out.store.get("JWT_SECRET"), Some("abc123"));
    }

    #[test]
    fn reconcile_at_writes_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".env");
        let result = reconcile_at(&path, &plan()).unwrap();
        assert!(result.write.was_written());
        let disk = std::fs::read_to_string(&path).unwrap();
        assert!(disk.starts_with("NGINX_PORT=80\nTIPI_VERSION=v3.7.0\nJWT_SECRET="));
    }
}
