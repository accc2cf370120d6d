//! Dry-run unified diff for `tipi-setup reconcile --dry-run`.

use std::path::Path;

use similar::TextDiff;

use tipi_core::{env_store, EnvStore};

use crate::error::EnvError;
use crate::reconcile::{reconcile, ReconcileOutcome, ReconcilePlan};

/// Placeholder shown instead of freshly generated secret values.
pub const GENERATED_PLACEHOLDER: &str = "<generated>";

/// What a reconciliation would do, without writing anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePreview {
    pub outcome: ReconcileOutcome,
    /// `None` when the store would not change.
    pub unified_diff: Option<String>,
}

/// Reconcile in memory and diff the result against the file on disk.
pub fn preview_reconcile(path: &Path, plan: &ReconcilePlan) -> Result<ReconcilePreview, EnvError> {
    let existing = env_store::load_at(path)?;
    let outcome = reconcile(&existing, plan)?;

    let mut shown = outcome.store.clone();
    for key in &outcome.generated {
        shown.insert(key.as_str(), GENERATED_PLACEHOLDER);
    }

    let label = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| ".env".to_string());
    let unified_diff = diff_stores(&label, &existing, &shown);
    Ok(ReconcilePreview {
        outcome,
        unified_diff,
    })
}

/// Unified diff between two stores, or `None` if they serialize identically.
pub fn diff_stores(label: &str, before: &EnvStore, after: &EnvStore) -> Option<String> {
    let old = before.to_env_string();
    let new = after.to_env_string();
    if old == new {
        return None;
    }
    let old_header = format!("a/{label}");
    let new_header = format!("b/{label}");
    Some(
        TextDiff::from_lines(&old, &new)
            .unified_diff()
            .header(&old_header, &new_header)
            .context_radius(3)
            .to_string(),
    )
}
