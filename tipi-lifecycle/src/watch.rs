//! Re-sync the store whenever `state/settings.json` changes.

use std::fs;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

use tipi_core::InstallLayout;
use tipi_env::sync_settings_to_env;

use crate::error::{io_err, LifecycleError};

/// Quiet period after the last settings event before a sync runs.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Watch the settings document until Ctrl-C.
///
/// Sync failures are logged and the watcher keeps running.
pub async fn watch_settings(layout: InstallLayout) -> Result<(), LifecycleError> {
    watch_settings_until(layout, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "ctrl-c handler failed");
        }
    })
    .await
}

/// Watch the settings document until `shutdown` resolves.
///
/// A burst of events collapses into one sync that runs once the document has
/// been quiet for [`DEBOUNCE_WINDOW`], so the last write of the burst is what
/// reaches the store. A sync still pending at shutdown runs before returning.
pub async fn watch_settings_until<F>(layout: InstallLayout, shutdown: F) -> Result<(), LifecycleError>
where
    F: Future<Output = ()>,
{
    let state = layout.state_dir();
    fs::create_dir_all(&state).map_err(|e| io_err(&state, e))?;
    let state = fs::canonicalize(&state).unwrap_or(state);
    let settings = state.join(tipi_core::layout::SETTINGS_FILE);
    let env_file = layout.env_file();

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    watcher.watch(&state, RecursiveMode::NonRecursive)?;
    tracing::info!(path = %settings.display(), "watching settings");

    tokio::pin!(shutdown);
    let mut debounce = Debounce::new(DEBOUNCE_WINDOW);

    loop {
        let deadline = debounce.deadline();
        tokio::select! {
            _ = &mut shutdown => {
                if debounce.take_pending() {
                    run_sync(settings.clone(), env_file.clone()).await;
                }
                tracing::info!("settings watcher stopping");
                break;
            }
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if debounce.take_due(Instant::now()) {
                    run_sync(settings.clone(), env_file.clone()).await;
                }
            }
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if is_relevant_event_kind(&event.kind) && event.paths.iter().any(|p| *p == settings) {
                    debounce.record(Instant::now());
                }
            }
        }
    }

    Ok(())
}

async fn run_sync(settings: PathBuf, env_file: PathBuf) {
    let joined = tokio::task::spawn_blocking(move || sync_settings_to_env(&settings, &env_file)).await;
    match joined {
        Ok(Ok(outcome)) => tracing::info!(
            updated = outcome.updated.len(),
            skipped = outcome.skipped_missing.len(),
            rejected = outcome.rejected.len(),
            "watcher-triggered settings sync completed",
        ),
        Ok(Err(err)) => tracing::error!(error = %err, "watcher-triggered settings sync failed"),
        Err(err) => tracing::error!(error = %err, "settings sync task panicked"),
    }
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

// ---------------------------------------------------------------------------
// Trailing-edge debounce
// ---------------------------------------------------------------------------

/// Each recorded event pushes the deadline out by one window.
#[derive(Debug)]
struct Debounce {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debounce {
    fn new(window: Duration) -> Self {
        Self { window, deadline: None }
    }

    fn record(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True once if the quiet period has elapsed.
    fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    fn take_pending(&mut self) -> bool {
        self.deadline.take().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};
    use tokio::time::advance;

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn burst_fires_once_after_last_event() {
        let mut debounce = Debounce::new(DEBOUNCE_WINDOW);
        let mut fired = 0usize;

        for _ in 0..5 {
            debounce.record(Instant::now());
            advance(Duration::from_millis(150)).await;
            if debounce.take_due(Instant::now()) {
                fired += 1;
            }
        }
        assert_eq!(fired, 0, "nothing fires while events keep arriving");

        advance(Duration::from_millis(349)).await;
        assert!(!debounce.take_due(Instant::now()));
        advance(Duration::from_millis(1)).await;
        assert!(debounce.take_due(Instant::now()));
        assert!(!debounce.take_due(Instant::now()), "fires once per burst");
        assert!(debounce.deadline().is_none());
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn pending_event_is_flushed_on_shutdown() {
        let mut debounce = Debounce::new(DEBOUNCE_WINDOW);
        assert!(!debounce.take_pending());
        debounce.record(Instant::now());
        assert!(debounce.take_pending());
        assert!(!debounce.take_pending());
    }

    #[test]
    fn only_writes_trigger_sync() {
        assert!(is_relevant_event_kind(&EventKind::Create(CreateKind::File)));
        assert!(is_relevant_event_kind(&EventKind::Modify(ModifyKind::Any)));
        assert!(!is_relevant_event_kind(&EventKind::Access(AccessKind::Any)));
    }
}
