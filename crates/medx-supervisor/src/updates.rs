//! # Update-Marker Watcher
//!
//! The external updater replaces files under the resources root and leaves
//! marker files behind. This watcher waits for it to finish, then brings
//! the shell back up.
//!
//! ## Marker Sequencing
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  every 900 ms:                                                          │
//! │                                                                         │
//! │  ._update_in_progress present ──────────────► keep waiting              │
//! │            │ gone                                                       │
//! │            ▼                                                            │
//! │  ._update_failed present? ──yes──► log failure ─┐                       │
//! │  ._update_done   present? ──yes──► success ─────┤                       │
//! │                                                 ▼                       │
//! │                               restart services                          │
//! │                               remove _update_tmp/, update.zip           │
//! │                               prune _update_backup/* (keep newest N)    │
//! │                               delete all three markers                  │
//! │                               reload main window (once)                 │
//! │                               stop polling                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Deletions retry with exponential backoff; the updater or an antivirus
//! scanner may hold the files for a moment.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::UpdateSettings;
use crate::error::{SupervisorError, SupervisorResult};
use crate::events::{ShellEvent, ShellEvents};

pub const IN_PROGRESS_MARKER: &str = "._update_in_progress";
pub const DONE_MARKER: &str = "._update_done";
pub const FAILED_MARKER: &str = "._update_failed";

/// Staging folder the updater unpacks into.
pub const UPDATE_TMP_DIR: &str = "_update_tmp";

/// Downloaded update archive.
pub const UPDATE_ARCHIVE: &str = "update.zip";

/// Folder holding one backup folder per update.
pub const BACKUP_DIR: &str = "_update_backup";

// =============================================================================
// Markers
// =============================================================================

/// Which markers exist right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateMarkers {
    pub in_progress: bool,
    pub done: bool,
    pub failed: bool,
}

impl UpdateMarkers {
    /// Checks the three marker files without blocking the runtime.
    pub async fn scan(resources_dir: &Path) -> Self {
        UpdateMarkers {
            in_progress: marker_exists(resources_dir, IN_PROGRESS_MARKER).await,
            done: marker_exists(resources_dir, DONE_MARKER).await,
            failed: marker_exists(resources_dir, FAILED_MARKER).await,
        }
    }

    pub fn any(&self) -> bool {
        self.in_progress || self.done || self.failed
    }
}

/// An unreadable resources dir counts as no marker.
async fn marker_exists(resources_dir: &Path, name: &str) -> bool {
    tokio::fs::try_exists(resources_dir.join(name))
        .await
        .unwrap_or(false)
}

/// How a finished update ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Succeeded,
    Failed,
    /// All markers vanished before the watcher saw a terminal one.
    NoMarkers,
}

/// Result of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Waiting,
    Finished(UpdateOutcome),
}

/// Something that can bring the services back after an update.
#[async_trait]
pub trait ServiceRestarter: Send + Sync {
    async fn restart_services(&self) -> SupervisorResult<()>;
}

// =============================================================================
// Watcher
// =============================================================================

/// Polls the update markers; at most one polling task runs at a time.
#[derive(Clone)]
pub struct UpdateWatcher {
    inner: Arc<WatcherInner>,
}

struct WatcherInner {
    resources_dir: PathBuf,
    settings: UpdateSettings,
    restarter: Arc<dyn ServiceRestarter>,
    events: Arc<dyn ShellEvents>,
    running: AtomicBool,
}

impl UpdateWatcher {
    pub fn new(
        resources_dir: PathBuf,
        settings: UpdateSettings,
        restarter: Arc<dyn ServiceRestarter>,
        events: Arc<dyn ShellEvents>,
    ) -> Self {
        UpdateWatcher {
            inner: Arc::new(WatcherInner {
                resources_dir,
                settings,
                restarter,
                events,
                running: AtomicBool::new(false),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Spawns the polling task. Returns false if one is already running.
    pub fn ensure_running(&self) -> bool {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            debug!("Update watcher already running");
            return false;
        }

        info!(dir = ?self.inner.resources_dir, "Update watcher started");
        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.run().await;
            inner.running.store(false, Ordering::SeqCst);
            info!("Update watcher stopped");
        });
        true
    }

    /// Runs a single poll iteration.
    pub async fn poll_once(&self) -> PollOutcome {
        self.inner.poll_once().await
    }
}

impl WatcherInner {
    async fn run(&self) {
        let mut ticker = tokio::time::interval(self.settings.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let PollOutcome::Finished(outcome) = self.poll_once().await {
                debug!(?outcome, "Update handled");
                break;
            }
        }
    }

    async fn poll_once(&self) -> PollOutcome {
        let markers = UpdateMarkers::scan(&self.resources_dir).await;
        if markers.in_progress {
            return PollOutcome::Waiting;
        }

        let outcome = if markers.failed {
            warn!("External update reported failure");
            UpdateOutcome::Failed
        } else if markers.done {
            info!("External update finished");
            UpdateOutcome::Succeeded
        } else {
            debug!("Update markers gone without a result");
            UpdateOutcome::NoMarkers
        };

        if let Err(e) = self.restarter.restart_services().await {
            warn!(error = %e, "Restarting services after update failed");
        }

        if outcome != UpdateOutcome::NoMarkers {
            cleanup_update_artifacts(&self.resources_dir, &self.settings).await;
            remove_markers(&self.resources_dir, &self.settings).await;
            self.events.emit(ShellEvent::UpdateFinished {
                success: outcome == UpdateOutcome::Succeeded,
            });
            self.events.emit(ShellEvent::ReloadMainWindow);
        }

        PollOutcome::Finished(outcome)
    }
}

// =============================================================================
// Cleanup
// =============================================================================

/// Removes the staging folder and archive, then prunes old backups.
/// Failures are logged.
pub async fn cleanup_update_artifacts(resources_dir: &Path, settings: &UpdateSettings) {
    for name in [UPDATE_TMP_DIR, UPDATE_ARCHIVE] {
        let path = resources_dir.join(name);
        match remove_with_retry(&path, settings).await {
            Ok(true) => debug!(?path, "Removed update artifact"),
            Ok(false) => {}
            Err(e) => warn!(?path, error = %e, "Could not remove update artifact"),
        }
    }

    match prune_backups(resources_dir, settings).await {
        Ok(removed) if !removed.is_empty() => {
            info!(count = removed.len(), "Pruned old update backups")
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Could not prune update backups"),
    }
}

/// Deletes every marker file. Failures are logged.
pub async fn remove_markers(resources_dir: &Path, settings: &UpdateSettings) {
    for marker in [IN_PROGRESS_MARKER, DONE_MARKER, FAILED_MARKER] {
        let path = resources_dir.join(marker);
        if let Err(e) = remove_with_retry(&path, settings).await {
            warn!(?path, error = %e, "Could not remove update marker");
        }
    }
}

/// Keeps the newest `backups_keep` folders of `_update_backup` by mtime
/// and deletes the rest. Returns the deleted paths.
pub async fn prune_backups(
    resources_dir: &Path,
    settings: &UpdateSettings,
) -> SupervisorResult<Vec<PathBuf>> {
    let root = resources_dir.join(BACKUP_DIR);
    let mut entries = match tokio::fs::read_dir(&root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut backups: Vec<(SystemTime, PathBuf)> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let meta = entry.metadata().await?;
        if meta.is_dir() {
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            backups.push((modified, entry.path()));
        }
    }

    backups.sort_by(|a, b| b.0.cmp(&a.0));

    let mut removed = Vec::new();
    for (_, path) in backups.into_iter().skip(settings.backups_keep) {
        match remove_with_retry(&path, settings).await {
            Ok(_) => removed.push(path),
            Err(e) => warn!(?path, error = %e, "Could not remove backup"),
        }
    }
    Ok(removed)
}

/// Deletes a file or folder, retrying with exponential backoff.
///
/// Returns `Ok(false)` if there was nothing to delete.
pub async fn remove_with_retry(path: &Path, settings: &UpdateSettings) -> SupervisorResult<bool> {
    let max_interval = Duration::from_millis(settings.delete_max_backoff_ms);
    let mut backoff = ExponentialBackoff {
        initial_interval: Duration::from_millis(settings.delete_initial_backoff_ms),
        max_interval,
        max_elapsed_time: None,
        ..Default::default()
    };

    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match remove_path(path).await {
            Ok(removed) => return Ok(removed),
            Err(e) if attempt >= settings.delete_attempts => {
                return Err(SupervisorError::Io(format!(
                    "{} after {} attempts: {}",
                    path.display(),
                    attempt,
                    e
                )));
            }
            Err(e) => {
                let delay = backoff.next_backoff().unwrap_or(max_interval);
                debug!(?path, attempt, ?delay, error = %e, "Delete failed, retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn remove_path(path: &Path) -> std::io::Result<bool> {
    let meta = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if meta.is_dir() {
        tokio::fs::remove_dir_all(path).await?;
    } else {
        tokio::fs::remove_file(path).await?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingRestarter, RecordingEvents};

    fn settings() -> UpdateSettings {
        UpdateSettings {
            poll_interval_ms: 10,
            delete_attempts: 3,
            delete_initial_backoff_ms: 1,
            delete_max_backoff_ms: 5,
            ..Default::default()
        }
    }

    fn touch(path: &Path) {
        std::fs::write(path, b"").unwrap();
    }

    fn watcher(
        dir: &Path,
    ) -> (UpdateWatcher, Arc<CountingRestarter>, Arc<RecordingEvents>) {
        let restarter = Arc::new(CountingRestarter::default());
        let events = Arc::new(RecordingEvents::default());
        let watcher = UpdateWatcher::new(
            dir.to_path_buf(),
            settings(),
            restarter.clone(),
            events.clone(),
        );
        (watcher, restarter, events)
    }

    fn reloads(events: &RecordingEvents) -> usize {
        events
            .all()
            .iter()
            .filter(|e| matches!(e, ShellEvent::ReloadMainWindow))
            .count()
    }

    #[tokio::test]
    async fn test_scan_reports_each_marker() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(UpdateMarkers::scan(dir.path()).await, UpdateMarkers::default());

        touch(&dir.path().join(FAILED_MARKER));
        let markers = UpdateMarkers::scan(dir.path()).await;
        assert!(markers.failed && !markers.done && !markers.in_progress);
        assert!(markers.any());

        let missing = dir.path().join("gone");
        assert!(!UpdateMarkers::scan(&missing).await.any());
    }

    #[tokio::test]
    async fn test_waits_while_in_progress() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join(IN_PROGRESS_MARKER));
        touch(&dir.path().join(DONE_MARKER));
        let (watcher, restarter, events) = watcher(dir.path());

        assert_eq!(watcher.poll_once().await, PollOutcome::Waiting);
        assert_eq!(restarter.count(), 0);
        assert!(events.all().is_empty());
    }

    #[tokio::test]
    async fn test_done_restarts_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join(DONE_MARKER));
        std::fs::create_dir_all(root.join(UPDATE_TMP_DIR).join("nested")).unwrap();
        touch(&root.join(UPDATE_TMP_DIR).join("nested").join("file.bin"));
        touch(&root.join(UPDATE_ARCHIVE));
        let (watcher, restarter, events) = watcher(root);

        assert_eq!(
            watcher.poll_once().await,
            PollOutcome::Finished(UpdateOutcome::Succeeded)
        );
        assert_eq!(restarter.count(), 1);
        assert!(!UpdateMarkers::scan(root).await.any());
        assert!(!root.join(UPDATE_TMP_DIR).exists());
        assert!(!root.join(UPDATE_ARCHIVE).exists());
        assert_eq!(reloads(&events), 1);
        assert!(events
            .all()
            .contains(&ShellEvent::UpdateFinished { success: true }));
    }

    #[tokio::test]
    async fn test_failed_marker_wins() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join(DONE_MARKER));
        touch(&dir.path().join(FAILED_MARKER));
        let (watcher, restarter, events) = watcher(dir.path());

        assert_eq!(
            watcher.poll_once().await,
            PollOutcome::Finished(UpdateOutcome::Failed)
        );
        assert_eq!(restarter.count(), 1);
        assert!(!UpdateMarkers::scan(dir.path()).await.any());
        assert!(events
            .all()
            .contains(&ShellEvent::UpdateFinished { success: false }));
    }

    #[tokio::test]
    async fn test_watcher_runs_once_and_reloads_once() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        touch(&root.join(IN_PROGRESS_MARKER));
        touch(&root.join(DONE_MARKER));
        let (watcher, restarter, events) = watcher(&root);

        assert!(watcher.ensure_running());
        assert!(!watcher.ensure_running());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(restarter.count(), 0);
        std::fs::remove_file(root.join(IN_PROGRESS_MARKER)).unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while watcher.is_running() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(restarter.count(), 1);
        assert_eq!(reloads(&events), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_prune_keeps_newest_backups() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join(BACKUP_DIR);
        let base = SystemTime::now() - Duration::from_secs(3_600);

        for (i, name) in ["b-oldest", "b-middle", "b-newer", "b-newest"].iter().enumerate() {
            let path = root.join(name);
            std::fs::create_dir_all(path.join("app")).unwrap();
            std::fs::File::open(&path)
                .unwrap()
                .set_modified(base + Duration::from_secs(60 * i as u64))
                .unwrap();
        }

        let removed = prune_backups(dir.path(), &settings()).await.unwrap();

        let mut removed: Vec<_> = removed
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        removed.sort();
        assert_eq!(removed, vec!["b-middle", "b-oldest"]);
        assert!(root.join("b-newest").exists());
        assert!(root.join("b-newer").exists());
    }

    #[tokio::test]
    async fn test_remove_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let removed = remove_with_retry(&dir.path().join("nothing"), &settings())
            .await
            .unwrap();
        assert!(!removed);
        assert!(prune_backups(dir.path(), &settings()).await.unwrap().is_empty());
    }
}
