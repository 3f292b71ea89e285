//! Registry of all transfers, keyed by item id.
//!
//! The registry is the single piece of mutable state shared across tasks.
//! Tasks publish whole snapshots through [`ProgressPublisher`], the one
//! registry-update path, so readers never observe a torn update across
//! fields. `start`, `cancel`, and `snapshot` never panic or error past
//! this boundary; all failure is reported through task state.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::sink::SinkCapabilities;
use super::speed_limit::SpeedLimitStore;
use super::task::{DownloadTask, LogNavigator, Navigator, TaskSnapshot};
use crate::session::ServerSession;

/// One registry slot: the latest published snapshot plus the handle that
/// cancels the owning task.
struct TaskEntry {
    snapshot: TaskSnapshot,
    cancel: CancellationToken,
}

/// A task's write handle into its registry slot. Publishing replaces the
/// snapshot wholesale; once the slot holds a terminal snapshot it is
/// immutable.
#[derive(Clone)]
pub(crate) struct ProgressPublisher {
    registry: Arc<DashMap<String, TaskEntry>>,
    item_id: String,
}

impl ProgressPublisher {
    pub(crate) fn publish(&self, snapshot: &TaskSnapshot) {
        if let Some(mut entry) = self.registry.get_mut(&self.item_id) {
            // Terminal states are final; nothing may overwrite them.
            if entry.snapshot.status.is_terminal() {
                return;
            }
            entry.snapshot = snapshot.clone();
        }
    }
}

/// Registry of all transfers; the UI-facing surface of the crate.
///
/// Cloning is cheap and all clones share the same registry.
#[derive(Clone)]
pub struct DownloadManager {
    session: ServerSession,
    speed_limit: Arc<SpeedLimitStore>,
    capabilities: SinkCapabilities,
    navigator: Arc<dyn Navigator>,
    registry: Arc<DashMap<String, TaskEntry>>,
}

impl std::fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadManager")
            .field("session", &self.session)
            .field("capabilities", &self.capabilities)
            .field("tracked", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl DownloadManager {
    /// Creates a manager over `session`, reading the rate cap from
    /// `speed_limit` at each task start and negotiating sinks from
    /// `capabilities`.
    #[must_use]
    pub fn new(
        session: ServerSession,
        speed_limit: Arc<SpeedLimitStore>,
        capabilities: SinkCapabilities,
    ) -> Self {
        Self {
            session,
            speed_limit,
            capabilities,
            navigator: Arc::new(LogNavigator),
            registry: Arc::new(DashMap::new()),
        }
    }

    /// Replaces the navigator used for one-time-token responses.
    #[must_use]
    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    /// Starts a transfer for `item_id`, returning immediately.
    ///
    /// A no-op returning `false` when a non-terminal task already occupies
    /// the slot; a terminal entry is a free slot and is replaced wholesale
    /// by the new task. The transfer itself runs detached; observe it via
    /// [`snapshot`](Self::snapshot).
    #[instrument(skip(self))]
    pub fn start(&self, item_id: &str, filename: &str) -> bool {
        let cancel = CancellationToken::new();
        let initial = TaskSnapshot::new(item_id, filename);

        match self.registry.entry(item_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().snapshot.status.is_terminal() {
                    debug!("transfer already active, ignoring start");
                    return false;
                }
                occupied.insert(TaskEntry {
                    snapshot: initial,
                    cancel: cancel.clone(),
                });
            }
            Entry::Vacant(vacant) => {
                vacant.insert(TaskEntry {
                    snapshot: initial,
                    cancel: cancel.clone(),
                });
            }
        }

        let limit_kbps = self.speed_limit.get();
        let task = DownloadTask {
            session: self.session.clone(),
            item_id: item_id.to_string(),
            filename: filename.to_string(),
            limit_kbps,
            sink: self.capabilities.negotiate(),
            navigator: Arc::clone(&self.navigator),
            cancel,
            publisher: ProgressPublisher {
                registry: Arc::clone(&self.registry),
                item_id: item_id.to_string(),
            },
        };
        info!(limit_kbps, "download started");
        tokio::spawn(task.run());
        true
    }

    /// Signals cancellation for `item_id`. A no-op for unknown ids and
    /// for tasks already in a terminal state; idempotent otherwise.
    #[instrument(skip(self))]
    pub fn cancel(&self, item_id: &str) {
        if let Some(entry) = self.registry.get(item_id) {
            if entry.snapshot.status.is_terminal() {
                return;
            }
            debug!("cancelling transfer");
            entry.cancel.cancel();
        }
    }

    /// Returns an immutable point-in-time view of every tracked task,
    /// safe to call concurrently with ongoing task mutation.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, TaskSnapshot> {
        self.registry
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot.clone()))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::download::task::DownloadStatus;
    use std::path::PathBuf;

    fn test_manager(dir: PathBuf) -> DownloadManager {
        let session = ServerSession::new("http://127.0.0.1:9", None).unwrap();
        let store = SpeedLimitStore::load(dir.join("speed_limit.json")).unwrap();
        DownloadManager::new(session, Arc::new(store), SinkCapabilities::direct(dir))
    }

    #[tokio::test]
    async fn test_cancel_unknown_item_is_a_noop() {
        let dir = tempfile::TempDir::new().unwrap();
        let manager = test_manager(dir.path().to_path_buf());
        manager.cancel("not-tracked");
        assert!(manager.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_is_empty_before_any_start() {
        let dir = tempfile::TempDir::new().unwrap();
        let manager = test_manager(dir.path().to_path_buf());
        assert!(manager.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_publisher_cannot_mutate_terminal_entry() {
        let dir = tempfile::TempDir::new().unwrap();
        let manager = test_manager(dir.path().to_path_buf());

        let mut terminal = TaskSnapshot::new("1", "game.zip");
        terminal.status = DownloadStatus::Completed;
        manager.registry.insert(
            "1".to_string(),
            TaskEntry {
                snapshot: terminal,
                cancel: CancellationToken::new(),
            },
        );

        let publisher = ProgressPublisher {
            registry: Arc::clone(&manager.registry),
            item_id: "1".to_string(),
        };
        let mut stale = TaskSnapshot::new("1", "game.zip");
        stale.received_bytes = 999;
        publisher.publish(&stale);

        let view = manager.snapshot();
        assert_eq!(view["1"].status, DownloadStatus::Completed);
        assert_eq!(view["1"].received_bytes, 0);
    }

    #[tokio::test]
    async fn test_start_on_terminal_slot_replaces_entry() {
        let dir = tempfile::TempDir::new().unwrap();
        let manager = test_manager(dir.path().to_path_buf());

        let mut terminal = TaskSnapshot::new("7", "old.zip");
        terminal.status = DownloadStatus::Error;
        terminal.error_message = Some("boom".to_string());
        manager.registry.insert(
            "7".to_string(),
            TaskEntry {
                snapshot: terminal,
                cancel: CancellationToken::new(),
            },
        );

        assert!(manager.start("7", "new.zip"));
        let view = manager.snapshot();
        assert_eq!(view["7"].filename, "new.zip");
    }
}
