//! Registry of live output channels for in-flight builds.
//!
//! One broadcast channel per running build, keyed by build ID. Entries
//! exist only while the build is executing: the job launcher registers the
//! channel before spawning the process and unregisters it after the
//! completion marker has been pushed and the log is fully flushed. Stream
//! readers that find no entry fall back to the persisted log.
//!
//! The registry is an explicitly owned object shared via `Arc` — there is
//! no process-global table, so tests can run independent registries side
//! by side.

use std::collections::HashMap;

use runforge_core::types::DbId;
use tokio::sync::{broadcast, RwLock};

/// Per-build broadcast buffer capacity.
///
/// A reader that falls more than this many lines behind observes
/// `RecvError::Lagged` and skips ahead; the persisted log remains complete.
const CHANNEL_CAPACITY: usize = 1024;

/// An event on a build's live output channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    /// One line of combined stdout/stderr output, without its trailing
    /// newline.
    Line(String),
    /// No further output will arrive. Always the last event sent.
    Done,
}

/// Shared, lock-protected map of build ID to live output channel.
pub struct OutputRegistry {
    channels: RwLock<HashMap<DbId, broadcast::Sender<BuildEvent>>>,
}

impl OutputRegistry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Create and register the output channel for a build.
    ///
    /// Returns the sender half for the launcher. A stale entry under the
    /// same ID (possible only if a previous launcher task failed to clean
    /// up) is replaced.
    pub async fn register(&self, build_id: DbId) -> broadcast::Sender<BuildEvent> {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        self.channels.write().await.insert(build_id, tx.clone());
        tx
    }

    /// Subscribe to a build's live output, if it is still in flight.
    ///
    /// The receiver observes every event sent after this call; earlier
    /// lines are only in the log.
    pub async fn subscribe(&self, build_id: DbId) -> Option<broadcast::Receiver<BuildEvent>> {
        self.channels
            .read()
            .await
            .get(&build_id)
            .map(|tx| tx.subscribe())
    }

    /// Remove a build's channel. Safe to call when none is registered.
    pub async fn unregister(&self, build_id: DbId) {
        self.channels.write().await.remove(&build_id);
    }

    /// Whether a live channel is currently registered for the build.
    pub async fn contains(&self, build_id: DbId) -> bool {
        self.channels.read().await.contains_key(&build_id)
    }

    /// Number of builds currently in flight.
    pub async fn count(&self) -> usize {
        self.channels.read().await.len()
    }
}

impl Default for OutputRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
