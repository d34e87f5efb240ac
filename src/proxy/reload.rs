//! Reload broadcasting.
//!
//! The hub is the only state shared between the file watcher and the proxy:
//! the watcher calls [`ReloadSink::broadcast_reload`], every connected
//! browser receives a [`ReloadMessage`].

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::observability::metrics;

/// Messages buffered per client before a slow client starts lagging.
const CHANNEL_CAPACITY: usize = 16;

/// Anything that can be told "files changed, reload the browsers".
pub trait ReloadSink: Send + Sync + 'static {
    /// Called once per reload trigger with the path that caused it.
    /// Returns how many browser clients were reached.
    fn broadcast_reload(&self, cause: &Path) -> usize;
}

/// Message pushed to browser clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReloadMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Changed path, for display in the browser console.
    pub path: String,
}

impl ReloadMessage {
    pub fn reload(cause: &Path) -> Self {
        Self {
            kind: "reload",
            path: cause.display().to_string(),
        }
    }
}

/// Fan-out point for reload broadcasts.
#[derive(Clone)]
pub struct ReloadHub {
    tx: broadcast::Sender<ReloadMessage>,
    broadcasts: Arc<AtomicU64>,
}

impl ReloadHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            broadcasts: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Subscribe a browser client.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.tx.subscribe()
    }

    /// Total broadcasts since creation.
    pub fn broadcasts(&self) -> u64 {
        self.broadcasts.load(Ordering::Relaxed)
    }

    /// Currently connected clients.
    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ReloadSink for ReloadHub {
    fn broadcast_reload(&self, cause: &Path) -> usize {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        metrics::record_reload();

        // No subscribers is not an error: nobody has the page open yet.
        let reached = self.tx.send(ReloadMessage::reload(cause)).unwrap_or(0);
        tracing::info!(path = %cause.display(), clients = reached, "Reload broadcast");
        reached
    }
}
