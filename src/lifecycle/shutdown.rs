//! Stop signal for the background tasks of a session.
//!
//! The reload proxy and the file watcher each own one [`Shutdown`]. Their
//! handle keeps the sender; the spawned task (axum's graceful shutdown
//! future, the watcher's dispatch loop) holds a receiver taken before the
//! task is spawned. `ProxyHandle::stop` and `WatchHandle::stop` trigger it
//! and then wait for the task to finish.

use tokio::sync::broadcast;

/// One-shot stop signal shared between a handle and its task.
///
/// A trigger reaches only receivers that already exist, so subscribe
/// before spawning the task that listens.
#[derive(Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Receiver for a task that must stop when the handle says so.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Tell every subscribed task to stop. No-op when the task is gone.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
