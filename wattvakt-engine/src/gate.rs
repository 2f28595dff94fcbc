//! Commit gate shared by the cycle runner and the scheduler.
//!
//! A commit holds the read side for its whole (synchronous) store write;
//! `close` takes the write side. Once `close` returns, no commit is in
//! progress and none can start. `close` therefore blocks for at most one
//! store write, fsync included.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;

use wattvakt_core::model::Snapshot;
use wattvakt_store::SnapshotStore;

use crate::EngineError;

pub struct CommitGate {
    closed: RwLock<bool>,
    signal: watch::Sender<bool>,
}

impl Default for CommitGate {
    fn default() -> Self {
        Self::new()
    }
}

impl CommitGate {
    pub fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            closed: RwLock::new(false),
            signal,
        }
    }

    pub fn commit(
        &self,
        store: &dyn SnapshotStore,
        snapshot: Snapshot,
    ) -> Result<Arc<Snapshot>, EngineError> {
        let closed = self.closed.read();
        if *closed {
            return Err(EngineError::Shutdown);
        }
        Ok(store.commit(snapshot)?)
    }

    /// Runs [`commit`](Self::commit) on the blocking pool so a durable
    /// store's fsync never stalls an async worker.
    pub async fn commit_blocking(
        self: &Arc<Self>,
        store: Arc<dyn SnapshotStore>,
        snapshot: Snapshot,
    ) -> Result<Arc<Snapshot>, EngineError> {
        let gate = self.clone();
        tokio::task::spawn_blocking(move || gate.commit(store.as_ref(), snapshot)).await?
    }

    pub fn close(&self) {
        *self.closed.write() = true;
        self.signal.send_replace(true);
    }

    pub fn open(&self) {
        *self.closed.write() = false;
        self.signal.send_replace(false);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.read()
    }

    /// Resolves once the gate is closed.
    pub async fn closed(&self) {
        let mut rx = self.signal.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}
