//! # wattvakt-store
//!
//! Append-only snapshot history keyed by (site, timestamp), with an O(1)
//! "latest" slot per site that is swapped in one step after a commit has fully
//! succeeded. Readers either see the previous snapshot or the new one, never
//! part of either.
//!
//! The store also keeps the alert history and the alert engine's cooldown
//! checkpoint.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use wattvakt_config::{StoreBackend, StoreConfig};
use wattvakt_core::model::{AlertRecord, AlertStateEntry, Snapshot};

mod error;
mod index;
mod journal;
mod memory;

pub use error::StoreError;
pub use journal::JournalStore;
pub use memory::MemoryStore;

/// Snapshot persistence and the read-only query API.
///
/// Commits are serialized inside the store; reads never wait for a commit's
/// I/O.
pub trait SnapshotStore: Send + Sync {
    /// Appends `snapshot` and makes it the site's latest. All or nothing: on
    /// error the previous latest stays visible.
    fn commit(&self, snapshot: Snapshot) -> Result<Arc<Snapshot>, StoreError>;

    fn get_latest(&self, site_id: &str) -> Option<Arc<Snapshot>>;

    /// Newest committed snapshot holding at least one metric. Snapshots of
    /// cycles where every source failed are skipped.
    fn latest_with_data(&self, site_id: &str) -> Option<Arc<Snapshot>>;

    /// Snapshots with `start <= taken_at <= end`, oldest first.
    fn get_range(&self, site_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Snapshot>;

    /// Sites with at least one committed snapshot.
    fn sites(&self) -> Vec<String>;

    fn record_alert(&self, record: AlertRecord) -> Result<(), StoreError>;

    /// Alerts fired at or after `since`, oldest first.
    fn recent_alerts(&self, since: DateTime<Utc>) -> Vec<AlertRecord>;

    fn save_alert_states(&self, states: &[AlertStateEntry]) -> Result<(), StoreError>;

    fn load_alert_states(&self) -> Result<Vec<AlertStateEntry>, StoreError>;
}

/// Opens the backend selected in `config`.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn SnapshotStore>, StoreError> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Journal => Ok(Arc::new(JournalStore::open(&config.path)?)),
    }
}
