use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use wattvakt_core::model::{AlertRecord, AlertStateEntry, Snapshot};

use crate::index::SeriesIndex;
use crate::{SnapshotStore, StoreError};

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    index: SeriesIndex,
    writer: Mutex<()>,
    checkpoint: Mutex<Vec<AlertStateEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemoryStore {
    fn commit(&self, snapshot: Snapshot) -> Result<Arc<Snapshot>, StoreError> {
        let _writer = self.writer.lock();
        self.index.check_append(&snapshot)?;
        debug!(site = %snapshot.site_id, taken_at = %snapshot.taken_at, "Committing snapshot");
        Ok(self.index.append(snapshot))
    }

    fn get_latest(&self, site_id: &str) -> Option<Arc<Snapshot>> {
        self.index.latest(site_id)
    }

    fn latest_with_data(&self, site_id: &str) -> Option<Arc<Snapshot>> {
        self.index.latest_with_data(site_id)
    }

    fn get_range(&self, site_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Snapshot> {
        self.index.range(site_id, start, end)
    }

    fn sites(&self) -> Vec<String> {
        self.index.sites()
    }

    fn record_alert(&self, record: AlertRecord) -> Result<(), StoreError> {
        self.index.push_alert(record);
        Ok(())
    }

    fn recent_alerts(&self, since: DateTime<Utc>) -> Vec<AlertRecord> {
        self.index.alerts_since(since)
    }

    fn save_alert_states(&self, states: &[AlertStateEntry]) -> Result<(), StoreError> {
        *self.checkpoint.lock() = states.to_vec();
        Ok(())
    }

    fn load_alert_states(&self) -> Result<Vec<AlertStateEntry>, StoreError> {
        Ok(self.checkpoint.lock().clone())
    }
}
