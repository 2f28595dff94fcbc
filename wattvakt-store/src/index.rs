//! In-memory series shared by every backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use wattvakt_core::model::{AlertRecord, Snapshot};

use crate::StoreError;

#[derive(Default)]
pub(crate) struct SeriesIndex {
    history: RwLock<HashMap<String, BTreeMap<DateTime<Utc>, Arc<Snapshot>>>>,
    latest: RwLock<HashMap<String, Arc<Snapshot>>>,
    /// Newest snapshot per site that carried at least one metric.
    with_data: RwLock<HashMap<String, Arc<Snapshot>>>,
    alerts: RwLock<Vec<AlertRecord>>,
}

impl SeriesIndex {
    /// Snapshots must move forward in time per site.
    pub(crate) fn check_append(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        match self.latest.read().get(&snapshot.site_id) {
            Some(latest) if snapshot.taken_at <= latest.taken_at => Err(StoreError::NotMonotonic {
                site_id: snapshot.site_id.clone(),
                latest: latest.taken_at,
                attempted: snapshot.taken_at,
            }),
            _ => Ok(()),
        }
    }

    /// Publishes a snapshot whose durable write already succeeded.
    pub(crate) fn append(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        self.history
            .write()
            .entry(snapshot.site_id.clone())
            .or_default()
            .insert(snapshot.taken_at, snapshot.clone());
        // Single pointer swap; readers hold either the old Arc or the new one.
        self.latest
            .write()
            .insert(snapshot.site_id.clone(), snapshot.clone());
        if !snapshot.is_empty() {
            self.with_data
                .write()
                .insert(snapshot.site_id.clone(), snapshot.clone());
        }
        snapshot
    }

    pub(crate) fn latest(&self, site_id: &str) -> Option<Arc<Snapshot>> {
        self.latest.read().get(site_id).cloned()
    }

    pub(crate) fn latest_with_data(&self, site_id: &str) -> Option<Arc<Snapshot>> {
        self.with_data.read().get(site_id).cloned()
    }

    pub(crate) fn range(
        &self,
        site_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<Snapshot> {
        if start > end {
            return Vec::new();
        }
        self.history
            .read()
            .get(site_id)
            .map(|series| {
                series
                    .range(start..=end)
                    .map(|(_, s)| Snapshot::clone(s))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn sites(&self) -> Vec<String> {
        let mut sites: Vec<String> = self.latest.read().keys().cloned().collect();
        sites.sort_unstable();
        sites
    }

    pub(crate) fn push_alert(&self, record: AlertRecord) {
        self.alerts.write().push(record);
    }

    pub(crate) fn alerts_since(&self, since: DateTime<Utc>) -> Vec<AlertRecord> {
        let mut alerts: Vec<AlertRecord> = self
            .alerts
            .read()
            .iter()
            .filter(|a| a.fired_at >= since)
            .cloned()
            .collect();
        alerts.sort_by_key(|a| a.fired_at);
        alerts
    }
}
