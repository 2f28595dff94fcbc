//! Durable backend: JSON-lines journals replayed into the shared index on open.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use wattvakt_core::model::{AlertRecord, AlertStateEntry, Snapshot};

use crate::index::SeriesIndex;
use crate::{SnapshotStore, StoreError};

const SNAPSHOTS_FILE: &str = "snapshots.jsonl";
const ALERTS_FILE: &str = "alerts.jsonl";
const ALERT_STATE_FILE: &str = "alert_state.json";

/// Snapshot and alert journals under one directory.
///
/// A snapshot becomes visible only after its journal line has been written
/// and synced. A failed append is truncated away so a replay never sees it.
pub struct JournalStore {
    dir: PathBuf,
    index: SeriesIndex,
    snapshots: Mutex<File>,
    alerts: Mutex<File>,
    checkpoint: Mutex<()>,
}

impl JournalStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let index = SeriesIndex::default();
        let snapshots_path = dir.join(SNAPSHOTS_FILE);
        let alerts_path = dir.join(ALERTS_FILE);

        let mut replayed = 0usize;
        for snapshot in replay::<Snapshot>(&snapshots_path)? {
            match index.check_append(&snapshot) {
                Ok(()) => {
                    index.append(snapshot);
                    replayed += 1;
                }
                Err(e) => warn!(error = %e, "Skipping out-of-order journal entry"),
            }
        }
        for record in replay::<AlertRecord>(&alerts_path)? {
            index.push_alert(record);
        }
        info!(dir = %dir.display(), snapshots = replayed, "Opened snapshot journal");

        Ok(Self {
            snapshots: Mutex::new(open_append(&snapshots_path)?),
            alerts: Mutex::new(open_append(&alerts_path)?),
            checkpoint: Mutex::new(()),
            dir,
            index,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SnapshotStore for JournalStore {
    fn commit(&self, snapshot: Snapshot) -> Result<Arc<Snapshot>, StoreError> {
        let mut file = self.snapshots.lock();
        self.index.check_append(&snapshot)?;
        append_line(&mut file, &snapshot)?;
        debug!(site = %snapshot.site_id, taken_at = %snapshot.taken_at, "Committed snapshot");
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
        let mut file = self.alerts.lock();
        append_line(&mut file, &record)?;
        self.index.push_alert(record);
        Ok(())
    }

    fn recent_alerts(&self, since: DateTime<Utc>) -> Vec<AlertRecord> {
        self.index.alerts_since(since)
    }

    fn save_alert_states(&self, states: &[AlertStateEntry]) -> Result<(), StoreError> {
        let path = self.dir.join(ALERT_STATE_FILE);
        let tmp = path.with_extension("json.tmp");
        // One writer at a time; the temp file path is shared.
        let _checkpoint = self.checkpoint.lock();
        {
            let mut file = File::create(&tmp)?;
            serde_json::to_writer(&mut file, states)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn load_alert_states(&self) -> Result<Vec<AlertStateEntry>, StoreError> {
        let path = self.dir.join(ALERT_STATE_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

fn open_append(path: &Path) -> Result<File, StoreError> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Writes one JSON line. On failure the file is cut back to its previous length.
fn append_line<T: Serialize>(file: &mut File, value: &T) -> Result<(), StoreError> {
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');

    let len = file.metadata()?.len();
    let written = file.write_all(&line).and_then(|_| file.sync_data());
    if let Err(e) = written {
        if let Err(truncate) = file.set_len(len) {
            warn!(error = %truncate, "Failed to roll back partial journal write");
        }
        return Err(e.into());
    }
    Ok(())
}

/// Reads every well-formed line. Torn or corrupt lines are skipped.
fn replay<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(
                file = %path.display(),
                line = number + 1,
                error = %e,
                "Skipping malformed journal line"
            ),
        }
    }
    Ok(entries)
}
