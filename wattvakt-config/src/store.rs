//! Snapshot persistence backend.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Process memory only; history is lost on restart.
    Memory,
    /// Append-only JSON-lines journal under `path`.
    #[default]
    Journal,
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Directory holding the journal files.
    #[serde(default = "default_path")]
    pub path: PathBuf,

    /// Save alert cooldown state after each evaluation and restore it on start.
    #[serde(default = "default_true")]
    pub checkpoint_alerts: bool,
}

fn default_path() -> PathBuf {
    PathBuf::from("data")
}

fn default_true() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_path(),
            checkpoint_alerts: true,
        }
    }
}
