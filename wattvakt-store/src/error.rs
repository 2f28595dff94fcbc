use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Snapshot for '{site_id}' at {attempted} is not newer than the latest at {latest}")]
    NotMonotonic {
        site_id: String,
        latest: DateTime<Utc>,
        attempted: DateTime<Utc>,
    },

    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
