use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single collector invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingStatus {
    Ok,
    Error,
    Timeout,
}

impl ReadingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingStatus::Ok => "ok",
            ReadingStatus::Error => "error",
            ReadingStatus::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ReadingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one source reported for one site during one cycle.
///
/// Readings only live until the aggregator has merged them; they are never
/// persisted on their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReading {
    pub site_id: String,
    pub source: String,
    pub collected_at: DateTime<Utc>,
    pub status: ReadingStatus,
    pub fields: BTreeMap<String, f64>,
    pub error: Option<String>,
}

impl SourceReading {
    pub fn ok(
        site_id: impl Into<String>,
        source: impl Into<String>,
        collected_at: DateTime<Utc>,
        fields: BTreeMap<String, f64>,
    ) -> Self {
        Self {
            site_id: site_id.into(),
            source: source.into(),
            collected_at,
            status: ReadingStatus::Ok,
            fields,
            error: None,
        }
    }

    pub fn error(
        site_id: impl Into<String>,
        source: impl Into<String>,
        collected_at: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            site_id: site_id.into(),
            source: source.into(),
            collected_at,
            status: ReadingStatus::Error,
            fields: BTreeMap::new(),
            error: Some(reason.into()),
        }
    }

    pub fn timeout(
        site_id: impl Into<String>,
        source: impl Into<String>,
        collected_at: DateTime<Utc>,
        after: Duration,
    ) -> Self {
        Self {
            site_id: site_id.into(),
            source: source.into(),
            collected_at,
            status: ReadingStatus::Timeout,
            fields: BTreeMap::new(),
            error: Some(format!("no reading within {}ms", after.as_millis())),
        }
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        self.status == ReadingStatus::Ok
    }

    /// Value of `metric`, but only from a successful reading.
    pub fn value(&self, metric: &str) -> Option<f64> {
        if !self.is_ok() {
            return None;
        }
        self.fields.get(metric).copied()
    }
}
