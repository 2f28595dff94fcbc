use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::reading::ReadingStatus;
use crate::CoreError;

/// A merged value together with the source that supplied it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub value: f64,
    pub source: String,
}

/// A source that did not contribute to a snapshot, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: String,
    pub status: ReadingStatus,
    pub reason: Option<String>,
}

/// Canonical per-site reading set for one cycle.
///
/// A metric that no source could supply is absent from `metrics`; it is never
/// filled with zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub site_id: String,
    pub taken_at: DateTime<Utc>,
    pub metrics: BTreeMap<String, MetricValue>,
    #[serde(default)]
    pub failures: Vec<SourceFailure>,
}

impl Snapshot {
    pub fn new(site_id: impl Into<String>, taken_at: DateTime<Utc>) -> Self {
        Self {
            site_id: site_id.into(),
            taken_at,
            metrics: BTreeMap::new(),
            failures: Vec::new(),
        }
    }

    /// Records `value` for `metric` with its provenance.
    pub fn insert_metric(
        &mut self,
        metric: impl Into<String>,
        value: f64,
        source: impl Into<String>,
    ) -> Result<(), CoreError> {
        let metric = metric.into();
        if !value.is_finite() {
            return Err(CoreError::NonFiniteValue { metric });
        }
        self.metrics.insert(
            metric,
            MetricValue {
                value,
                source: source.into(),
            },
        );
        Ok(())
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).map(|m| m.value)
    }

    pub fn provenance(&self, name: &str) -> Option<&str> {
        self.metrics.get(name).map(|m| m.source.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Time elapsed since the snapshot was taken; negative if `now` is earlier.
    pub fn age(&self, now: DateTime<Utc>) -> TimeDelta {
        now - self.taken_at
    }
}
