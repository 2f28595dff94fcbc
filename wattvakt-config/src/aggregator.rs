//! Source timeouts and per-metric merge rules.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use wattvakt_core::model::{MergeStrategy, Validity};

/// Aggregator configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct AggregatorConfig {
    /// Default deadline for a single collector call.
    #[validate(range(min = 1, max = 600))]
    #[serde(default = "default_source_timeout")]
    pub source_timeout_secs: u64,

    /// Fallback chains keyed by canonical metric name.
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricMergeConfig>,
}

fn default_source_timeout() -> u64 {
    10
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            source_timeout_secs: default_source_timeout(),
            metrics: BTreeMap::new(),
        }
    }
}

impl AggregatorConfig {
    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }
}

/// How one canonical metric is filled from the site's sources.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MetricMergeConfig {
    /// Candidate sources, most preferred first.
    pub chain: Vec<String>,

    #[serde(default)]
    pub validity: Validity,

    #[serde(default)]
    pub strategy: MergeStrategy,
}
