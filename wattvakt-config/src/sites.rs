//! Monitored sites and the sources configured for each.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct SiteConfig {
    #[validate(custom(function = validation::validate_identifier))]
    pub id: String,

    /// Display name; falls back to the id.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Sources in precedence order. The order doubles as the fallback chain for
    /// metrics without an explicit chain.
    #[validate(nested)]
    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// Ids of the alert rules that apply to this site.
    #[serde(default)]
    pub rules: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl SiteConfig {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct SourceConfig {
    #[validate(custom(function = validation::validate_identifier))]
    pub name: String,

    /// Registry key of the collector implementation.
    #[validate(custom(function = validation::validate_identifier))]
    pub kind: String,

    /// Overrides the aggregator's default source timeout.
    #[validate(range(min = 1, max = 600))]
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Collector-specific settings, passed through untouched.
    #[serde(default)]
    pub settings: BTreeMap<String, serde_json::Value>,
}

impl SourceConfig {
    pub fn timeout(&self, default: Duration) -> Duration {
        self.timeout_secs.map(Duration::from_secs).unwrap_or(default)
    }
}
