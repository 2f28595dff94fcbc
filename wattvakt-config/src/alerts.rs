//! Threshold rules, staleness window and cooldown behaviour.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use wattvakt_core::model::{Comparator, Severity, Unit};

use crate::validation;

/// What happens to a rule in cooldown when its condition clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryMode {
    /// Recovery ends the cooldown and re-arms the rule at once.
    #[default]
    Immediate,
    /// The cooldown always runs its full length.
    AfterCooldown,
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone, Default)]
pub struct AlertsConfig {
    #[serde(default)]
    pub recovery: RecoveryMode,

    #[validate(nested)]
    #[serde(default)]
    pub staleness: StalenessConfig,

    #[validate(nested)]
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// The per-site offline rule.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct StalenessConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum age of the latest snapshot before the site counts as offline.
    #[validate(range(min = 1))]
    #[serde(default = "default_window")]
    pub window_secs: u64,

    #[validate(range(min = 1))]
    #[serde(default = "default_staleness_cooldown")]
    pub cooldown_secs: u64,

    #[serde(default = "default_staleness_severity")]
    pub severity: Severity,
}

fn default_true() -> bool {
    true
}
fn default_window() -> u64 {
    30 * 60
}
fn default_staleness_cooldown() -> u64 {
    120 * 60
}
fn default_staleness_severity() -> Severity {
    Severity::High
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: default_window(),
            cooldown_secs: default_staleness_cooldown(),
            severity: default_staleness_severity(),
        }
    }
}

impl StalenessConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// A threshold rule on one canonical metric.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct RuleConfig {
    #[validate(custom(function = validation::validate_rule_id))]
    pub id: String,

    #[validate(custom(function = validation::validate_rule_metric))]
    pub metric: String,

    pub comparator: Comparator,

    pub threshold: f64,

    /// Second, more severe threshold in the same direction.
    #[serde(default)]
    pub critical: Option<f64>,

    #[validate(range(min = 1))]
    #[serde(default = "default_rule_cooldown")]
    pub cooldown_secs: u64,

    #[serde(default = "default_rule_severity")]
    pub severity: Severity,

    #[serde(default)]
    pub unit: Unit,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_rule_cooldown() -> u64 {
    60 * 60
}
fn default_rule_severity() -> Severity {
    Severity::Medium
}

impl RuleConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}
