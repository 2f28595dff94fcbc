use std::time::Duration;

use chrono::{DateTime, Utc};

use wattvakt_config::{RuleConfig, StalenessConfig};
use wattvakt_core::model::{Comparator, Severity, Snapshot, Unit, STALENESS_METRIC};
use wattvakt_core::time::to_delta;

use crate::format::{format_duration, format_value};

#[derive(Debug, Clone, PartialEq)]
pub enum RuleKind {
    Threshold {
        metric: String,
        comparator: Comparator,
        threshold: f64,
        critical: Option<f64>,
        unit: Unit,
    },
    /// Fires when the newest snapshot with any data is older than `window`.
    Staleness { window: Duration },
}

/// Outcome of checking one rule against the data available this cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// The metric is absent; no decision can be made.
    Unknown,
    Clear,
    Breached {
        value: Option<f64>,
        severity: Severity,
        message: String,
    },
}

impl Condition {
    pub fn as_breach(&self) -> Option<bool> {
        match self {
            Condition::Unknown => None,
            Condition::Clear => Some(false),
            Condition::Breached { .. } => Some(true),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRule {
    pub id: String,
    pub kind: RuleKind,
    pub cooldown: Duration,
    pub severity: Severity,
}

impl CompiledRule {
    pub fn from_config(rule: &RuleConfig) -> Self {
        Self {
            id: rule.id.clone(),
            kind: RuleKind::Threshold {
                metric: rule.metric.clone(),
                comparator: rule.comparator,
                threshold: rule.threshold,
                critical: rule.critical,
                unit: rule.unit,
            },
            cooldown: rule.cooldown(),
            severity: rule.severity,
        }
    }

    pub fn staleness(config: &StalenessConfig) -> Self {
        Self {
            id: STALENESS_METRIC.to_string(),
            kind: RuleKind::Staleness {
                window: config.window(),
            },
            cooldown: config.cooldown(),
            severity: config.severity,
        }
    }

    pub fn threshold(&self) -> Option<f64> {
        match self.kind {
            RuleKind::Threshold { threshold, .. } => Some(threshold),
            RuleKind::Staleness { .. } => None,
        }
    }

    /// Threshold rules look only at `snapshot`. Staleness looks only at the
    /// age of `last_data`, whatever its values.
    pub fn condition(
        &self,
        site_name: &str,
        snapshot: Option<&Snapshot>,
        last_data: Option<&Snapshot>,
        now: DateTime<Utc>,
    ) -> Condition {
        match &self.kind {
            RuleKind::Threshold {
                metric,
                comparator,
                threshold,
                critical,
                unit,
            } => {
                let Some(value) = snapshot.and_then(|s| s.metric(metric)) else {
                    return Condition::Unknown;
                };
                if !comparator.breaches(value, *threshold) {
                    return Condition::Clear;
                }
                let is_critical = critical.is_some_and(|c| comparator.breaches(value, c));
                let severity = if is_critical {
                    Severity::Critical
                } else {
                    self.severity
                };
                let limit = if is_critical {
                    critical.unwrap_or(*threshold)
                } else {
                    *threshold
                };
                let message = format!(
                    "{site_name}: {metric} is {} ({} {}){}",
                    format_value(value, *unit),
                    comparator.symbol(),
                    format_value(limit, *unit),
                    if is_critical { " CRITICAL" } else { "" },
                );
                Condition::Breached {
                    value: Some(value),
                    severity,
                    message,
                }
            }
            RuleKind::Staleness { window } => match last_data {
                None => Condition::Breached {
                    value: None,
                    severity: self.severity,
                    message: format!("{site_name}: offline, no data received yet"),
                },
                Some(last) => {
                    let age = last.age(now);
                    if age <= to_delta(*window) {
                        return Condition::Clear;
                    }
                    let age = age.to_std().unwrap_or_default();
                    Condition::Breached {
                        value: Some(age.as_secs() as f64),
                        severity: self.severity,
                        message: format!(
                            "{site_name}: offline, no data for {} (last at {})",
                            format_duration(age),
                            last.taken_at.format("%Y-%m-%d %H:%M UTC"),
                        ),
                    }
                }
            },
        }
    }
}
