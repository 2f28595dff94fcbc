//! Per-metric merge vocabulary.

use serde::{Deserialize, Serialize};

/// Predicate a candidate value must pass before it may fill a metric.
///
/// Non-finite values never pass, whatever the predicate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Validity {
    #[default]
    Any,
    Nonzero,
    Positive,
    NonNegative,
    Range {
        min: f64,
        max: f64,
    },
}

impl Validity {
    pub fn accepts(&self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        match *self {
            Validity::Any => true,
            Validity::Nonzero => value != 0.0,
            Validity::Positive => value > 0.0,
            Validity::NonNegative => value >= 0.0,
            Validity::Range { min, max } => value >= min && value <= max,
        }
    }
}

/// How the candidates of a fallback chain combine into one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// First valid candidate in chain order wins.
    #[default]
    FirstValid,
    /// All valid candidates are added together.
    Sum,
}

/// Display unit of a metric, used when formatting messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    #[default]
    None,
    Percent,
    Watts,
    Volts,
    Amps,
    Fahrenheit,
    Celsius,
}
