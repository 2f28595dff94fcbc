//! Collection cadence and lifecycle parameters.

use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

/// Scheduler configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct SchedulerConfig {
    /// Seconds between cycle boundaries. Boundaries are anchored to the wall clock.
    #[validate(range(min = 1, max = 86_400))]
    #[serde(default = "default_cadence")]
    pub cadence_secs: u64,

    /// Upper bound on how long `stop` waits for an in-flight cycle.
    #[validate(range(min = 1, max = 3_600))]
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,

    /// Run one cycle immediately at start instead of waiting for the first boundary.
    #[serde(default = "default_true")]
    pub run_on_start: bool,

    /// Optional once-a-day summary notification.
    #[validate(nested)]
    #[serde(default)]
    pub summary: Option<SummaryConfig>,
}

fn default_cadence() -> u64 {
    15 * 60
}

fn default_stop_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cadence_secs: default_cadence(),
            stop_timeout_secs: default_stop_timeout(),
            run_on_start: true,
            summary: None,
        }
    }
}

impl SchedulerConfig {
    pub fn cadence(&self) -> Duration {
        Duration::from_secs(self.cadence_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

/// Daily summary schedule, expressed in local time of a fixed UTC offset.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct SummaryConfig {
    /// Local time of day, `HH:MM`.
    #[validate(custom(function = validation::validate_clock_time))]
    pub time: String,

    /// Offset of local time from UTC, in minutes.
    #[validate(range(min = -840, max = 840))]
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl SummaryConfig {
    pub fn local_time(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(&self.time, "%H:%M").ok()
    }
}
