//! # wattvakt Alert Engine
//!
//! Threshold and staleness rules evaluated against committed snapshots, with
//! per-(site, rule) cooldown state that keeps a persisting breach from turning
//! into a notification storm.
//!
//! ### Components:
//! - `rules`: compiled rules and condition evaluation
//! - `state`: the Idle / Cooldown state machine
//! - `engine`: per-site evaluation, checkpoint export and restore
//! - `format`: unit-aware value rendering for messages

pub mod engine;
pub mod format;
pub mod rules;
pub mod state;

pub use engine::{AlertEngine, Notification};
pub use rules::{CompiledRule, Condition, RuleKind};
pub use state::Transition;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum AlertError {
    #[error("Unknown rule '{0}'")]
    UnknownRule(String),
}
