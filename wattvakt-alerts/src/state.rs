//! Per-(site, rule) state machine.
//!
//! `Active` is transient: a firing moves `Idle` straight to `Cooldown` within
//! one step, so it is never observed between evaluations.

use std::time::Duration;

use chrono::{DateTime, Utc};

use wattvakt_config::RecoveryMode;
use wattvakt_core::model::{AlertPhase, AlertState};
use wattvakt_core::time::to_delta;

/// What one evaluation did to a rule's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Condition unknown or unchanged; nothing to do.
    Unchanged,
    /// Notification due; the rule is now cooling down.
    Fired,
    /// Still cooling down while the condition holds (or recovery waits).
    Suppressed,
    /// Condition cleared during cooldown and the rule re-armed early.
    Rearmed,
    /// Cooldown ran out and the condition is clear.
    Expired,
}

/// Advances `state` for one evaluation.
///
/// `breached` is `None` when the condition cannot be decided (metric absent),
/// which leaves the state untouched.
pub fn step(
    state: &mut AlertState,
    breached: Option<bool>,
    now: DateTime<Utc>,
    cooldown: Duration,
    recovery: RecoveryMode,
) -> Transition {
    let Some(breached) = breached else {
        return Transition::Unchanged;
    };

    let mut expired = false;
    match state.phase {
        AlertPhase::Cooldown => {
            let elapsed = state
                .last_fired
                .map_or(true, |fired| now - fired >= to_delta(cooldown));
            if elapsed {
                state.phase = AlertPhase::Idle;
                expired = true;
            } else if !breached && recovery == RecoveryMode::Immediate {
                state.phase = AlertPhase::Idle;
                return Transition::Rearmed;
            } else {
                return Transition::Suppressed;
            }
        }
        AlertPhase::Active => state.phase = AlertPhase::Idle,
        AlertPhase::Idle => {}
    }

    if !breached {
        return if expired {
            Transition::Expired
        } else {
            Transition::Unchanged
        };
    }

    state.last_fired = Some(state.last_fired.map_or(now, |prev| prev.max(now)));
    state.phase = AlertPhase::Cooldown;
    Transition::Fired
}
