//! ## wattvakt-core::time
//! **Clocks & cadence boundaries**
//!
//! Everything that asks "what time is it" goes through [`Clock`], so tests can
//! drive the alert engine and the store with a [`ManualClock`] instead of
//! waiting on the wall clock.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::CoreError;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    // Milliseconds since the Unix epoch.
    offset: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            offset: Arc::new(AtomicI64::new(start.timestamp_millis())),
        }
    }

    #[inline]
    pub fn now_ms(&self) -> i64 {
        self.offset.load(Ordering::Acquire)
    }

    #[inline]
    pub fn advance(&self, by: Duration) {
        self.offset
            .fetch_add(by.as_millis() as i64, Ordering::AcqRel);
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.offset.store(at.timestamp_millis(), Ordering::Release);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.now_ms()).unwrap_or_default()
    }
}

/// First cadence boundary strictly after `now`.
///
/// Boundaries are multiples of `cadence` counted from the Unix epoch, so a 15
/// minute cadence ticks at :00, :15, :30 and :45 no matter when the process
/// started or how long earlier cycles took.
pub fn next_boundary(now: DateTime<Utc>, cadence: Duration) -> Result<DateTime<Utc>, CoreError> {
    let step = cadence.as_millis() as i64;
    if step == 0 {
        return Err(CoreError::ZeroCadence);
    }
    let next = (now.timestamp_millis().div_euclid(step) + 1) * step;
    DateTime::from_timestamp_millis(next).ok_or(CoreError::TimeOutOfRange)
}

/// Converts a std duration into a chrono delta, saturating on overflow.
pub fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_advances_shared_time() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        let other = clock.clone();
        clock.advance(Duration::from_secs(90));
        assert_eq!(other.now(), start + TimeDelta::seconds(90));
    }

    #[test]
    fn boundary_is_anchored_to_wall_clock() {
        let cadence = Duration::from_secs(15 * 60);
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 7, 42).unwrap();
        let next = next_boundary(now, cadence).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 1, 10, 15, 0).unwrap());
    }

    #[test]
    fn boundary_on_exact_tick_moves_forward() {
        let cadence = Duration::from_secs(15 * 60);
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 15, 0).unwrap();
        let next = next_boundary(now, cadence).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 1, 10, 30, 0).unwrap());
    }

    #[test]
    fn zero_cadence_is_rejected() {
        assert_eq!(
            next_boundary(Utc::now(), Duration::ZERO),
            Err(CoreError::ZeroCadence)
        );
    }
}
