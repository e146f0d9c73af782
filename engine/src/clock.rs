//! Monotonic timestamp source for record mutations.
//!
//! Every local or remote-adopted mutation must move a record's `updated_at`
//! strictly forward, even when the wall clock stalls, jumps backwards, or a
//! remote timestamp is ahead of ours. The clock never reads the system time
//! itself; callers pass `now` in, which keeps the engine deterministic.

use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// A hybrid clock: wall-clock milliseconds, bumped by one whenever the wall
/// clock would not advance past the last issued value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonotonicClock {
    /// Last timestamp issued or observed
    last: Timestamp,
}

impl MonotonicClock {
    /// Create a clock that has issued nothing yet.
    pub fn new() -> Self {
        Self { last: 0 }
    }

    /// Create a clock resuming from a known timestamp.
    pub fn starting_at(last: Timestamp) -> Self {
        Self { last }
    }

    /// Last timestamp issued or observed.
    pub fn last(&self) -> Timestamp {
        self.last
    }

    /// Issue the next timestamp, strictly greater than every previous one.
    pub fn next(&mut self, now: Timestamp) -> Timestamp {
        self.last = now.max(self.last.saturating_add(1));
        self.last
    }

    /// Issue a timestamp strictly after both the clock and `floor`.
    ///
    /// Used when touching a record whose current `updated_at` may be ahead of
    /// the clock (for example a record restored from another device).
    pub fn next_after(&mut self, now: Timestamp, floor: Timestamp) -> Timestamp {
        self.observe(floor);
        self.next(now)
    }

    /// Fold in a timestamp seen elsewhere (remote record, restored document).
    pub fn observe(&mut self, ts: Timestamp) {
        self.last = self.last.max(ts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_clock_starts_at_zero() {
        assert_eq!(MonotonicClock::new().last(), 0);
    }

    #[test]
    fn follows_wall_clock_when_it_advances() {
        let mut clock = MonotonicClock::new();
        assert_eq!(clock.next(1000), 1000);
        assert_eq!(clock.next(2000), 2000);
    }

    #[test]
    fn stalled_wall_clock_still_advances() {
        let mut clock = MonotonicClock::new();
        assert_eq!(clock.next(1000), 1000);
        assert_eq!(clock.next(1000), 1001);
        assert_eq!(clock.next(999), 1002);
    }

    #[test]
    fn observe_keeps_max() {
        let mut clock = MonotonicClock::starting_at(50);
        clock.observe(10);
        assert_eq!(clock.last(), 50);
        clock.observe(70);
        assert_eq!(clock.last(), 70);
        assert_eq!(clock.next(60), 71);
    }

    #[test]
    fn next_after_floor() {
        let mut clock = MonotonicClock::new();
        assert_eq!(clock.next_after(100, 500), 501);
    }

    #[test]
    fn serialization_format() {
        let clock = MonotonicClock::starting_at(42);
        let json = serde_json::to_string(&clock).unwrap();
        assert_eq!(json, r#"{"last":42}"#);
    }
}
