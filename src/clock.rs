//! Millisecond time base for the polling loop.
//!
//! Every periodic behaviour in the daemon is an [`Interval`] polled with an
//! explicit `now`, so state machines never read a hidden clock and can be
//! driven by synthetic time in tests.

use std::time::Instant;

/// Milliseconds since the monitor started.
pub type Millis = u64;

/// Monotonic millisecond counter anchored at construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Milliseconds elapsed since the clock was created.
    pub fn now(&self) -> Millis {
        self.start.elapsed().as_millis() as Millis
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// A `(last_fire, period)` pair checked against an injected clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    last_fire: Millis,
    period: Millis,
}

impl Interval {
    /// Interval whose reference point is `now` (first fire at `now + period`).
    pub fn starting_at(now: Millis, period: Millis) -> Self {
        Self {
            last_fire: now,
            period,
        }
    }

    /// Whether `period` has elapsed, without consuming the fire.
    pub fn is_due(&self, now: Millis) -> bool {
        now.saturating_sub(self.last_fire) >= self.period
    }

    /// Returns true and re-arms from `now` if the period has elapsed.
    pub fn poll(&mut self, now: Millis) -> bool {
        if !self.is_due(now) {
            return false;
        }
        self.last_fire = now;
        true
    }
}
