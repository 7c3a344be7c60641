//! Monotonic tick sources for meter timestamps.
//!
//! All meter timestamps are nanosecond ticks on a monotonic scale. A value of
//! zero is reserved to mean "not yet set", so every clock here returns ticks
//! strictly greater than zero.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Abstraction over the monotonic clock for dependency injection.
///
/// Allows deterministic testing by replacing the real clock with a manual one.
/// The default implementation ([`MonotonicClock`]) delegates to [`Instant`].
pub trait ClockSource: Send + Sync {
    /// Returns the current tick in nanoseconds. Never returns zero.
    fn now(&self) -> u64;
}

/// Default clock source reading `std::time::Instant` relative to a
/// process-wide anchor taken on first use.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

fn anchor() -> Instant {
    static ANCHOR: OnceLock<Instant> = OnceLock::new();
    *ANCHOR.get_or_init(Instant::now)
}

impl ClockSource for MonotonicClock {
    fn now(&self) -> u64 {
        let elapsed = anchor().elapsed().as_nanos();
        // Offset by one so the very first reading is not mistaken for "unset".
        u64::try_from(elapsed).unwrap_or(u64::MAX - 1) + 1
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    ticks: AtomicU64,
}

impl ManualClock {
    /// Creates a clock reading `start` ticks (clamped to at least 1).
    #[must_use]
    pub fn new(start: u64) -> Self {
        Self {
            ticks: AtomicU64::new(start.max(1)),
        }
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.ticks.fetch_add(nanos, Ordering::SeqCst);
    }

    /// Sets the clock to an absolute tick (clamped to at least 1).
    pub fn set(&self, ticks: u64) {
        self.ticks.store(ticks.max(1), Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(1)
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_clock_is_nonzero_and_non_decreasing() {
        let clock = MonotonicClock;
        let a = clock.now();
        let b = clock.now();
        assert!(a > 0);
        assert!(b >= a);
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(100);
        clock.advance(Duration::from_micros(2));
        assert_eq!(clock.now(), 2_100);
    }

    #[test]
    fn manual_clock_never_reads_zero() {
        let clock = ManualClock::new(0);
        assert_eq!(clock.now(), 1);
        clock.set(0);
        assert_eq!(clock.now(), 1);
    }
}
