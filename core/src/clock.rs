//! Device clock — millisecond monotonic time behind a trait.
//!
//! The controller never reads platform time directly; it takes a
//! `&dyn Clock` each tick. `SystemClock` backs the real device,
//! `ManualClock` backs tests and the deterministic simulator.

use crate::types::{EpochSecs, Millis};
use std::cell::Cell;
use std::time::{Duration, Instant};

pub trait Clock {
    /// Milliseconds since device start.
    fn now_ms(&self) -> Millis;

    /// Seconds since the device epoch. Transaction timestamps use this.
    fn now_secs(&self) -> EpochSecs {
        self.now_ms() / 1000
    }
}

/// Pause the calling loop for a short interval. Used only by the
/// escalation gate's bounded wait — every other wait in the core is
/// cooperative (deadline checked on the next tick).
pub trait Pacer {
    fn pause(&self, interval: Duration);
}

/// Monotonic clock anchored at construction.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> Millis {
        self.origin.elapsed().as_millis() as Millis
    }
}

/// Real pacer: parks the thread.
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&self, interval: Duration) {
        std::thread::sleep(interval);
    }
}

/// Hand-advanced clock for tests and the simulator.
///
/// Also implements `Pacer` by advancing itself, so a bounded wait
/// against a `ManualClock` completes instantly in virtual time.
pub struct ManualClock {
    now: Cell<Millis>,
}

impl ManualClock {
    pub fn new(start_ms: Millis) -> Self {
        Self {
            now: Cell::new(start_ms),
        }
    }

    pub fn advance(&self, delta_ms: Millis) {
        self.now.set(self.now.get() + delta_ms);
    }

    pub fn set(&self, now_ms: Millis) {
        self.now.set(now_ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now.get()
    }
}

impl Pacer for ManualClock {
    fn pause(&self, interval: Duration) {
        self.advance(interval.as_millis() as Millis);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_and_converts_to_seconds() {
        let clock = ManualClock::new(0);
        clock.advance(1_500);
        assert_eq!(clock.now_ms(), 1_500);
        assert_eq!(clock.now_secs(), 1);
    }

    #[test]
    fn manual_clock_pause_moves_virtual_time() {
        let clock = ManualClock::new(10_000);
        clock.pause(Duration::from_millis(50));
        assert_eq!(clock.now_ms(), 10_050);
    }
}
