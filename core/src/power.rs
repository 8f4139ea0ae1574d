//! Low-power tracking driven by the motion sensor.
//!
//! Owned object with an explicit lifecycle: the controller feeds it
//! the motion sample every tick. No ambient globals, no callbacks.

use crate::types::Millis;

pub struct PowerManager {
    timeout_ms: Millis,
    last_activity_ms: Millis,
    low_power: bool,
}

impl PowerManager {
    pub fn new(motion_timeout_secs: u64, now_ms: Millis) -> Self {
        Self {
            timeout_ms: motion_timeout_secs * 1000,
            last_activity_ms: now_ms,
            low_power: false,
        }
    }

    /// Feed one tick's motion sample. Returns true when the low-power
    /// flag flipped this tick.
    pub fn on_tick(&mut self, motion: bool, now_ms: Millis) -> bool {
        if motion {
            self.last_activity_ms = now_ms;
            if self.low_power {
                self.low_power = false;
                log::info!("Power: waking from low power");
                return true;
            }
            return false;
        }

        if !self.low_power && now_ms.saturating_sub(self.last_activity_ms) >= self.timeout_ms {
            self.low_power = true;
            log::info!("Power: entering low power");
            return true;
        }
        false
    }

    /// Non-motion activity (card read, operator key) also resets the
    /// idle timer.
    pub fn note_activity(&mut self, now_ms: Millis) {
        self.last_activity_ms = now_ms;
    }

    pub fn is_low_power(&self) -> bool {
        self.low_power
    }
}
