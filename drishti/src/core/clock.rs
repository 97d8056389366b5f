//! Monotonic session clock.
//!
//! Control logic takes timestamps as explicit microseconds; threads obtain
//! them from a `SessionClock` started with the session.

use std::time::{Duration, Instant};

/// Microseconds since session start.
pub type TimestampUs = u64;

#[inline]
pub fn secs_to_us(secs: f32) -> u64 {
    (secs.max(0.0) * 1_000_000.0) as u64
}

#[inline]
pub fn ms_to_us(ms: u64) -> u64 {
    ms.saturating_mul(1_000)
}

#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_us(&self) -> TimestampUs {
        self.start.elapsed().as_micros() as u64
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::start()
    }
}
