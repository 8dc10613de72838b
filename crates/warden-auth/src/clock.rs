//! Monotonic uptime source for lockout deadlines
//!
//! Lockout math runs on uptime rather than wall-clock time so that
//! winding the system clock forward cannot shorten a lockout window.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Monotonic time since an arbitrary fixed epoch
pub trait UptimeClock: Send + Sync {
    /// Elapsed monotonic time; never decreases within one process
    fn uptime(&self) -> Duration;
}

/// Uptime measured from clock construction
///
/// Hosts with a boot-anchored monotonic clock (e.g. a mobile OS) should
/// supply their own implementation so lockouts survive process restarts.
pub struct SystemUptime {
    start: Instant,
}

impl SystemUptime {
    /// Create a clock anchored at the current instant
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemUptime {
    fn default() -> Self {
        Self::new()
    }
}

impl UptimeClock for SystemUptime {
    fn uptime(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Hand-driven clock for tests
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    /// Create a clock at uptime zero
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Duration::ZERO),
        }
    }

    /// Create a clock at the given uptime
    pub fn at(now: Duration) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Advance the clock by `delta`
    pub fn advance(&self, delta: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += delta;
        }
    }

    /// Set the clock to an absolute uptime
    pub fn set(&self, now: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl UptimeClock for ManualClock {
    fn uptime(&self) -> Duration {
        self.now.lock().map(|d| *d).unwrap_or(Duration::ZERO)
    }
}
