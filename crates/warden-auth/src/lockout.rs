//! Progressive lockout for failed unlock attempts
//!
//! The first failures cost nothing (typos happen); once the count passes
//! the threshold, every further failure buys a longer lockout window:
//!
//! - up to 3 failures: no lockout
//! - 4th failure: 30 second lockout
//! - 5th failure: 5 minute lockout
//! - 6th failure: 30 minute lockout
//! - 7th and later: 24 hour lockout
//!
//! Deadlines are computed on uptime, not wall-clock time, and re-anchored
//! when uptime regresses (reboot), so the window can only ever be waited
//! out in full.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use crate::clock::UptimeClock;
use crate::error::Result;
use crate::storage::{update_state, GateStorage};

/// Derived lockout state of the gate
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LockoutState {
    /// Unlock attempts are accepted
    Unlocked,
    /// Unlock attempts are rejected until the deadline passes
    Locked {
        /// Absolute deadline for display
        until: DateTime<Utc>,
        /// Time left until the deadline
        remaining: Duration,
    },
}

impl LockoutState {
    /// Whether the gate currently rejects unlock attempts
    pub fn is_locked(&self) -> bool {
        matches!(self, LockoutState::Locked { .. })
    }
}

/// Escalation schedule for lockout windows
#[derive(Clone, Debug)]
pub struct LockoutPolicy {
    /// Failures tolerated before any lockout
    pub threshold: u32,
    /// Window per failure past the threshold; the last entry repeats
    pub windows: Vec<Duration>,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            threshold: 3,
            windows: vec![
                Duration::from_secs(30),
                Duration::from_secs(5 * 60),
                Duration::from_secs(30 * 60),
                Duration::from_secs(24 * 60 * 60),
            ],
        }
    }
}

impl LockoutPolicy {
    /// Stricter schedule: locks out on the second failure
    pub fn strict() -> Self {
        Self {
            threshold: 1,
            windows: vec![
                Duration::from_secs(60),
                Duration::from_secs(10 * 60),
                Duration::from_secs(60 * 60),
                Duration::from_secs(24 * 60 * 60),
            ],
        }
    }

    /// Custom schedule
    pub fn custom(threshold: u32, windows: Vec<Duration>) -> Self {
        Self { threshold, windows }
    }

    /// The window for the given failure count, `None` while under threshold
    pub fn window(&self, failed_attempts: u32) -> Option<Duration> {
        if failed_attempts <= self.threshold || self.windows.is_empty() {
            return None;
        }
        let level = ((failed_attempts - self.threshold - 1) as usize).min(self.windows.len() - 1);
        self.windows.get(level).copied()
    }

    /// Whether the count alone mandates a lockout
    pub fn is_locked(&self, failed_attempts: u32) -> bool {
        self.window(failed_attempts).is_some()
    }
}

/// Tracks failed unlock attempts and derives the lockout state
pub struct LockoutTracker {
    storage: Arc<dyn GateStorage>,
    clock: Arc<dyn UptimeClock>,
    policy: LockoutPolicy,
}

impl LockoutTracker {
    /// Create a tracker over the shared gate storage
    pub fn new(
        storage: Arc<dyn GateStorage>,
        clock: Arc<dyn UptimeClock>,
        policy: LockoutPolicy,
    ) -> Self {
        Self {
            storage,
            clock,
            policy,
        }
    }

    /// Record a failed unlock attempt; returns the new failure count
    pub fn record_failure(&self) -> Result<u32> {
        let uptime_ms = self.clock.uptime().as_millis() as u64;
        let state = update_state(self.storage.as_ref(), |s| {
            s.failed_attempts = s.failed_attempts.saturating_add(1);
            s.last_failure_uptime_ms = Some(uptime_ms);
        })?;
        debug!(failed_attempts = state.failed_attempts, "unlock failure recorded");
        Ok(state.failed_attempts)
    }

    /// Reset the failure count after a successful unlock
    pub fn drop_failed_attempts(&self) -> Result<()> {
        update_state(self.storage.as_ref(), |s| {
            s.failed_attempts = 0;
            s.last_failure_uptime_ms = None;
        })?;
        Ok(())
    }

    /// Current failure count
    pub fn failed_attempts(&self) -> Result<u32> {
        Ok(self.storage.load()?.failed_attempts)
    }

    /// Error unless an unlock attempt is currently allowed
    ///
    /// For callers that gate a sensitive re-authentication directly on
    /// the tracker rather than going through the unlock flow.
    pub fn ensure_can_attempt(&self) -> Result<()> {
        match self.state() {
            LockoutState::Unlocked => Ok(()),
            LockoutState::Locked { until, .. } => Err(crate::error::AuthError::LockedOut(until)),
        }
    }

    /// Derive the current lockout state
    ///
    /// Never fails open: if the state cannot be computed, the gate
    /// reports itself locked for one first-level window.
    pub fn state(&self) -> LockoutState {
        match self.derive() {
            Ok(state) => state,
            Err(e) => {
                error!(error = %e, "lockout state unavailable, failing closed");
                let window = self
                    .policy
                    .windows
                    .first()
                    .copied()
                    .unwrap_or(Duration::from_secs(30));
                LockoutState::Locked {
                    until: Utc::now() + to_chrono(window),
                    remaining: window,
                }
            }
        }
    }

    fn derive(&self) -> Result<LockoutState> {
        let state = self.storage.load()?;
        let Some(window) = self.policy.window(state.failed_attempts) else {
            return Ok(LockoutState::Unlocked);
        };

        let now = self.clock.uptime();
        let mut anchor = Duration::from_millis(state.last_failure_uptime_ms.unwrap_or(0));

        if anchor > now {
            // Uptime regressed (reboot or new process): restart the full
            // window from now rather than shortening it.
            anchor = now;
            update_state(self.storage.as_ref(), |s| {
                s.last_failure_uptime_ms = Some(now.as_millis() as u64);
            })?;
        }

        let deadline = anchor + window;
        if now >= deadline {
            Ok(LockoutState::Unlocked)
        } else {
            let remaining = deadline - now;
            Ok(LockoutState::Locked {
                until: Utc::now() + to_chrono(remaining),
                remaining,
            })
        }
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::AuthError;
    use crate::storage::{GateState, MemoryGateStorage};

    struct BrokenStorage;

    impl GateStorage for BrokenStorage {
        fn load(&self) -> Result<GateState> {
            Err(AuthError::Storage("disk gone".to_string()))
        }

        fn save(&self, _state: &GateState) -> Result<()> {
            Err(AuthError::Storage("disk gone".to_string()))
        }
    }

    fn tracker_with_clock() -> (Arc<ManualClock>, LockoutTracker) {
        let clock = Arc::new(ManualClock::new());
        let tracker = LockoutTracker::new(
            Arc::new(MemoryGateStorage::new()),
            clock.clone(),
            LockoutPolicy::default(),
        );
        (clock, tracker)
    }

    #[test]
    fn test_policy_no_window_under_threshold() {
        let policy = LockoutPolicy::default();
        assert!(policy.window(0).is_none());
        assert!(policy.window(1).is_none());
        assert!(policy.window(3).is_none());
    }

    #[test]
    fn test_policy_escalation_table() {
        let policy = LockoutPolicy::default();
        assert_eq!(policy.window(4), Some(Duration::from_secs(30)));
        assert_eq!(policy.window(5), Some(Duration::from_secs(300)));
        assert_eq!(policy.window(6), Some(Duration::from_secs(1800)));
        assert_eq!(policy.window(7), Some(Duration::from_secs(86400)));
        // Caps at the last entry
        assert_eq!(policy.window(100), Some(Duration::from_secs(86400)));
    }

    #[test]
    fn test_unlocked_below_threshold() {
        let (_clock, tracker) = tracker_with_clock();

        for _ in 0..3 {
            tracker.record_failure().unwrap();
            assert_eq!(tracker.state(), LockoutState::Unlocked);
        }
    }

    #[test]
    fn test_locked_past_threshold() {
        let (_clock, tracker) = tracker_with_clock();

        for _ in 0..4 {
            tracker.record_failure().unwrap();
        }
        let state = tracker.state();
        assert!(state.is_locked());
        if let LockoutState::Locked { remaining, .. } = state {
            assert_eq!(remaining, Duration::from_secs(30));
        }
    }

    #[test]
    fn test_window_expires_with_uptime() {
        let (clock, tracker) = tracker_with_clock();

        for _ in 0..4 {
            tracker.record_failure().unwrap();
        }
        assert!(tracker.state().is_locked());

        clock.advance(Duration::from_secs(31));
        assert_eq!(tracker.state(), LockoutState::Unlocked);
    }

    #[test]
    fn test_further_failure_extends_deadline() {
        let (clock, tracker) = tracker_with_clock();

        for _ in 0..4 {
            tracker.record_failure().unwrap();
        }
        let first = match tracker.state() {
            LockoutState::Locked { remaining, .. } => remaining,
            LockoutState::Unlocked => panic!("expected lockout"),
        };

        // A 5th failure while locked must extend, never shorten
        clock.advance(Duration::from_secs(10));
        tracker.record_failure().unwrap();
        let second = match tracker.state() {
            LockoutState::Locked { remaining, .. } => remaining,
            LockoutState::Unlocked => panic!("expected lockout"),
        };
        assert!(second > first);
        assert_eq!(second, Duration::from_secs(300));
    }

    #[test]
    fn test_success_resets_counter() {
        let (_clock, tracker) = tracker_with_clock();

        for _ in 0..5 {
            tracker.record_failure().unwrap();
        }
        assert!(tracker.state().is_locked());

        tracker.drop_failed_attempts().unwrap();
        assert_eq!(tracker.failed_attempts().unwrap(), 0);
        assert_eq!(tracker.state(), LockoutState::Unlocked);
    }

    #[test]
    fn test_uptime_regression_restarts_window() {
        let clock = Arc::new(ManualClock::at(Duration::from_secs(1000)));
        let tracker = LockoutTracker::new(
            Arc::new(MemoryGateStorage::new()),
            clock.clone(),
            LockoutPolicy::default(),
        );

        for _ in 0..4 {
            tracker.record_failure().unwrap();
        }

        // Reboot: uptime starts over
        clock.set(Duration::from_secs(5));
        let state = tracker.state();
        if let LockoutState::Locked { remaining, .. } = state {
            assert_eq!(remaining, Duration::from_secs(30));
        } else {
            panic!("expected lockout after reboot");
        }

        // And the re-anchored window still expires normally
        clock.advance(Duration::from_secs(31));
        assert_eq!(tracker.state(), LockoutState::Unlocked);
    }

    #[test]
    fn test_ensure_can_attempt_reports_deadline() {
        let (clock, tracker) = tracker_with_clock();

        assert!(tracker.ensure_can_attempt().is_ok());
        for _ in 0..4 {
            tracker.record_failure().unwrap();
        }
        assert!(matches!(
            tracker.ensure_can_attempt().unwrap_err(),
            AuthError::LockedOut(_)
        ));

        clock.advance(Duration::from_secs(31));
        assert!(tracker.ensure_can_attempt().is_ok());
    }

    #[test]
    fn test_fails_closed_on_storage_error() {
        let tracker = LockoutTracker::new(
            Arc::new(BrokenStorage),
            Arc::new(ManualClock::new()),
            LockoutPolicy::default(),
        );
        assert!(tracker.state().is_locked());
    }
}
