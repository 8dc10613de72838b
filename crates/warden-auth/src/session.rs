//! Unlocked-session tracking
//!
//! A session marks the gate as open and expires on idle or absolute
//! timeout, at which point the host should drop back to the locked
//! screen. No key material is held here; the session is purely a
//! re-lock deadline.

use std::time::{Duration, Instant};

/// Session timeouts
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Idle timeout duration
    pub idle_timeout: Duration,
    /// Maximum session duration (absolute timeout)
    pub max_duration: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            max_duration: Duration::from_secs(3600),
        }
    }
}

impl SessionConfig {
    /// Tighter timeouts for high-security hosts
    pub fn strict() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            max_duration: Duration::from_secs(900),
        }
    }
}

/// An open gate session
pub struct UnlockSession {
    created_at: Instant,
    last_activity: Instant,
    config: SessionConfig,
}

impl UnlockSession {
    /// Open a session now
    pub fn new(config: SessionConfig) -> Self {
        let now = Instant::now();
        Self {
            created_at: now,
            last_activity: now,
            config,
        }
    }

    /// Record user activity, postponing the idle timeout
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Whether the session is still open
    pub fn is_valid(&self) -> bool {
        let now = Instant::now();
        now.duration_since(self.created_at) <= self.config.max_duration
            && now.duration_since(self.last_activity) <= self.config.idle_timeout
    }

    /// Time until the session expires
    pub fn time_until_expiry(&self) -> Duration {
        let now = Instant::now();
        let absolute = self
            .config
            .max_duration
            .saturating_sub(now.duration_since(self.created_at));
        let idle = self
            .config
            .idle_timeout
            .saturating_sub(now.duration_since(self.last_activity));
        absolute.min(idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_fresh_session_is_valid() {
        let session = UnlockSession::new(SessionConfig::default());
        assert!(session.is_valid());
    }

    #[test]
    fn test_idle_timeout_expires_session() {
        let config = SessionConfig {
            idle_timeout: Duration::from_millis(40),
            max_duration: Duration::from_secs(3600),
        };
        let session = UnlockSession::new(config);

        assert!(session.is_valid());
        sleep(Duration::from_millis(60));
        assert!(!session.is_valid());
    }

    #[test]
    fn test_touch_postpones_idle_timeout() {
        let config = SessionConfig {
            idle_timeout: Duration::from_millis(80),
            max_duration: Duration::from_secs(3600),
        };
        let mut session = UnlockSession::new(config);

        sleep(Duration::from_millis(50));
        session.touch();
        sleep(Duration::from_millis(50));
        assert!(session.is_valid());
    }

    #[test]
    fn test_absolute_timeout_ignores_touch() {
        let config = SessionConfig {
            idle_timeout: Duration::from_secs(3600),
            max_duration: Duration::from_millis(40),
        };
        let mut session = UnlockSession::new(config);

        sleep(Duration::from_millis(60));
        session.touch();
        assert!(!session.is_valid());
    }
}
