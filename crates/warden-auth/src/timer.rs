//! One-shot deferred callback
//!
//! Used to re-check the lockout state exactly at its deadline.
//! Rescheduling replaces the pending callback, so a later (larger)
//! deadline can supersede an earlier one without ever firing early.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::warn;

/// A cancellable one-shot timer
pub struct OneShotTimer {
    handle: Option<JoinHandle<()>>,
}

impl OneShotTimer {
    /// Create an unarmed timer
    pub fn new() -> Self {
        Self { handle: None }
    }

    /// Arm the timer, replacing any pending callback
    ///
    /// Outside an async runtime the timer stays unarmed; callers that
    /// poll the state lazily still observe the transition.
    pub fn schedule<F>(&mut self, delay: Duration, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                self.handle = Some(rt.spawn(async move {
                    tokio::time::sleep(delay).await;
                    f();
                }));
            }
            Err(_) => warn!("no async runtime; deferred recheck not scheduled"),
        }
    }

    /// Drop any pending callback without firing it
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Whether a callback is pending
    pub fn is_armed(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }
}

impl Default for OneShotTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for OneShotTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
