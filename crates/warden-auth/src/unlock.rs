//! Interactive unlock flow
//!
//! Composes the PIN gate, the lockout tracker, and the biometric
//! capability flags into one digit-by-digit unlock sequence. Every
//! operation returns a typed outcome; the only push channel is a watch
//! on the lockout state, driven by the one-shot expiry timer so a
//! lockout ends without further user action.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::Result;
use crate::lockout::{LockoutState, LockoutTracker};
use crate::pin::{PinGate, PinMatch, PIN_LENGTH};
use crate::session::{SessionConfig, UnlockSession};
use crate::timer::OneShotTimer;

/// Biometric capability flags, sourced from the host OS
#[derive(Clone, Copy, Debug, Default)]
pub struct BiometryStatus {
    /// The user enabled biometric unlock
    pub enabled: bool,
    /// The device has a usable biometric sensor
    pub supported: bool,
}

impl BiometryStatus {
    /// Whether a biometric prompt should be offered
    pub fn available(&self) -> bool {
        self.enabled && self.supported
    }
}

/// What the unlock screen should show on load
#[derive(Clone, Debug)]
pub struct UnlockPrompt {
    /// Current lockout state
    pub lockout: LockoutState,
    /// Whether to offer a biometric prompt
    pub offer_biometrics: bool,
}

/// Outcome of one unlock interaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// Still collecting digits
    Pending { digits: usize },
    /// The gate is open
    Unlocked(PinMatch),
    /// Wrong PIN; the input buffer was cleared
    WrongPin {
        failed_attempts: u32,
        lockout: LockoutState,
    },
    /// Input is disabled until the lockout expires
    LockedOut(LockoutState),
}

/// Orchestrates the interactive unlock sequence
pub struct UnlockGate {
    pin: Arc<PinGate>,
    lockout: Arc<LockoutTracker>,
    biometry: BiometryStatus,
    session_config: SessionConfig,
    buffer: Zeroizing<String>,
    timer: OneShotTimer,
    state_tx: watch::Sender<LockoutState>,
    state_rx: watch::Receiver<LockoutState>,
    session: Option<UnlockSession>,
}

impl UnlockGate {
    /// Create an unlock gate with default session timeouts
    pub fn new(
        pin: Arc<PinGate>,
        lockout: Arc<LockoutTracker>,
        biometry: BiometryStatus,
    ) -> Self {
        Self::with_session_config(pin, lockout, biometry, SessionConfig::default())
    }

    /// Create an unlock gate with custom session timeouts
    pub fn with_session_config(
        pin: Arc<PinGate>,
        lockout: Arc<LockoutTracker>,
        biometry: BiometryStatus,
        session_config: SessionConfig,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(LockoutState::Unlocked);
        Self {
            pin,
            lockout,
            biometry,
            session_config,
            buffer: Zeroizing::new(String::new()),
            timer: OneShotTimer::new(),
            state_tx,
            state_rx,
            session: None,
        }
    }

    /// Called when the unlock screen appears
    pub fn on_ready(&mut self) -> UnlockPrompt {
        let lockout = self.refresh_lockout();
        UnlockPrompt {
            offer_biometrics: self.biometry.available() && !lockout.is_locked(),
            lockout,
        }
    }

    /// Feed one digit into the unlock buffer
    pub fn on_digit(&mut self, digit: char) -> Result<UnlockOutcome> {
        let lockout = self.refresh_lockout();
        if lockout.is_locked() {
            self.buffer.clear();
            return Ok(UnlockOutcome::LockedOut(lockout));
        }

        if !digit.is_ascii_digit() || self.buffer.len() >= PIN_LENGTH {
            return Ok(self.pending());
        }

        self.buffer.push(digit);
        if self.buffer.len() < PIN_LENGTH {
            return Ok(self.pending());
        }

        let entered = std::mem::replace(&mut self.buffer, Zeroizing::new(String::new()));
        match self.pin.validate(&entered)? {
            Some(hit) => self.open_gate(hit),
            None => {
                let failed_attempts = self.lockout.record_failure()?;
                let lockout = self.refresh_lockout();
                debug!(failed_attempts, "wrong PIN");
                Ok(UnlockOutcome::WrongPin {
                    failed_attempts,
                    lockout,
                })
            }
        }
    }

    /// Remove the last digit; returns the new buffer length
    pub fn on_delete(&mut self) -> usize {
        self.buffer.pop();
        self.buffer.len()
    }

    /// Report a successful biometric authentication
    ///
    /// Equivalent in effect to a correct primary PIN: the failure count
    /// drops and the gate opens. Rejected while locked out.
    pub fn on_biometric_unlock(&mut self) -> Result<UnlockOutcome> {
        let lockout = self.refresh_lockout();
        if lockout.is_locked() {
            return Ok(UnlockOutcome::LockedOut(lockout));
        }
        self.buffer.clear();
        self.open_gate(PinMatch::Primary)
    }

    /// Watch the lockout state; the expiry timer pushes the
    /// `Locked -> Unlocked` transition here
    pub fn watch_lockout(&self) -> watch::Receiver<LockoutState> {
        self.state_rx.clone()
    }

    /// Whether an unlock session is open and unexpired
    pub fn is_unlocked(&self) -> bool {
        self.session.as_ref().map(UnlockSession::is_valid).unwrap_or(false)
    }

    /// Whether the host should drop back to the locked screen
    pub fn should_relock(&self) -> bool {
        self.session.as_ref().is_some_and(|s| !s.is_valid())
    }

    /// Record user activity on the open session
    pub fn touch(&mut self) {
        if let Some(session) = &mut self.session {
            session.touch();
        }
    }

    /// Close the session, requiring a fresh unlock
    pub fn relock(&mut self) {
        self.session = None;
        self.buffer.clear();
    }

    fn open_gate(&mut self, hit: PinMatch) -> Result<UnlockOutcome> {
        self.lockout.drop_failed_attempts()?;
        self.session = Some(UnlockSession::new(self.session_config.clone()));
        self.timer.cancel();
        self.state_tx.send_replace(LockoutState::Unlocked);
        debug!(?hit, "gate opened");
        Ok(UnlockOutcome::Unlocked(hit))
    }

    fn pending(&self) -> UnlockOutcome {
        UnlockOutcome::Pending {
            digits: self.buffer.len(),
        }
    }

    fn refresh_lockout(&mut self) -> LockoutState {
        let state = self.lockout.state();
        self.state_tx.send_replace(state.clone());

        if let LockoutState::Locked { remaining, .. } = &state {
            let tx = self.state_tx.clone();
            let tracker = self.lockout.clone();
            self.timer.schedule(*remaining, move || {
                tx.send_replace(tracker.state());
            });
        }
        state
    }
}
