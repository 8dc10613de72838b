//! Warden auth - the PIN/biometric gate of the security core
//!
//! This crate decides when the app opens:
//! - PIN storage and validation through the encrypted-secret path
//! - Set/edit flows with enter/confirm stages and uniqueness checks
//! - Progressive lockout on failed attempts, anchored to uptime
//! - The interactive unlock sequence, including biometric bypass and
//!   timer-driven lockout expiry
//!
//! All services are constructor-injected; the hosting application owns
//! one instance of each and wires them over shared [`GateStorage`].

pub mod clock;
pub mod error;
pub mod flow;
pub mod lockout;
pub mod pin;
pub mod session;
pub mod storage;
pub mod timer;
pub mod unlock;

pub use clock::{ManualClock, SystemUptime, UptimeClock};
pub use error::{AuthError, Result};
pub use flow::{FlowKind, SetPinError, SetPinFlow, SetPinStep, SetStage};
pub use lockout::{LockoutPolicy, LockoutState, LockoutTracker};
pub use pin::{PinGate, PinKind, PinMatch, PIN_LENGTH};
pub use session::{SessionConfig, UnlockSession};
pub use storage::{FileGateStorage, GateState, GateStorage, MemoryGateStorage};
pub use timer::OneShotTimer;
pub use unlock::{BiometryStatus, UnlockGate, UnlockOutcome, UnlockPrompt};
