//! Set and edit PIN flows
//!
//! The flow collects digits into an Enter stage, re-collects them in a
//! Confirm stage, and commits through the gate only when both entries
//! agree. Each full entry produces one typed step for the caller to
//! render; rejected entries reset the machine to the Enter stage with
//! both buffers cleared.

use std::sync::Arc;

use zeroize::Zeroizing;

use crate::error::{AuthError, Result};
use crate::pin::{PinGate, PinKind, PinMatch, PIN_LENGTH};

/// Whether the flow registers a fresh PIN or replaces an existing one
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowKind {
    /// First-time registration; the PIN must not collide with any slot
    Set,
    /// Replacing the PIN in this slot; only the other slot may not collide
    Edit,
}

/// Stage of the flow
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetStage {
    /// Collecting the new PIN
    Enter,
    /// Re-collecting the PIN for confirmation
    Confirm,
}

/// Why a full entry was rejected
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetPinError {
    /// Confirmation differed from the submitted PIN
    Mismatch,
    /// The PIN is already registered
    AlreadyInUse,
    /// Persisting the PIN failed
    SaveFailed,
}

/// Result of feeding one event into the flow
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetPinStep {
    /// Still collecting digits
    Pending { stage: SetStage, digits: usize },
    /// The entry was accepted; the flow moved to the Confirm stage
    ConfirmRequested,
    /// The PIN was committed; the flow is finished
    Committed,
    /// The entry was rejected; the flow is back at the Enter stage
    Rejected(SetPinError),
}

/// State machine for setting or editing a PIN
pub struct SetPinFlow {
    gate: Arc<PinGate>,
    kind: PinKind,
    flow: FlowKind,
    stage: SetStage,
    buffer: Zeroizing<String>,
    submitted: Option<Zeroizing<String>>,
}

impl SetPinFlow {
    /// Start a flow for the given slot
    pub fn new(gate: Arc<PinGate>, kind: PinKind, flow: FlowKind) -> Self {
        Self {
            gate,
            kind,
            flow,
            stage: SetStage::Enter,
            buffer: Zeroizing::new(String::new()),
            submitted: None,
        }
    }

    /// Current stage
    pub fn stage(&self) -> SetStage {
        self.stage
    }

    /// Digits entered so far in the current stage
    pub fn entered_digits(&self) -> usize {
        self.buffer.len()
    }

    /// Feed one digit into the flow
    pub fn on_digit(&mut self, digit: char) -> Result<SetPinStep> {
        if !digit.is_ascii_digit() || self.buffer.len() >= PIN_LENGTH {
            return Ok(self.pending());
        }

        self.buffer.push(digit);
        if self.buffer.len() < PIN_LENGTH {
            return Ok(self.pending());
        }

        match self.stage {
            SetStage::Enter => self.complete_enter(),
            SetStage::Confirm => self.complete_confirm(),
        }
    }

    /// Remove the last digit of the current stage
    pub fn on_delete(&mut self) -> SetPinStep {
        self.buffer.pop();
        self.pending()
    }

    fn complete_enter(&mut self) -> Result<SetPinStep> {
        // Uniqueness is checked before the Confirm stage is ever reached
        if self.conflicts()? {
            self.reset();
            return Ok(SetPinStep::Rejected(SetPinError::AlreadyInUse));
        }

        self.submitted = Some(std::mem::replace(
            &mut self.buffer,
            Zeroizing::new(String::new()),
        ));
        self.stage = SetStage::Confirm;
        Ok(SetPinStep::ConfirmRequested)
    }

    fn complete_confirm(&mut self) -> Result<SetPinStep> {
        let Some(submitted) = self.submitted.take() else {
            self.reset();
            return Ok(SetPinStep::Rejected(SetPinError::Mismatch));
        };

        if *self.buffer != *submitted {
            self.reset();
            return Ok(SetPinStep::Rejected(SetPinError::Mismatch));
        }

        match self.gate.store(&submitted, self.kind) {
            Ok(()) => {
                self.reset();
                Ok(SetPinStep::Committed)
            }
            // Lost a race against another registration
            Err(AuthError::PinInUse) => {
                self.reset();
                Ok(SetPinStep::Rejected(SetPinError::AlreadyInUse))
            }
            // Only the narrow persistence failure becomes a flow-level
            // rejection; anything else is surfaced to the caller
            Err(AuthError::Storage(_)) | Err(AuthError::Io(_)) => {
                self.reset();
                Ok(SetPinStep::Rejected(SetPinError::SaveFailed))
            }
            Err(e) => {
                self.reset();
                Err(e)
            }
        }
    }

    fn conflicts(&self) -> Result<bool> {
        let hit = self.gate.registered_match(&self.buffer)?;
        Ok(match (self.flow, self.kind) {
            (FlowKind::Set, _) => hit.is_some(),
            (FlowKind::Edit, PinKind::Primary) => hit == Some(PinMatch::Duress),
            (FlowKind::Edit, PinKind::Duress) => hit == Some(PinMatch::Primary),
        })
    }

    fn pending(&self) -> SetPinStep {
        SetPinStep::Pending {
            stage: self.stage,
            digits: self.buffer.len(),
        }
    }

    fn reset(&mut self) {
        self.stage = SetStage::Enter;
        self.buffer = Zeroizing::new(String::new());
        self.submitted = None;
    }
}
