//! PIN storage and validation
//!
//! PINs are persisted only as blobs produced by the encrypted-secret
//! path, so validating one always routes through the hardware-backed key.
//! A secondary duress PIN can be registered alongside the primary; the
//! two must differ, and validation always evaluates both in constant
//! time so a miss and a duress hit are indistinguishable from timing.

use std::sync::Arc;

use subtle::ConstantTimeEq;
use tracing::debug;
use zeroize::Zeroizing;

use warden_keystore::EncryptionManager;

use crate::error::{AuthError, Result};
use crate::storage::{update_state, GateStorage};

/// Fixed PIN length in digits
pub const PIN_LENGTH: usize = 6;

/// Which PIN slot an operation addresses
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinKind {
    /// The primary unlock PIN
    Primary,
    /// The decoy PIN presented under duress
    Duress,
}

/// Which registered PIN an entered PIN matched
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinMatch {
    /// Matched the primary PIN
    Primary,
    /// Matched the duress PIN
    Duress,
}

/// The PIN gate: stores, validates, and clears PINs
pub struct PinGate {
    crypto: Arc<EncryptionManager>,
    storage: Arc<dyn GateStorage>,
}

impl PinGate {
    /// Create a gate over the encrypted-secret path and gate storage
    pub fn new(crypto: Arc<EncryptionManager>, storage: Arc<dyn GateStorage>) -> Self {
        Self { crypto, storage }
    }

    /// Whether a primary PIN is registered
    pub fn is_pin_set(&self) -> Result<bool> {
        Ok(self.storage.load()?.pin_blob.is_some())
    }

    /// Whether a duress PIN is registered
    pub fn is_duress_pin_set(&self) -> Result<bool> {
        Ok(self.storage.load()?.duress_blob.is_some())
    }

    /// Store `pin` in the given slot
    ///
    /// Rejects a PIN equal to the one registered in the other slot; the
    /// primary and duress PINs must never collide.
    pub fn store(&self, pin: &str, kind: PinKind) -> Result<()> {
        check_format(pin)?;

        let other = match kind {
            PinKind::Primary => self.decrypt_slot(PinKind::Duress)?,
            PinKind::Duress => self.decrypt_slot(PinKind::Primary)?,
        };
        if let Some(other) = other {
            if bool::from(pin.as_bytes().ct_eq(other.as_bytes())) {
                return Err(AuthError::PinInUse);
            }
        }

        let blob = self.crypto.encrypt(pin)?;
        update_state(self.storage.as_ref(), |s| match kind {
            PinKind::Primary => s.pin_blob = Some(blob.clone()),
            PinKind::Duress => s.duress_blob = Some(blob.clone()),
        })?;
        debug!(?kind, "PIN stored");
        Ok(())
    }

    /// Compare `pin` against every registered PIN
    ///
    /// Both slots are always decrypted and compared so the timing of a
    /// result does not depend on which slot matched. Returns `None` for
    /// a miss; fails with [`AuthError::NoPinSet`] when no primary PIN
    /// exists.
    pub fn validate(&self, pin: &str) -> Result<Option<PinMatch>> {
        let primary = self
            .decrypt_slot(PinKind::Primary)?
            .ok_or(AuthError::NoPinSet)?;
        let duress = self.decrypt_slot(PinKind::Duress)?;

        let entered = Zeroizing::new(pin.as_bytes().to_vec());
        let primary_hit = entered.ct_eq(primary.as_bytes());
        let duress_hit = match &duress {
            Some(d) => entered.ct_eq(d.as_bytes()),
            // Compare against the primary again so the amount of work is
            // the same whether or not a duress PIN exists
            None => {
                let _ = entered.ct_eq(primary.as_bytes());
                subtle::Choice::from(0)
            }
        };

        if bool::from(primary_hit) {
            Ok(Some(PinMatch::Primary))
        } else if bool::from(duress_hit) {
            Ok(Some(PinMatch::Duress))
        } else {
            Ok(None)
        }
    }

    /// Compare `pin` against the registered PINs without requiring a
    /// primary to exist; used by the set flow's uniqueness check
    pub fn registered_match(&self, pin: &str) -> Result<Option<PinMatch>> {
        let primary = self.decrypt_slot(PinKind::Primary)?;
        let duress = self.decrypt_slot(PinKind::Duress)?;

        if let Some(p) = primary {
            if bool::from(pin.as_bytes().ct_eq(p.as_bytes())) {
                return Ok(Some(PinMatch::Primary));
            }
        }
        if let Some(d) = duress {
            if bool::from(pin.as_bytes().ct_eq(d.as_bytes())) {
                return Ok(Some(PinMatch::Duress));
            }
        }
        Ok(None)
    }

    /// Remove the PIN in the given slot
    pub fn clear(&self, kind: PinKind) -> Result<()> {
        update_state(self.storage.as_ref(), |s| match kind {
            PinKind::Primary => s.pin_blob = None,
            PinKind::Duress => s.duress_blob = None,
        })?;
        debug!(?kind, "PIN cleared");
        Ok(())
    }

    /// Wipe the whole gate state: PINs, counters, and toggles
    ///
    /// Called by the reset flow after the master key was removed.
    pub fn clear_all(&self) -> Result<()> {
        self.storage.save(&Default::default())?;
        debug!("gate state wiped");
        Ok(())
    }

    /// Persist the biometric unlock toggle
    pub fn set_biometrics_enabled(&self, enabled: bool) -> Result<()> {
        update_state(self.storage.as_ref(), |s| s.biometrics_enabled = enabled)?;
        Ok(())
    }

    /// Whether the user enabled biometric unlock
    pub fn is_biometrics_enabled(&self) -> Result<bool> {
        Ok(self.storage.load()?.biometrics_enabled)
    }

    fn decrypt_slot(&self, kind: PinKind) -> Result<Option<Zeroizing<String>>> {
        let state = self.storage.load()?;
        let blob = match kind {
            PinKind::Primary => state.pin_blob,
            PinKind::Duress => state.duress_blob,
        };
        match blob {
            Some(blob) => Ok(Some(Zeroizing::new(self.crypto.decrypt(&blob)?))),
            None => Ok(None),
        }
    }
}

/// Validate PIN shape: exact length, digits only
pub fn check_format(pin: &str) -> Result<()> {
    if pin.len() != PIN_LENGTH {
        return Err(AuthError::InvalidPinLength(PIN_LENGTH));
    }
    if !pin.chars().all(|c| c.is_ascii_digit()) {
        return Err(AuthError::InvalidPinFormat);
    }
    Ok(())
}
