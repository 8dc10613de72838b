//! Error types for the Warden auth gate

use chrono::{DateTime, Utc};
use thiserror::Error;
use warden_keystore::KeystoreError;

/// Result type alias for auth operations
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur in the PIN gate and unlock flow
#[derive(Debug, Error)]
pub enum AuthError {
    /// Entered PIN has the wrong length
    #[error("PIN must be exactly {0} digits")]
    InvalidPinLength(usize),

    /// Entered PIN contains non-digit characters
    #[error("PIN must contain only digits")]
    InvalidPinFormat,

    /// The PIN collides with an already-registered PIN
    #[error("PIN already in use")]
    PinInUse,

    /// No PIN has been stored yet
    #[error("no PIN has been set")]
    NoPinSet,

    /// Unlock attempts are disabled until the given time
    #[error("unlocking disabled until {0}")]
    LockedOut(DateTime<Utc>),

    /// Gate state storage error
    #[error("storage error: {0}")]
    Storage(String),

    /// Keystore error
    #[error(transparent)]
    Keystore(#[from] KeystoreError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for AuthError {
    fn from(e: serde_json::Error) -> Self {
        AuthError::Storage(e.to_string())
    }
}
