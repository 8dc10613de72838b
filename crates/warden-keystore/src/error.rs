//! Error types for the Warden keystore

use thiserror::Error;

/// Result type alias for keystore operations
pub type Result<T> = std::result::Result<T, KeystoreError>;

/// Errors that can occur in keystore operations
#[derive(Debug, Error)]
pub enum KeystoreError {
    /// Blob string does not match the expected framing
    #[error("malformed blob: {0}")]
    MalformedBlob(String),

    /// Cipher operation failed (wrong key, corrupted ciphertext, or tag mismatch)
    #[error("cipher operation failed")]
    CipherFailure,

    /// The key requires user authentication that has not been satisfied
    #[error("user authentication required")]
    UserNotAuthenticated,

    /// The key was permanently invalidated by the key store
    #[error("key permanently invalidated")]
    KeyInvalidated,

    /// A legacy-format blob was presented but no legacy key exists
    #[error("legacy blob present but no legacy key exists")]
    LegacyKeyMissing,

    /// Key store backend error
    #[error("key store error: {0}")]
    Store(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for KeystoreError {
    fn from(e: serde_json::Error) -> Self {
        KeystoreError::Serialization(e.to_string())
    }
}
