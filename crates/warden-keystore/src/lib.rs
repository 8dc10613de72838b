//! Warden keystore - hardware-backed secret encryption
//!
//! This crate is the encryption-at-rest path of the Warden security core:
//! - Key vault abstraction over platform secure key stores
//! - Lazy master-key provisioning, validation, and removal
//! - Versioned blob encryption with a legacy-key fallback for old blobs
//!
//! Key material never leaves the vault backend; callers only ever hold an
//! opaque [`HardwareKey`] handle.

pub mod cipher;
pub mod encryption;
pub mod error;
pub mod keystore;
pub mod vault;

pub use cipher::{Cipher, SEPARATOR};
pub use encryption::{EncryptionManager, VERSION_TAG};
pub use error::{KeystoreError, Result};
pub use keystore::{Keystore, KeystoreConfig, KeystoreValidation, DEFAULT_ALIAS, DEFAULT_LEGACY_ALIAS};
pub use vault::{FileKeyVault, HardwareKey, KeySpec, KeyVault, MemoryKeyVault, NONCE_SIZE};
