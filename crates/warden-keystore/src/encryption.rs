//! Versioned secret encryption over the keystore
//!
//! Every write goes out under the current key with a version tag. Reads
//! route on that tag: tagged blobs use the current key, untagged blobs
//! were written by the previous key-generation scheme and decrypt through
//! the legacy key. The tag is what lets key-generation parameters evolve
//! without stranding secrets written under the old scheme.

use std::sync::{Arc, Mutex};

use crate::cipher::{Cipher, SEPARATOR};
use crate::error::{KeystoreError, Result};
use crate::keystore::Keystore;

/// Version tag prefixed to blobs written under the current scheme
pub const VERSION_TAG: &str = "v2";

/// Encrypts and decrypts opaque string secrets
pub struct EncryptionManager {
    keystore: Arc<Keystore>,
    /// One encryption in flight at a time per instance
    op_lock: Mutex<()>,
}

impl EncryptionManager {
    /// Create a manager over `keystore`
    pub fn new(keystore: Arc<Keystore>) -> Self {
        Self {
            keystore,
            op_lock: Mutex::new(()),
        }
    }

    /// The keystore this manager encrypts through
    pub fn keystore(&self) -> &Arc<Keystore> {
        &self.keystore
    }

    /// Encrypt `data` under the current key
    pub fn encrypt(&self, data: &str) -> Result<String> {
        let _guard = self.lock_ops()?;
        let key = self.keystore.key()?;
        let blob = Cipher::encrypt(data.as_bytes(), &key)?;
        Ok(format!("{}{}{}", VERSION_TAG, SEPARATOR, blob))
    }

    /// Decrypt a blob, routing on its version tag
    ///
    /// An untagged blob with no legacy key present is a configuration
    /// error, not an empty result: the secret is unrecoverable and the
    /// caller must surface that.
    pub fn decrypt(&self, blob: &str) -> Result<String> {
        let _guard = self.lock_ops()?;

        let plain = match blob.strip_prefix(&Self::version_prefix()) {
            Some(rest) => {
                let key = self.keystore.key()?;
                Cipher::decrypt(rest, &key)?
            }
            None => {
                let key = self
                    .keystore
                    .legacy_key()?
                    .ok_or(KeystoreError::LegacyKeyMissing)?;
                Cipher::decrypt(blob, &key)?
            }
        };

        String::from_utf8(plain).map_err(|_| KeystoreError::CipherFailure)
    }

    fn version_prefix() -> String {
        format!("{}{}", VERSION_TAG, SEPARATOR)
    }

    fn lock_ops(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.op_lock
            .lock()
            .map_err(|_| KeystoreError::Store("encryption lock poisoned".to_string()))
    }
}
