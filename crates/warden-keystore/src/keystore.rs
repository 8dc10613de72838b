//! Hardware key provider
//!
//! Owns the vault alias of the app's master key: creates the key lazily on
//! first use, resolves the legacy alias for old-format blobs, deletes the
//! key on reset, and probes the store health with a persisted sample
//! round-trip.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cipher::Cipher;
use crate::error::{KeystoreError, Result};
use crate::vault::{HardwareKey, KeySpec, KeyVault};

/// Alias of the current-generation master key
pub const DEFAULT_ALIAS: &str = "warden-master-v2";
/// Alias used by the previous key-generation scheme
pub const DEFAULT_LEGACY_ALIAS: &str = "warden-master";

/// Fixed sample value round-tripped by [`Keystore::validate`]
const VALIDATION_SAMPLE: &[u8] = b"warden-keystore-probe";

/// Keystore configuration
#[derive(Clone, Debug)]
pub struct KeystoreConfig {
    /// Alias for the current key
    pub alias: String,
    /// Alias for the legacy key, if the host ever had one
    pub legacy_alias: Option<String>,
    /// Generation parameters for new keys
    pub key_spec: KeySpec,
    /// Where the validation sample is persisted; `None` keeps it in memory
    pub state_path: Option<PathBuf>,
}

impl Default for KeystoreConfig {
    fn default() -> Self {
        Self {
            alias: DEFAULT_ALIAS.to_string(),
            legacy_alias: Some(DEFAULT_LEGACY_ALIAS.to_string()),
            key_spec: KeySpec::default(),
            state_path: Some(Self::default_state_path()),
        }
    }
}

impl KeystoreConfig {
    /// Default location of the persisted keystore state
    pub fn default_state_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("warden")
            .join("keystore.json")
    }

    /// Configuration that keeps all keystore state in memory
    pub fn ephemeral() -> Self {
        Self {
            state_path: None,
            ..Default::default()
        }
    }

    /// Configuration with a custom state path
    pub fn with_state_path(path: PathBuf) -> Self {
        Self {
            state_path: Some(path),
            ..Default::default()
        }
    }
}

/// Outcome of a keystore health probe
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeystoreValidation {
    /// The current key encrypts and decrypts correctly
    KeyIsValid,
    /// The key is unusable and must be removed and recreated
    KeyIsInvalid,
    /// The key is gated behind a pending user authentication
    UserNotAuthenticated,
}

#[derive(Serialize, Deserialize, Default)]
struct KeystoreState {
    /// Encrypted validation sample, written once per key generation
    sample: Option<String>,
}

/// Provider of the app's hardware-backed master key
pub struct Keystore {
    vault: Arc<dyn KeyVault>,
    config: KeystoreConfig,
    /// Serializes get-or-create so two callers cannot race two keys into one alias
    creation_lock: Mutex<()>,
    state: Mutex<KeystoreState>,
}

impl Keystore {
    /// Create a keystore over `vault`, loading any persisted state
    pub fn new(vault: Arc<dyn KeyVault>, config: KeystoreConfig) -> Result<Self> {
        let state = match &config.state_path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)?;
                serde_json::from_str(&contents)?
            }
            _ => KeystoreState::default(),
        };

        Ok(Self {
            vault,
            config,
            creation_lock: Mutex::new(()),
            state: Mutex::new(state),
        })
    }

    /// The configured current-key alias
    pub fn alias(&self) -> &str {
        &self.config.alias
    }

    /// Return the current key, creating it if absent or unretrievable
    pub fn key(&self) -> Result<HardwareKey> {
        let _guard = self
            .creation_lock
            .lock()
            .map_err(|_| KeystoreError::Store("creation lock poisoned".to_string()))?;

        match self.vault.contains(&self.config.alias) {
            Ok(true) => {}
            Ok(false) => {
                debug!(alias = %self.config.alias, "creating master key");
                self.vault.generate(&self.config.alias, &self.config.key_spec)?;
            }
            Err(e) => {
                warn!(alias = %self.config.alias, error = %e, "key unretrievable, recreating");
                if let Err(e) = self.vault.delete(&self.config.alias) {
                    warn!(alias = %self.config.alias, error = %e, "stale key removal failed");
                }
                self.vault.generate(&self.config.alias, &self.config.key_spec)?;
            }
        }

        Ok(HardwareKey::new(self.config.alias.clone(), self.vault.clone()))
    }

    /// Return the previous-generation key if one still exists
    pub fn legacy_key(&self) -> Result<Option<HardwareKey>> {
        let Some(alias) = &self.config.legacy_alias else {
            return Ok(None);
        };
        if self.vault.contains(alias)? {
            Ok(Some(HardwareKey::new(alias.clone(), self.vault.clone())))
        } else {
            Ok(None)
        }
    }

    /// Delete the current key and its validation sample
    ///
    /// Idempotent. Store-level failures are logged and swallowed so a
    /// reset flow can always proceed.
    pub fn remove_key(&self) {
        if let Err(e) = self.vault.delete(&self.config.alias) {
            warn!(alias = %self.config.alias, error = %e, "key removal failed");
        }

        // The sample was written under the removed key; a fresh key must
        // write a fresh sample.
        match self.state.lock() {
            Ok(mut state) => {
                state.sample = None;
                if let Err(e) = self.persist_state(&state) {
                    warn!(error = %e, "keystore state cleanup failed");
                }
            }
            Err(_) => warn!("keystore state lock poisoned during key removal"),
        }
        debug!(alias = %self.config.alias, "master key removed");
    }

    /// Probe the store by round-tripping the validation sample
    pub fn validate(&self) -> KeystoreValidation {
        match self.try_validate() {
            Ok(()) => KeystoreValidation::KeyIsValid,
            Err(KeystoreError::UserNotAuthenticated) => KeystoreValidation::UserNotAuthenticated,
            Err(e) => {
                warn!(error = %e, "keystore validation failed");
                KeystoreValidation::KeyIsInvalid
            }
        }
    }

    fn try_validate(&self) -> Result<()> {
        let key = self.key()?;
        let mut state = self.lock_state()?;

        let blob = match &state.sample {
            Some(blob) => blob.clone(),
            None => {
                let blob = Cipher::encrypt(VALIDATION_SAMPLE, &key)?;
                state.sample = Some(blob.clone());
                self.persist_state(&state)?;
                blob
            }
        };

        let plain = Cipher::decrypt(&blob, &key)?;
        if plain != VALIDATION_SAMPLE {
            return Err(KeystoreError::CipherFailure);
        }
        Ok(())
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, KeystoreState>> {
        self.state
            .lock()
            .map_err(|_| KeystoreError::Store("state lock poisoned".to_string()))
    }

    fn persist_state(&self, state: &KeystoreState) -> Result<()> {
        let Some(path) = &self.config.state_path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(state)?;
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &contents)?;
        fs::rename(&temp_path, path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::MemoryKeyVault;

    fn memory_keystore() -> (Arc<MemoryKeyVault>, Keystore) {
        let vault = Arc::new(MemoryKeyVault::new());
        let keystore = Keystore::new(vault.clone(), KeystoreConfig::ephemeral()).unwrap();
        (vault, keystore)
    }

    #[test]
    fn test_key_created_lazily_once() {
        let (vault, keystore) = memory_keystore();
        assert_eq!(vault.key_count(), 0);

        let first = keystore.key().unwrap();
        let second = keystore.key().unwrap();
        assert_eq!(first.alias(), second.alias());
        assert_eq!(vault.key_count(), 1);
    }

    #[test]
    fn test_legacy_key_absent_by_default() {
        let (_vault, keystore) = memory_keystore();
        assert!(keystore.legacy_key().unwrap().is_none());
    }

    #[test]
    fn test_legacy_key_found_when_present() {
        let (vault, keystore) = memory_keystore();
        vault
            .generate(DEFAULT_LEGACY_ALIAS, &KeySpec::default())
            .unwrap();

        let legacy = keystore.legacy_key().unwrap().unwrap();
        assert_eq!(legacy.alias(), DEFAULT_LEGACY_ALIAS);
    }

    #[test]
    fn test_remove_key_is_idempotent() {
        let (vault, keystore) = memory_keystore();
        keystore.key().unwrap();
        assert_eq!(vault.key_count(), 1);

        keystore.remove_key();
        assert_eq!(vault.key_count(), 0);

        // Removing again must not fail
        keystore.remove_key();
    }

    #[test]
    fn test_validate_healthy_store() {
        let (_vault, keystore) = memory_keystore();
        assert_eq!(keystore.validate(), KeystoreValidation::KeyIsValid);
        // Second run decrypts the persisted sample
        assert_eq!(keystore.validate(), KeystoreValidation::KeyIsValid);
    }

    #[test]
    fn test_validate_user_not_authenticated() {
        let (vault, keystore) = memory_keystore();
        keystore.key().unwrap();
        vault.set_auth_satisfied(false);

        assert_eq!(
            keystore.validate(),
            KeystoreValidation::UserNotAuthenticated
        );

        vault.set_auth_satisfied(true);
        assert_eq!(keystore.validate(), KeystoreValidation::KeyIsValid);
    }

    #[test]
    fn test_validate_invalidated_key() {
        let (vault, keystore) = memory_keystore();
        // Establish the sample under a healthy key first
        assert_eq!(keystore.validate(), KeystoreValidation::KeyIsValid);

        vault.invalidate(DEFAULT_ALIAS);
        assert_eq!(keystore.validate(), KeystoreValidation::KeyIsInvalid);
    }

    #[test]
    fn test_remove_then_validate_recreates() {
        let (vault, keystore) = memory_keystore();
        assert_eq!(keystore.validate(), KeystoreValidation::KeyIsValid);

        vault.invalidate(DEFAULT_ALIAS);
        assert_eq!(keystore.validate(), KeystoreValidation::KeyIsInvalid);

        // The reset flow removes the key; a fresh key and sample follow
        keystore.remove_key();
        assert_eq!(keystore.validate(), KeystoreValidation::KeyIsValid);
    }

    #[test]
    fn test_state_persisted_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("keystore.json");
        let vault = Arc::new(MemoryKeyVault::new());

        let config = KeystoreConfig {
            state_path: Some(state_path.clone()),
            ..Default::default()
        };
        let keystore = Keystore::new(vault.clone(), config.clone()).unwrap();
        assert_eq!(keystore.validate(), KeystoreValidation::KeyIsValid);

        // A second instance over the same vault reuses the sample
        let reloaded = Keystore::new(vault, config).unwrap();
        assert_eq!(reloaded.validate(), KeystoreValidation::KeyIsValid);
    }
}
