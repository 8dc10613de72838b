//! Key vault abstraction over platform secure key stores
//!
//! The vault owns symmetric key material and exposes only seal/open
//! operations on it. Raw key bytes never cross the trait boundary, so a
//! hardware-backed implementation (Android Keystore, Secure Enclave, TPM)
//! can be substituted without touching the callers.
//!
//! Two implementations ship with the crate:
//!
//! - [`FileKeyVault`] for hosts without a platform key store. Key material
//!   is protected only by file permissions.
//! - [`MemoryKeyVault`] for tests. It can simulate the two failure classes
//!   a hardware store produces: pending user authentication and permanent
//!   key invalidation.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::{KeystoreError, Result};

/// Size of the symmetric key material in bytes
pub const KEY_SIZE: usize = 32;
/// Size of the cipher nonce in bytes
pub const NONCE_SIZE: usize = 12;

/// Generation parameters for a vault key
#[derive(Clone, Debug)]
pub struct KeySpec {
    /// Whether seal/open require prior user authentication
    pub require_user_auth: bool,
    /// How long a user authentication remains valid
    pub auth_validity: Duration,
}

impl Default for KeySpec {
    fn default() -> Self {
        Self {
            require_user_auth: true,
            auth_validity: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Capability interface to a secure key store
///
/// Implementations are synchronous and single-writer. Failures must map
/// onto the [`KeystoreError`] variants that the validation path classifies:
/// [`KeystoreError::UserNotAuthenticated`] when the key is usable but gated
/// behind a pending user authentication, [`KeystoreError::KeyInvalidated`]
/// when the key handle is permanently unusable.
pub trait KeyVault: Send + Sync {
    /// Generate fresh key material under `alias`, replacing any existing entry
    fn generate(&self, alias: &str, spec: &KeySpec) -> Result<()>;

    /// Whether an entry exists under `alias`
    fn contains(&self, alias: &str) -> Result<bool>;

    /// Delete the entry under `alias`; succeeds if the alias is absent
    fn delete(&self, alias: &str) -> Result<()>;

    /// Encrypt `plaintext` with the key under `alias` and the caller's nonce
    fn seal(&self, alias: &str, nonce: &[u8; NONCE_SIZE], plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt `ciphertext` with the key under `alias` and the caller's nonce
    fn open(&self, alias: &str, nonce: &[u8; NONCE_SIZE], ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// Opaque handle to a key resident in a vault
///
/// The handle carries no key material, only the alias and a reference to
/// the vault that owns the key.
#[derive(Clone)]
pub struct HardwareKey {
    alias: String,
    vault: Arc<dyn KeyVault>,
}

impl HardwareKey {
    pub(crate) fn new(alias: impl Into<String>, vault: Arc<dyn KeyVault>) -> Self {
        Self {
            alias: alias.into(),
            vault,
        }
    }

    /// The alias this handle refers to
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub(crate) fn seal(&self, nonce: &[u8; NONCE_SIZE], plaintext: &[u8]) -> Result<Vec<u8>> {
        self.vault.seal(&self.alias, nonce, plaintext)
    }

    pub(crate) fn open(&self, nonce: &[u8; NONCE_SIZE], ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.vault.open(&self.alias, nonce, ciphertext)
    }
}

impl fmt::Debug for HardwareKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HardwareKey")
            .field("alias", &self.alias)
            .finish()
    }
}

/// Generate a fresh nonce from the OS RNG
pub(crate) fn random_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

fn random_key() -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

fn aead_seal(material: &[u8; KEY_SIZE], nonce: &[u8; NONCE_SIZE], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new_from_slice(material)
        .map_err(|e| KeystoreError::Store(format!("invalid key material: {}", e)))?;
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| KeystoreError::CipherFailure)
}

fn aead_open(material: &[u8; KEY_SIZE], nonce: &[u8; NONCE_SIZE], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new_from_slice(material)
        .map_err(|e| KeystoreError::Store(format!("invalid key material: {}", e)))?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| KeystoreError::CipherFailure)
}

mod hex_key {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::KEY_SIZE;

    pub fn serialize<S>(bytes: &[u8; KEY_SIZE], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; KEY_SIZE], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("invalid key length"))
    }
}

#[derive(Serialize, Deserialize, Clone)]
struct StoredKey {
    #[serde(with = "hex_key")]
    material: [u8; KEY_SIZE],
}

impl Drop for StoredKey {
    fn drop(&mut self) {
        self.material.zeroize();
    }
}

/// File-backed key vault
///
/// Stores key material in a single keyring file with restrictive
/// permissions. Intended for hosts where no platform key store is
/// available; the key is device-bound only as far as the filesystem is.
/// User-authentication gating is not enforced by this backend.
pub struct FileKeyVault {
    path: PathBuf,
    entries: Mutex<HashMap<String, StoredKey>>,
}

impl FileKeyVault {
    /// Open the keyring at `path`, creating parent directories as needed
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let entries = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Default keyring location under the user data directory
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("warden")
            .join("keyring.json")
    }

    fn persist(&self, entries: &HashMap<String, StoredKey>) -> Result<()> {
        let contents = serde_json::to_string_pretty(entries)?;

        // Write atomically
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &contents)?;
        fs::rename(&temp_path, &self.path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, StoredKey>>> {
        self.entries
            .lock()
            .map_err(|_| KeystoreError::Store("keyring lock poisoned".to_string()))
    }
}

impl KeyVault for FileKeyVault {
    fn generate(&self, alias: &str, _spec: &KeySpec) -> Result<()> {
        let mut entries = self.lock()?;
        entries.insert(
            alias.to_string(),
            StoredKey {
                material: random_key(),
            },
        );
        self.persist(&entries)
    }

    fn contains(&self, alias: &str) -> Result<bool> {
        Ok(self.lock()?.contains_key(alias))
    }

    fn delete(&self, alias: &str) -> Result<()> {
        let mut entries = self.lock()?;
        if entries.remove(alias).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }

    fn seal(&self, alias: &str, nonce: &[u8; NONCE_SIZE], plaintext: &[u8]) -> Result<Vec<u8>> {
        let entries = self.lock()?;
        let key = entries.get(alias).ok_or(KeystoreError::KeyInvalidated)?;
        aead_seal(&key.material, nonce, plaintext)
    }

    fn open(&self, alias: &str, nonce: &[u8; NONCE_SIZE], ciphertext: &[u8]) -> Result<Vec<u8>> {
        let entries = self.lock()?;
        let key = entries.get(alias).ok_or(KeystoreError::KeyInvalidated)?;
        aead_open(&key.material, nonce, ciphertext)
    }
}

struct MemoryKey {
    material: [u8; KEY_SIZE],
    spec: KeySpec,
    invalidated: bool,
}

impl Drop for MemoryKey {
    fn drop(&mut self) {
        self.material.zeroize();
    }
}

struct MemoryVaultState {
    keys: HashMap<String, MemoryKey>,
    auth_satisfied: bool,
}

/// In-memory key vault for tests
///
/// Behaves like a hardware store: keys generated with
/// `require_user_auth` refuse seal/open while authentication is not
/// satisfied, and [`MemoryKeyVault::invalidate`] simulates an OS-side
/// credential change permanently invalidating a key.
pub struct MemoryKeyVault {
    state: Mutex<MemoryVaultState>,
}

impl MemoryKeyVault {
    /// Create an empty vault with user authentication satisfied
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryVaultState {
                keys: HashMap::new(),
                auth_satisfied: true,
            }),
        }
    }

    /// Simulate the user passing (or losing) device authentication
    pub fn set_auth_satisfied(&self, satisfied: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.auth_satisfied = satisfied;
        }
    }

    /// Simulate OS-side invalidation of the key under `alias`
    pub fn invalidate(&self, alias: &str) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(key) = state.keys.get_mut(alias) {
                key.invalidated = true;
            }
        }
    }

    /// Number of live entries, invalidated ones included
    pub fn key_count(&self) -> usize {
        self.state.lock().map(|s| s.keys.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryVaultState>> {
        self.state
            .lock()
            .map_err(|_| KeystoreError::Store("vault lock poisoned".to_string()))
    }
}

impl Default for MemoryKeyVault {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyVault for MemoryKeyVault {
    fn generate(&self, alias: &str, spec: &KeySpec) -> Result<()> {
        let mut state = self.lock()?;
        state.keys.insert(
            alias.to_string(),
            MemoryKey {
                material: random_key(),
                spec: spec.clone(),
                invalidated: false,
            },
        );
        Ok(())
    }

    fn contains(&self, alias: &str) -> Result<bool> {
        Ok(self.lock()?.keys.contains_key(alias))
    }

    fn delete(&self, alias: &str) -> Result<()> {
        self.lock()?.keys.remove(alias);
        Ok(())
    }

    fn seal(&self, alias: &str, nonce: &[u8; NONCE_SIZE], plaintext: &[u8]) -> Result<Vec<u8>> {
        let state = self.lock()?;
        let key = state.keys.get(alias).ok_or(KeystoreError::KeyInvalidated)?;
        if key.invalidated {
            return Err(KeystoreError::KeyInvalidated);
        }
        if key.spec.require_user_auth && !state.auth_satisfied {
            return Err(KeystoreError::UserNotAuthenticated);
        }
        aead_seal(&key.material, nonce, plaintext)
    }

    fn open(&self, alias: &str, nonce: &[u8; NONCE_SIZE], ciphertext: &[u8]) -> Result<Vec<u8>> {
        let state = self.lock()?;
        let key = state.keys.get(alias).ok_or(KeystoreError::KeyInvalidated)?;
        if key.invalidated {
            return Err(KeystoreError::KeyInvalidated);
        }
        if key.spec.require_user_auth && !state.auth_satisfied {
            return Err(KeystoreError::UserNotAuthenticated);
        }
        aead_open(&key.material, nonce, ciphertext)
    }
}
