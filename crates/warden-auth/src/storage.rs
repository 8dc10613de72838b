//! Persisted gate state
//!
//! Everything the gate needs across restarts lives in one small record:
//! the encrypted PIN blobs, the biometrics toggle, and the failed-attempt
//! counter with its uptime anchor. The record never contains plaintext
//! secrets; PIN blobs go through the encrypted-secret path before landing
//! here.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};

/// Gate state as persisted by a [`GateStorage`] backend
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GateState {
    /// Encrypted primary PIN blob
    pub pin_blob: Option<String>,
    /// Encrypted duress PIN blob
    pub duress_blob: Option<String>,
    /// Whether the user enabled biometric unlock
    pub biometrics_enabled: bool,
    /// Consecutive failed unlock attempts
    pub failed_attempts: u32,
    /// Uptime at the last failed attempt, in milliseconds
    pub last_failure_uptime_ms: Option<u64>,
}

/// Storage backend for the gate state
pub trait GateStorage: Send + Sync {
    /// Load the current state; absent storage yields the default state
    fn load(&self) -> Result<GateState>;

    /// Replace the persisted state
    fn save(&self, state: &GateState) -> Result<()>;
}

/// Load, mutate, and save the gate state in one step
pub fn update_state<F>(storage: &dyn GateStorage, f: F) -> Result<GateState>
where
    F: FnOnce(&mut GateState),
{
    let mut state = storage.load()?;
    f(&mut state);
    storage.save(&state)?;
    Ok(state)
}

/// File-backed gate storage
pub struct FileGateStorage {
    path: PathBuf,
}

impl FileGateStorage {
    /// Create storage at `path`, creating parent directories as needed
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    /// Default location under the user data directory
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("warden")
            .join("gate.json")
    }
}

impl GateStorage for FileGateStorage {
    fn load(&self) -> Result<GateState> {
        if !self.path.exists() {
            return Ok(GateState::default());
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, state: &GateState) -> Result<()> {
        let contents = serde_json::to_string_pretty(state)?;

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
}

/// In-memory gate storage for tests
pub struct MemoryGateStorage {
    state: Mutex<GateState>,
}

impl MemoryGateStorage {
    /// Create empty storage
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState::default()),
        }
    }
}

impl Default for MemoryGateStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl GateStorage for MemoryGateStorage {
    fn load(&self) -> Result<GateState> {
        self.state
            .lock()
            .map(|s| s.clone())
            .map_err(|_| AuthError::Storage("state lock poisoned".to_string()))
    }

    fn save(&self, state: &GateState) -> Result<()> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| AuthError::Storage("state lock poisoned".to_string()))?;
        *guard = state.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_storage_defaults_when_absent() {
        let dir = tempdir().unwrap();
        let storage = FileGateStorage::new(dir.path().join("gate.json")).unwrap();

        let state = storage.load().unwrap();
        assert!(state.pin_blob.is_none());
        assert_eq!(state.failed_attempts, 0);
    }

    #[test]
    fn test_file_storage_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gate.json");
        let storage = FileGateStorage::new(path.clone()).unwrap();

        let state = update_state(&storage, |s| {
            s.pin_blob = Some("v2:blob".to_string());
            s.failed_attempts = 2;
            s.last_failure_uptime_ms = Some(1234);
        })
        .unwrap();
        assert_eq!(state.failed_attempts, 2);

        // A fresh instance reads the same record
        let reopened = FileGateStorage::new(path).unwrap();
        let loaded = reopened.load().unwrap();
        assert_eq!(loaded.pin_blob.as_deref(), Some("v2:blob"));
        assert_eq!(loaded.failed_attempts, 2);
        assert_eq!(loaded.last_failure_uptime_ms, Some(1234));
    }

    #[test]
    fn test_memory_storage_round_trip() {
        let storage = MemoryGateStorage::new();
        update_state(&storage, |s| s.biometrics_enabled = true).unwrap();
        assert!(storage.load().unwrap().biometrics_enabled);
    }
}
