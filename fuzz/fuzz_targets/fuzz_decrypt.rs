#![no_main]

use std::sync::{Arc, OnceLock};

use libfuzzer_sys::fuzz_target;
use warden_keystore::{EncryptionManager, Keystore, KeystoreConfig, MemoryKeyVault};

fn manager() -> &'static EncryptionManager {
    static MANAGER: OnceLock<EncryptionManager> = OnceLock::new();
    MANAGER.get_or_init(|| {
        let vault = Arc::new(MemoryKeyVault::new());
        let keystore = Keystore::new(vault, KeystoreConfig::ephemeral())
            .expect("ephemeral keystore");
        EncryptionManager::new(Arc::new(keystore))
    })
}

fuzz_target!(|data: &[u8]| {
    if let Ok(blob) = std::str::from_utf8(data) {
        // Decrypting attacker-controlled blobs must fail cleanly, never
        // panic or produce plaintext
        assert!(manager().decrypt(blob).is_err());
    }
});
