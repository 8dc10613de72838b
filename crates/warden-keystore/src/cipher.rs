//! Blob framing around the vault cipher
//!
//! A blob is `base64(nonce)` and `base64(ciphertext)` joined by
//! [`SEPARATOR`]. A fresh nonce is drawn from the OS RNG on every
//! encryption and embedded in the blob, so the same plaintext never
//! produces the same blob twice under one key.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::error::{KeystoreError, Result};
use crate::vault::{random_nonce, HardwareKey, NONCE_SIZE};

/// Separator between the nonce and ciphertext segments of a blob
pub const SEPARATOR: char = ':';

/// Encrypt/decrypt byte payloads against a vault key, framing the result
/// as a printable blob string.
pub struct Cipher;

impl Cipher {
    /// Encrypt `plaintext` with `key`, returning the framed blob
    pub fn encrypt(plaintext: &[u8], key: &HardwareKey) -> Result<String> {
        let nonce = random_nonce();
        let ciphertext = key.seal(&nonce, plaintext)?;
        Ok(format!(
            "{}{}{}",
            BASE64.encode(nonce),
            SEPARATOR,
            BASE64.encode(&ciphertext)
        ))
    }

    /// Decrypt a framed blob with `key`
    pub fn decrypt(blob: &str, key: &HardwareKey) -> Result<Vec<u8>> {
        let (nonce, ciphertext) = Self::parse(blob)?;
        key.open(&nonce, &ciphertext)
    }

    /// Split a blob into its nonce and ciphertext
    ///
    /// Fails with [`KeystoreError::MalformedBlob`] unless the split yields
    /// exactly two base64 segments and the nonce has the cipher's size.
    pub fn parse(blob: &str) -> Result<([u8; NONCE_SIZE], Vec<u8>)> {
        let mut parts = blob.split(SEPARATOR);
        let (nonce_part, ct_part) = match (parts.next(), parts.next(), parts.next()) {
            (Some(nonce), Some(ct), None) => (nonce, ct),
            _ => {
                return Err(KeystoreError::MalformedBlob(
                    "expected two separator-delimited segments".to_string(),
                ))
            }
        };

        let nonce_bytes = BASE64
            .decode(nonce_part)
            .map_err(|e| KeystoreError::MalformedBlob(format!("nonce segment: {}", e)))?;
        let nonce: [u8; NONCE_SIZE] = nonce_bytes
            .try_into()
            .map_err(|_| KeystoreError::MalformedBlob("nonce has wrong length".to_string()))?;

        let ciphertext = BASE64
            .decode(ct_part)
            .map_err(|e| KeystoreError::MalformedBlob(format!("ciphertext segment: {}", e)))?;

        Ok((nonce, ciphertext))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::vault::{KeySpec, KeyVault, MemoryKeyVault};

    fn test_key(alias: &str) -> HardwareKey {
        let vault = Arc::new(MemoryKeyVault::new());
        let spec = KeySpec {
            require_user_auth: false,
            ..Default::default()
        };
        vault.generate(alias, &spec).unwrap();
        HardwareKey::new(alias, vault)
    }

    #[test]
    fn test_round_trip() {
        let key = test_key("k");
        let blob = Cipher::encrypt(b"the quick brown fox", &key).unwrap();
        let plain = Cipher::decrypt(&blob, &key).unwrap();
        assert_eq!(plain, b"the quick brown fox");
    }

    #[test]
    fn test_fresh_nonce_per_encryption() {
        let key = test_key("k");
        let first = Cipher::encrypt(b"same input", &key).unwrap();
        let second = Cipher::encrypt(b"same input", &key).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_wrong_key_fails_hard() {
        let key_a = test_key("a");
        let key_b = test_key("b");

        let blob = Cipher::encrypt(b"secret", &key_a).unwrap();
        let err = Cipher::decrypt(&blob, &key_b).unwrap_err();
        assert!(matches!(err, KeystoreError::CipherFailure));
    }

    #[test]
    fn test_malformed_blob_variants() {
        let key = test_key("k");

        for blob in ["", "no-separator", "a:b:c", ":::", "!!!:???"] {
            let err = Cipher::decrypt(blob, &key).unwrap_err();
            assert!(
                matches!(err, KeystoreError::MalformedBlob(_)),
                "blob {:?} gave {:?}",
                blob,
                err
            );
        }
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        let key = test_key("k");
        let blob = Cipher::encrypt(b"secret", &key).unwrap();

        // Drop the trailing base64 chunk of the ciphertext segment
        let truncated = &blob[..blob.len() - 4];
        let err = Cipher::decrypt(truncated, &key).unwrap_err();
        assert!(matches!(
            err,
            KeystoreError::CipherFailure | KeystoreError::MalformedBlob(_)
        ));
    }
}
