#![no_main]

use libfuzzer_sys::fuzz_target;
use warden_keystore::{Cipher, NONCE_SIZE};

fuzz_target!(|data: &[u8]| {
    if let Ok(blob) = std::str::from_utf8(data) {
        // Parsing must never panic; a successful parse must have
        // recovered a nonce of the cipher's exact size
        if let Ok((nonce, _ciphertext)) = Cipher::parse(blob) {
            assert_eq!(nonce.len(), NONCE_SIZE);
        }
    }
});
