#![no_main]

use std::sync::{Arc, OnceLock};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use warden_auth::{FlowKind, MemoryGateStorage, PinGate, PinKind, SetPinFlow, PIN_LENGTH};
use warden_keystore::{EncryptionManager, Keystore, KeystoreConfig, MemoryKeyVault};

#[derive(Arbitrary, Debug)]
enum Event {
    Digit(u8),
    Delete,
    Raw(char),
}

fn pin_gate() -> Arc<PinGate> {
    static GATE: OnceLock<Arc<PinGate>> = OnceLock::new();
    GATE.get_or_init(|| {
        let vault = Arc::new(MemoryKeyVault::new());
        let keystore = Keystore::new(vault, KeystoreConfig::ephemeral())
            .expect("ephemeral keystore");
        let crypto = Arc::new(EncryptionManager::new(Arc::new(keystore)));
        Arc::new(PinGate::new(crypto, Arc::new(MemoryGateStorage::new())))
    })
    .clone()
}

fuzz_target!(|events: Vec<Event>| {
    let mut flow = SetPinFlow::new(pin_gate(), PinKind::Duress, FlowKind::Edit);

    for event in events {
        match event {
            Event::Digit(d) => {
                let _ = flow.on_digit((b'0' + (d % 10)) as char);
            }
            Event::Delete => {
                flow.on_delete();
            }
            Event::Raw(c) => {
                let _ = flow.on_digit(c);
            }
        }
        // The buffer can never outgrow the fixed PIN length
        assert!(flow.entered_digits() <= PIN_LENGTH);
    }
});
