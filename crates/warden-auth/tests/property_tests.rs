//! Property-based tests for the auth gate using proptest
//!
//! These tests verify invariants that should hold for all valid inputs.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use warden_auth::{
    FlowKind, LockoutPolicy, LockoutState, LockoutTracker, ManualClock, MemoryGateStorage,
    PinGate, PinKind, SetPinFlow, UptimeClock, PIN_LENGTH,
};
use warden_keystore::{EncryptionManager, Keystore, KeystoreConfig, MemoryKeyVault};

fn test_pin_gate() -> Arc<PinGate> {
    let vault = Arc::new(MemoryKeyVault::new());
    let keystore = Keystore::new(vault, KeystoreConfig::ephemeral()).unwrap();
    let crypto = Arc::new(EncryptionManager::new(Arc::new(keystore)));
    Arc::new(PinGate::new(crypto, Arc::new(MemoryGateStorage::new())))
}

fn deadline_of(state: &LockoutState, now: Duration) -> Duration {
    match state {
        LockoutState::Unlocked => now,
        LockoutState::Locked { remaining, .. } => now + *remaining,
    }
}

proptest! {
    // Keep the crypto-heavy cases modest; each runs a full keystore
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn lockout_deadline_never_decreases(
        gaps in prop::collection::vec(0u64..120, 1..12)
    ) {
        let clock = Arc::new(ManualClock::new());
        let tracker = LockoutTracker::new(
            Arc::new(MemoryGateStorage::new()),
            clock.clone(),
            LockoutPolicy::default(),
        );

        let mut previous = Duration::ZERO;
        for gap in gaps {
            clock.advance(Duration::from_secs(gap));
            tracker.record_failure().unwrap();

            let deadline = deadline_of(&tracker.state(), clock.uptime());
            prop_assert!(deadline >= previous);
            previous = deadline;
        }

        // One success resets everything
        tracker.drop_failed_attempts().unwrap();
        prop_assert_eq!(tracker.state(), LockoutState::Unlocked);
    }

    #[test]
    fn flow_buffer_never_exceeds_pin_length(
        events in prop::collection::vec(any::<u8>(), 0..64)
    ) {
        let gate = test_pin_gate();
        let mut flow = SetPinFlow::new(gate, PinKind::Primary, FlowKind::Set);

        for event in events {
            if event == 0xff {
                flow.on_delete();
            } else {
                flow.on_digit((b'0' + (event % 10)) as char).unwrap();
            }
            prop_assert!(flow.entered_digits() <= PIN_LENGTH);
        }
    }

    #[test]
    fn stored_pin_always_validates(pin in "[0-9]{6}") {
        let gate = test_pin_gate();
        gate.store(&pin, PinKind::Primary).unwrap();
        prop_assert!(gate.validate(&pin).unwrap().is_some());

        // Any other PIN misses
        let mut other: Vec<u8> = pin.bytes().collect();
        other[0] = b'0' + ((other[0] - b'0' + 1) % 10);
        let other = String::from_utf8(other).unwrap();
        prop_assert!(gate.validate(&other).unwrap().is_none());
    }
}
