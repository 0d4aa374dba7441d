//! Property-based tests for device bindings and the payload codec
//!
//! 1. **Binding integrity**: a chain signed for one (host, service, user,
//!    device) tuple never verifies for a tuple that differs in any member
//! 2. **Username case**: the username is hashed lowercased, so case changes
//!    alone keep the chain valid
//! 3. **Payload fail-closed**: an envelope whose wrapped key or signature was
//!    altered never opens

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use cipherise_core::{
    Environment, PayloadError,
    binding::{sign_device, verify_device},
    payload::{decode, seal},
};
use cipherise_crypto::{Binding, KeyPair, pad_id};
use cipherise_proto::{LevelMap, PayloadEnvelope, PayloadResponse};
use proptest::prelude::*;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

const HOST: &str = "https://cipherise.example.com/";

#[derive(Clone)]
struct SeededEnv(Arc<Mutex<ChaCha20Rng>>);

impl Environment for SeededEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(
        &self,
        _duration: std::time::Duration,
    ) -> impl std::future::Future<Output = ()> + Send {
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }
}

fn keys(seed: u64) -> KeyPair {
    KeyPair::generate(&mut ChaCha20Rng::seed_from_u64(seed)).unwrap()
}

fn sp() -> &'static KeyPair {
    static KEYS: OnceLock<KeyPair> = OnceLock::new();
    KEYS.get_or_init(|| keys(100))
}

fn device() -> &'static [KeyPair; 4] {
    static KEYS: OnceLock<[KeyPair; 4]> = OnceLock::new();
    KEYS.get_or_init(|| [keys(101), keys(102), keys(103), keys(104)])
}

fn wire_keys() -> LevelMap {
    device()
        .iter()
        .zip(1..=4u8)
        .map(|(pair, level)| (level.to_string(), pair.public().to_pem().unwrap()))
        .collect()
}

fn id() -> impl Strategy<Value = String> {
    "[a-z0-9]{1,24}"
}

fn sealed_reply() -> &'static PayloadEnvelope {
    static ENVELOPE: OnceLock<PayloadEnvelope> = OnceLock::new();
    ENVELOPE.get_or_init(|| {
        let env = SeededEnv(Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(7))));
        seal(&PayloadResponse::default(), sp().public(), device()[0].private(), &env).unwrap()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_changed_binding_member_invalidates_chain(
        service in id(),
        user in id(),
        dev in id(),
        other in id(),
        member in 0usize..3,
    ) {
        // Ids are hashed left-padded with '0' to 16 characters
        let differs = match member {
            0 => pad_id(&other) != pad_id(&service),
            1 => other != user,
            _ => pad_id(&other) != pad_id(&dev),
        };
        prop_assume!(differs);

        let binding = Binding::new(HOST, &service, &user, &dev);
        let signatures = sign_device(sp().private(), &binding, &wire_keys()).unwrap();
        prop_assert!(verify_device(sp().public(), &binding, &wire_keys(), &signatures));

        let changed = match member {
            0 => Binding { service_id: &other, ..binding },
            1 => Binding { username: &other, ..binding },
            _ => Binding { device_id: &other, ..binding },
        };
        prop_assert!(!verify_device(sp().public(), &changed, &wire_keys(), &signatures));
    }

    #[test]
    fn prop_username_case_is_ignored(user in "[a-z]{1,12}") {
        let binding = Binding::new(HOST, "sp-1", &user, "dev-1");
        let signatures = sign_device(sp().private(), &binding, &wire_keys()).unwrap();

        let upper = user.to_uppercase();
        let shouted = Binding { username: &upper, ..binding };
        prop_assert!(verify_device(sp().public(), &shouted, &wire_keys(), &signatures));
    }

    #[test]
    fn prop_tampered_envelope_never_opens(index in 0usize..512, tamper_key in any::<bool>()) {
        let mut envelope = sealed_reply().clone();
        let target = if tamper_key { &mut envelope.key } else { &mut envelope.signature };
        let index = index % target.len();
        let flipped: String = target
            .char_indices()
            .map(|(i, c)| if i == index { if c == '0' { '1' } else { '0' } } else { c })
            .collect();
        *target = flipped;

        let result = decode(&envelope, device()[0].public(), sp().private());
        prop_assert!(result.is_err(), "tampered envelope opened: {:?}", result);
    }
}

#[test]
fn untampered_envelope_opens() {
    let response = decode(sealed_reply(), device()[0].public(), sp().private()).unwrap();
    assert_eq!(response, PayloadResponse::default());
}

#[test]
fn wrong_sender_key_is_a_signature_failure() {
    assert_eq!(
        decode(sealed_reply(), device()[1].public(), sp().private()),
        Err(PayloadError::InvalidSignature)
    );
}
