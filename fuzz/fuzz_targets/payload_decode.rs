//! Fuzz target for confirm reply parsing and payload decoding
//!
//! Feeds arbitrary bytes through the path a device's payload answer takes:
//! - JSON body parsing into a confirm reply
//! - Envelope completeness and signature checks
//! - Hex decoding, RSA unwrap, AES-CFB decryption, plaintext parsing
//!
//! The fuzzer should NEVER panic. Every invalid input must come back as an
//! error, and a forged envelope must never decode.

#![no_main]

use std::sync::OnceLock;

use cipherise_core::payload::decode;
use cipherise_crypto::KeyPair;
use cipherise_proto::{ConfirmReply, PayloadEnvelope, parse};
use libfuzzer_sys::fuzz_target;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

fn keys() -> &'static (KeyPair, KeyPair) {
    static KEYS: OnceLock<(KeyPair, KeyPair)> = OnceLock::new();
    KEYS.get_or_init(|| {
        let mut rng = ChaCha20Rng::seed_from_u64(0xF022);
        (KeyPair::generate(&mut rng).unwrap(), KeyPair::generate(&mut rng).unwrap())
    })
}

fuzz_target!(|data: &[u8]| {
    let (service, device) = keys();

    if let Ok(reply) = parse::<ConfirmReply>(data) {
        if let Some(envelope) = reply.payload {
            let decoded = decode(&envelope, device.public(), service.private());
            assert!(decoded.is_err(), "forged envelope decoded");
        }
    }

    // Split raw bytes across the three members to reach the crypto checks
    let text = String::from_utf8_lossy(data);
    let third = text.len() / 3;
    if let (Some(a), Some(b), Some(c)) =
        (text.get(..third), text.get(third..2 * third), text.get(2 * third..))
    {
        let envelope = PayloadEnvelope { data: a.into(), key: b.into(), signature: c.into() };
        assert!(decode(&envelope, device.public(), service.private()).is_err());
    }
});
