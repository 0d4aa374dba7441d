//! Hybrid-encrypted payload side channel.
//!
//! ```text
//! seal:  JSON ──AES-CFB(k)──> data      k ──RSA(recipient)──> key ──sign(sender)──> signature
//! open:  verify(signature, key) ──> unwrap(key) = k ──> AES-CFB⁻¹(data) ──> JSON
//! ```
//!
//! # Security
//!
//! - The signature over `key` is checked before anything is decrypted. A
//!   payload that fails verification never reaches the recipient's private key
//! - Every AES key is drawn fresh per envelope and zeroized after use

use cipherise_crypto::{
    AES_KEY_SIZE, CryptoError, PrivateKey, PublicKey, aes_decrypt, aes_encrypt_with_rng,
    rsa_decrypt, rsa_encrypt, sign, verify,
};
use cipherise_proto::{PayloadEnvelope, PayloadRequest, PayloadResponse};
use serde::{Serialize, de::DeserializeOwned};
use tracing::warn;
use zeroize::Zeroizing;

use crate::{
    env::{EnvRng, Environment},
    error::PayloadError,
};

/// Recovers the AES key from an envelope's `key` member.
pub trait KeyUnwrap {
    /// Decrypt a hex RSA block.
    fn unwrap_key(&self, wrapped_hex: &str) -> Result<Zeroizing<Vec<u8>>, CryptoError>;
}

impl KeyUnwrap for PrivateKey {
    fn unwrap_key(&self, wrapped_hex: &str) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        rsa_decrypt(self, wrapped_hex)
    }
}

/// Encrypt `message` for `recipient` and sign the wrapped key as `sender`.
pub fn seal<T: Serialize, E: Environment>(
    message: &T,
    recipient: &PublicKey,
    sender: &PrivateKey,
    env: &E,
) -> Result<PayloadEnvelope, PayloadError> {
    let json = Zeroizing::new(serde_json::to_vec(message).map_err(|_| PayloadError::Json)?);

    let mut aes_key = Zeroizing::new([0u8; AES_KEY_SIZE]);
    env.random_bytes(aes_key.as_mut_slice());

    let key = rsa_encrypt(recipient, &mut EnvRng(env), aes_key.as_slice()).map_err(|e| {
        warn!(error = %e, "payload key wrap failed");
        PayloadError::RsaEncryption
    })?;

    let data = aes_encrypt_with_rng(&json, aes_key.as_slice(), &mut EnvRng(env)).map_err(|e| {
        warn!(error = %e, "payload encryption failed");
        PayloadError::AesEncryption
    })?;

    let signature = sign(sender, &key).map_err(|e| {
        warn!(error = %e, "payload signing failed");
        PayloadError::Signing
    })?;

    Ok(PayloadEnvelope { data: hex::encode(data), key, signature })
}

/// Verify and decrypt an envelope from `sender`.
///
/// # Errors
///
/// In check order:
///
/// - `InvalidEnvelope` if a member is empty
/// - `InvalidSignature` if `signature` does not verify over `key`
/// - `KeyUnwrap` if the key cannot be recovered
/// - `DataDecryption` if `data` cannot be decrypted
/// - `DataParse` if the plaintext is not a `T`
pub fn open<T: DeserializeOwned>(
    envelope: &PayloadEnvelope,
    sender: &PublicKey,
    recipient: &impl KeyUnwrap,
) -> Result<T, PayloadError> {
    if !envelope.is_complete() {
        return Err(PayloadError::InvalidEnvelope);
    }
    if !verify(sender, &envelope.key, &envelope.signature) {
        warn!("payload signature rejected");
        return Err(PayloadError::InvalidSignature);
    }

    let aes_key = recipient.unwrap_key(&envelope.key).map_err(|_| PayloadError::KeyUnwrap)?;
    if aes_key.len() != AES_KEY_SIZE {
        return Err(PayloadError::KeyUnwrap);
    }

    let data = hex::decode(&envelope.data).map_err(|_| PayloadError::DataDecryption)?;
    let plaintext = aes_decrypt(&data, &aes_key).map_err(|_| PayloadError::DataDecryption)?;

    serde_json::from_slice(&plaintext).map_err(|_| PayloadError::DataParse)
}

/// Build the request envelope for a device.
///
/// Returns `None` when the request has nothing to set or get.
pub fn encode<E: Environment>(
    request: &PayloadRequest,
    device: &PublicKey,
    service: &PrivateKey,
    env: &E,
) -> Result<Option<PayloadEnvelope>, PayloadError> {
    if request.is_empty() {
        return Ok(None);
    }
    seal(request, device, service, env).map(Some)
}

/// Open a device's response envelope.
///
/// An error block inside the plaintext becomes [`PayloadError::Rejected`].
pub fn decode(
    envelope: &PayloadEnvelope,
    device: &PublicKey,
    service: &impl KeyUnwrap,
) -> Result<PayloadResponse, PayloadError> {
    let response: PayloadResponse = open(envelope, device, service)?;
    if response.status.has_error() {
        return Err(PayloadError::Rejected(response.status.message().to_string()));
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, collections::BTreeMap};

    use cipherise_proto::ErrorFields;

    use super::*;
    use crate::testing::{SeededEnv, device_keys, sp_keys};

    /// Counts unwrap attempts, delegating to a real key.
    struct CountingUnwrap<'a> {
        key: &'a PrivateKey,
        attempts: Cell<usize>,
    }

    impl KeyUnwrap for CountingUnwrap<'_> {
        fn unwrap_key(&self, wrapped_hex: &str) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
            self.attempts.set(self.attempts.get() + 1);
            self.key.unwrap_key(wrapped_hex)
        }
    }

    fn request() -> PayloadRequest {
        PayloadRequest {
            set: BTreeMap::from([("colour".to_string(), "blue".to_string())]),
            get: vec!["shoe-size".to_string()],
        }
    }

    fn device_reply(get: &[(&str, &str)]) -> PayloadEnvelope {
        let response = PayloadResponse {
            status: ErrorFields::default(),
            set_response: true,
            get_response: get.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        };
        seal(&response, sp_keys().public(), device_keys(1).private(), &SeededEnv::new(7)).unwrap()
    }

    #[test]
    fn empty_request_yields_no_envelope() {
        let env = SeededEnv::new(1);
        let envelope =
            encode(&PayloadRequest::default(), device_keys(1).public(), sp_keys().private(), &env)
                .unwrap();

        assert!(envelope.is_none());
    }

    #[test]
    fn device_can_open_request() {
        let env = SeededEnv::new(2);
        let envelope = encode(&request(), device_keys(1).public(), sp_keys().private(), &env)
            .unwrap()
            .unwrap();

        let opened: PayloadRequest =
            open(&envelope, sp_keys().public(), device_keys(1).private()).unwrap();
        assert_eq!(opened, request());
    }

    #[test]
    fn response_decodes_get_values() {
        let envelope = device_reply(&[("shoe-size", "9")]);
        let response = decode(&envelope, device_keys(1).public(), sp_keys().private()).unwrap();

        assert!(response.set_response);
        assert_eq!(response.get_response.get("shoe-size").map(String::as_str), Some("9"));
    }

    #[test]
    fn bad_signature_never_reaches_decryption() {
        let mut envelope = device_reply(&[]);
        envelope.signature = sign(device_keys(2).private(), &envelope.key).unwrap();

        let counter = CountingUnwrap { key: sp_keys().private(), attempts: Cell::new(0) };
        let result = decode(&envelope, device_keys(1).public(), &counter);

        assert_eq!(result, Err(PayloadError::InvalidSignature));
        assert_eq!(counter.attempts.get(), 0);
    }

    #[test]
    fn valid_signature_unwraps_exactly_once() {
        let envelope = device_reply(&[]);
        let counter = CountingUnwrap { key: sp_keys().private(), attempts: Cell::new(0) };

        assert!(decode(&envelope, device_keys(1).public(), &counter).is_ok());
        assert_eq!(counter.attempts.get(), 1);
    }

    #[test]
    fn incomplete_envelope_is_rejected_first() {
        let mut envelope = device_reply(&[]);
        envelope.data.clear();

        assert_eq!(
            decode(&envelope, device_keys(1).public(), sp_keys().private()),
            Err(PayloadError::InvalidEnvelope)
        );
    }

    #[test]
    fn key_for_another_recipient_fails_unwrap() {
        let envelope = device_reply(&[]);
        assert_eq!(
            decode(&envelope, device_keys(1).public(), device_keys(3).private()),
            Err(PayloadError::KeyUnwrap)
        );
    }

    #[test]
    fn corrupted_data_fails_decryption_or_parse() {
        let mut envelope = device_reply(&[("a", "1")]);
        envelope.data = "00".repeat(8);

        assert_eq!(
            decode(&envelope, device_keys(1).public(), sp_keys().private()),
            Err(PayloadError::DataDecryption)
        );
    }

    #[test]
    fn error_block_inside_response_is_surfaced() {
        let response = PayloadResponse {
            status: ErrorFields::from_message("storage full"),
            ..PayloadResponse::default()
        };
        let envelope =
            seal(&response, sp_keys().public(), device_keys(1).private(), &SeededEnv::new(3))
                .unwrap();

        assert_eq!(
            decode(&envelope, device_keys(1).public(), sp_keys().private()),
            Err(PayloadError::Rejected("storage full".to_string()))
        );
    }

    #[test]
    fn fresh_key_per_envelope() {
        let env = SeededEnv::new(4);
        let a = seal(&request(), device_keys(1).public(), sp_keys().private(), &env).unwrap();
        let b = seal(&request(), device_keys(1).public(), sp_keys().private(), &env).unwrap();

        assert_ne!(a.key, b.key);
        assert_ne!(a.data, b.data);
    }
}
