//! SHA256withRSA signatures over hex-encoded data.
//!
//! Every signed value in the protocol travels as hex: challenges, canonical
//! hashes, wrapped payload keys. Signatures cover the decoded bytes, not the
//! hex text, and are themselves returned as lowercase hex.

use rsa::Pkcs1v15Sign;
use sha2::{Digest, Sha256};

use crate::{
    error::CryptoError,
    keys::{PrivateKey, PublicKey, decode_hex},
};

/// Sign the bytes represented by `hex_data`.
///
/// # Errors
///
/// - `InvalidHex` if `hex_data` is not hex
/// - `Signing` if the RSA operation fails
pub fn sign(private: &PrivateKey, hex_data: &str) -> Result<String, CryptoError> {
    let data = decode_hex(hex_data)?;
    let digest = Sha256::digest(&data);

    let signature = private
        .inner()
        .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
        .map_err(|e| CryptoError::Signing { reason: e.to_string() })?;

    Ok(hex::encode(signature))
}

/// Verify `hex_signature` over the bytes represented by `hex_data`.
///
/// Returns `false` for malformed hex, wrong-length signatures and forgeries
/// alike.
pub fn verify(public: &PublicKey, hex_data: &str, hex_signature: &str) -> bool {
    let (Ok(data), Ok(signature)) = (hex::decode(hex_data), hex::decode(hex_signature)) else {
        return false;
    };
    if signature.is_empty() {
        return false;
    }

    let digest = Sha256::digest(&data);
    public.inner().verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{device_keys, sp_keys};

    const CHALLENGE: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    #[test]
    fn signature_verifies_with_matching_key() {
        let signature = sign(sp_keys().private(), CHALLENGE).unwrap();
        assert!(verify(sp_keys().public(), CHALLENGE, &signature));
    }

    #[test]
    fn signature_is_deterministic_lowercase_hex() {
        let first = sign(sp_keys().private(), CHALLENGE).unwrap();
        let second = sign(sp_keys().private(), CHALLENGE).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 512);
        assert!(first.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn signature_fails_with_other_key() {
        let signature = sign(sp_keys().private(), CHALLENGE).unwrap();
        assert!(!verify(device_keys(1).public(), CHALLENGE, &signature));
    }

    #[test]
    fn signature_fails_for_other_data() {
        let signature = sign(sp_keys().private(), CHALLENGE).unwrap();
        let altered = CHALLENGE.replacen('9', "8", 1);
        assert!(!verify(sp_keys().public(), &altered, &signature));
    }

    #[test]
    fn uppercase_hex_covers_same_bytes() {
        let signature = sign(sp_keys().private(), CHALLENGE).unwrap();
        assert!(verify(sp_keys().public(), &CHALLENGE.to_uppercase(), &signature));
    }

    #[test]
    fn malformed_inputs_verify_false() {
        let signature = sign(sp_keys().private(), CHALLENGE).unwrap();

        assert!(!verify(sp_keys().public(), "zz", &signature));
        assert!(!verify(sp_keys().public(), CHALLENGE, "not hex"));
        assert!(!verify(sp_keys().public(), CHALLENGE, ""));
        assert!(!verify(sp_keys().public(), CHALLENGE, &signature[..510]));
    }

    #[test]
    fn signing_non_hex_is_an_error() {
        assert!(matches!(
            sign(sp_keys().private(), "xyz"),
            Err(CryptoError::InvalidHex { .. })
        ));
    }
}
