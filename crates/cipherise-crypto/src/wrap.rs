//! RSA PKCS#1 v1.5 encryption, used only to wrap payload AES keys.

use rand::{CryptoRng, RngCore};
use rsa::Pkcs1v15Encrypt;
use zeroize::Zeroizing;

use crate::{
    error::CryptoError,
    keys::{PrivateKey, PublicKey, decode_hex},
};

/// PKCS#1 v1.5 padding overhead in bytes.
const PKCS1_OVERHEAD: usize = 11;

/// Largest cleartext that fits in one block for `public`.
///
/// 245 bytes for an RSA-2048 key.
pub fn max_wrap_len(public: &PublicKey) -> usize {
    public.size().saturating_sub(PKCS1_OVERHEAD)
}

/// Encrypt `plaintext` to `public`, returning lowercase hex.
///
/// # Errors
///
/// - `RsaEncryption` if the input is empty or longer than
///   [`max_wrap_len`]
pub fn rsa_encrypt<R: RngCore + CryptoRng>(
    public: &PublicKey,
    rng: &mut R,
    plaintext: &[u8],
) -> Result<String, CryptoError> {
    let limit = max_wrap_len(public);
    if plaintext.is_empty() || plaintext.len() > limit {
        return Err(CryptoError::RsaEncryption {
            reason: format!("input is {} bytes, block holds 1..={limit}", plaintext.len()),
        });
    }

    let ciphertext = public
        .inner()
        .encrypt(rng, Pkcs1v15Encrypt, plaintext)
        .map_err(|e| CryptoError::RsaEncryption { reason: e.to_string() })?;

    Ok(hex::encode(ciphertext))
}

/// Decrypt a hex RSA block with `private`.
///
/// # Errors
///
/// - `InvalidHex` if `hex_ciphertext` is not hex
/// - `RsaDecryption` for every padding or length failure
pub fn rsa_decrypt(
    private: &PrivateKey,
    hex_ciphertext: &str,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let ciphertext = decode_hex(hex_ciphertext)?;

    private
        .inner()
        .decrypt(Pkcs1v15Encrypt, &ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::RsaDecryption)
}
