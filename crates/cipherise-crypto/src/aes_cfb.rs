//! AES-256-CFB128 with the IV carried after the ciphertext.
//!
//! Wire layout: `ciphertext || iv`. CFB is a stream mode, so the ciphertext
//! has exactly the plaintext length and no padding is applied.

use aes::Aes256;
use cfb_mode::{
    Decryptor, Encryptor,
    cipher::{AsyncStreamCipher, KeyIvInit},
};
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// AES-256 key size in bytes.
pub const AES_KEY_SIZE: usize = 32;

/// CFB IV size in bytes (one AES block).
pub const AES_IV_SIZE: usize = 16;

type Aes256CfbEnc = Encryptor<Aes256>;
type Aes256CfbDec = Decryptor<Aes256>;

/// Encrypt `plaintext` under `key` with the given IV.
///
/// # Errors
///
/// - `EmptyPlaintext` for zero-length input
/// - `InvalidKeyLength` unless `key` is 32 bytes
pub fn aes_encrypt(
    plaintext: &[u8],
    key: &[u8],
    iv: &[u8; AES_IV_SIZE],
) -> Result<Vec<u8>, CryptoError> {
    if plaintext.is_empty() {
        return Err(CryptoError::EmptyPlaintext);
    }
    let cipher = Aes256CfbEnc::new_from_slices(key, iv).map_err(|_| {
        CryptoError::InvalidKeyLength { expected: AES_KEY_SIZE, actual: key.len() }
    })?;

    let mut output = Vec::with_capacity(plaintext.len() + AES_IV_SIZE);
    output.extend_from_slice(plaintext);
    cipher.encrypt(&mut output);
    output.extend_from_slice(iv);

    Ok(output)
}

/// Encrypt with a fresh random IV drawn from `rng`.
pub fn aes_encrypt_with_rng<R: RngCore + CryptoRng>(
    plaintext: &[u8],
    key: &[u8],
    rng: &mut R,
) -> Result<Vec<u8>, CryptoError> {
    let mut iv = [0u8; AES_IV_SIZE];
    rng.fill_bytes(&mut iv);
    aes_encrypt(plaintext, key, &iv)
}

/// Decrypt `ciphertext || iv` under `key`.
///
/// # Errors
///
/// - `CiphertextTooShort` if the input has no bytes beyond the IV
/// - `InvalidKeyLength` unless `key` is 32 bytes
pub fn aes_decrypt(data: &[u8], key: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if data.len() <= AES_IV_SIZE {
        return Err(CryptoError::CiphertextTooShort { len: data.len() });
    }
    let (ciphertext, iv) = data.split_at(data.len() - AES_IV_SIZE);

    let cipher = Aes256CfbDec::new_from_slices(key, iv).map_err(|_| {
        CryptoError::InvalidKeyLength { expected: AES_KEY_SIZE, actual: key.len() }
    })?;

    let mut plaintext = Zeroizing::new(ciphertext.to_vec());
    cipher.decrypt(&mut plaintext);
    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; AES_KEY_SIZE] = [0x42; AES_KEY_SIZE];
    const IV: [u8; AES_IV_SIZE] = [0x07; AES_IV_SIZE];

    #[test]
    fn iv_is_appended_after_ciphertext() {
        let encrypted = aes_encrypt(b"hello world", &KEY, &IV).unwrap();

        assert_eq!(encrypted.len(), 11 + AES_IV_SIZE);
        assert_eq!(&encrypted[11..], &IV);
        assert_ne!(&encrypted[..11], b"hello world");
    }

    #[test]
    fn single_byte_roundtrip() {
        let encrypted = aes_encrypt(b"x", &KEY, &IV).unwrap();
        assert_eq!(aes_decrypt(&encrypted, &KEY).unwrap().as_slice(), b"x");
    }

    #[test]
    fn partial_block_roundtrip() {
        let plaintext = vec![0xA5u8; 37];
        let encrypted = aes_encrypt(&plaintext, &KEY, &IV).unwrap();
        assert_eq!(aes_decrypt(&encrypted, &KEY).unwrap().as_slice(), plaintext.as_slice());
    }

    #[test]
    fn matches_nist_sp800_38a_cfb128_vector() {
        // F.3.17 CFB128-AES256.Encrypt, first two blocks
        let key = hex::decode("603deb1015ca71be2b73aef0857d77811f352c073b6108d72d9810a30914dff4")
            .unwrap();
        let iv: [u8; 16] = hex::decode("000102030405060708090a0b0c0d0e0f")
            .unwrap()
            .try_into()
            .unwrap();
        let plaintext =
            hex::decode("6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e51")
                .unwrap();

        let encrypted = aes_encrypt(&plaintext, &key, &iv).unwrap();

        assert_eq!(
            hex::encode(&encrypted[..32]),
            "dc7e84bfda79164b7ecd8486985d386039ffed143b28b1c832113c6331e5407b"
        );
    }

    #[test]
    fn empty_plaintext_is_rejected() {
        assert_eq!(aes_encrypt(b"", &KEY, &IV), Err(CryptoError::EmptyPlaintext));
    }

    #[test]
    fn input_without_ciphertext_is_rejected() {
        assert_eq!(
            aes_decrypt(&[0u8; AES_IV_SIZE], &KEY).unwrap_err(),
            CryptoError::CiphertextTooShort { len: AES_IV_SIZE }
        );
        assert!(aes_decrypt(&[], &KEY).is_err());
    }

    #[test]
    fn short_keys_are_rejected() {
        assert_eq!(
            aes_encrypt(b"data", &KEY[..16], &IV),
            Err(CryptoError::InvalidKeyLength { expected: 32, actual: 16 })
        );
        let encrypted = aes_encrypt(b"data", &KEY, &IV).unwrap();
        assert!(aes_decrypt(&encrypted, &KEY[..31]).is_err());
    }

    #[test]
    fn random_ivs_differ() {
        use rand::SeedableRng;
        let mut rng = rand_chacha::ChaCha20Rng::seed_from_u64(11);

        let first = aes_encrypt_with_rng(b"same", &KEY, &mut rng).unwrap();
        let second = aes_encrypt_with_rng(b"same", &KEY, &mut rng).unwrap();

        assert_ne!(first, second);
    }
}
