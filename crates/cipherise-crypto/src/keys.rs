//! RSA key pairs and their encodings.
//!
//! Service provider identities and device keys are RSA-2048. Keys cross three
//! boundaries, each with its own encoding:
//!
//! - Key files: hex of DER `PrivateKeyInfo` and `SubjectPublicKeyInfo`
//! - Registration: SP public key as `PUBLIC KEY` PEM
//! - Device keys from the server: `PUBLIC KEY` or `RSA PUBLIC KEY` PEM

use std::fmt;

use rand::{CryptoRng, RngCore};
use rsa::{
    RsaPrivateKey, RsaPublicKey,
    pkcs1::DecodeRsaPublicKey,
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding},
    traits::PublicKeyParts,
};
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Modulus size for every key generated by this crate.
pub const RSA_KEY_BITS: usize = 2048;

/// RSA private key.
///
/// `Debug` is redacted so keys never end up in logs.
#[derive(Clone)]
pub struct PrivateKey(RsaPrivateKey);

/// RSA public key.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(RsaPublicKey);

/// Matched private and public key.
#[derive(Clone)]
pub struct KeyPair {
    private: PrivateKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh RSA-2048 key pair.
    ///
    /// The caller MUST provide a cryptographically secure RNG in production.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::new(rng, RSA_KEY_BITS)
            .map_err(|e| CryptoError::KeyGeneration { reason: e.to_string() })?;
        Ok(Self::from_private(PrivateKey(private)))
    }

    /// Build a pair from a private key, deriving the public half.
    pub fn from_private(private: PrivateKey) -> Self {
        let public = private.public_key();
        Self { private, public }
    }

    /// Build a pair from separately stored halves.
    ///
    /// # Errors
    ///
    /// - `KeyMismatch` if `public` is not derived from `private`
    pub fn from_parts(private: PrivateKey, public: PublicKey) -> Result<Self, CryptoError> {
        if private.public_key() != public {
            return Err(CryptoError::KeyMismatch);
        }
        Ok(Self { private, public })
    }

    /// Private half.
    pub fn private(&self) -> &PrivateKey {
        &self.private
    }

    /// Public half.
    pub fn public(&self) -> &PublicKey {
        &self.public
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair").field("public", &self.public).finish_non_exhaustive()
    }
}

impl PrivateKey {
    /// Decode DER `PrivateKeyInfo` (PKCS#8).
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, CryptoError> {
        RsaPrivateKey::from_pkcs8_der(der)
            .map(Self)
            .map_err(|e| CryptoError::KeyEncoding { reason: e.to_string() })
    }

    /// Encode as DER `PrivateKeyInfo`.
    pub fn to_pkcs8_der(&self) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        self.0
            .to_pkcs8_der()
            .map(|doc| Zeroizing::new(doc.as_bytes().to_vec()))
            .map_err(|e| CryptoError::KeyEncoding { reason: e.to_string() })
    }

    /// Decode a `PRIVATE KEY` PEM block.
    pub fn from_pkcs8_pem(pem: &str) -> Result<Self, CryptoError> {
        RsaPrivateKey::from_pkcs8_pem(pem.trim())
            .map(Self)
            .map_err(|e| CryptoError::KeyEncoding { reason: e.to_string() })
    }

    /// Encode as a `PRIVATE KEY` PEM block.
    pub fn to_pkcs8_pem(&self) -> Result<Zeroizing<String>, CryptoError> {
        self.0
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CryptoError::KeyEncoding { reason: e.to_string() })
    }

    /// Decode the hex form used in key files.
    pub fn from_der_hex(hex_der: &str) -> Result<Self, CryptoError> {
        let der = Zeroizing::new(decode_hex(hex_der.trim())?);
        Self::from_pkcs8_der(&der)
    }

    /// Encode as hex DER for key files.
    pub fn to_der_hex(&self) -> Result<Zeroizing<String>, CryptoError> {
        Ok(Zeroizing::new(hex::encode(self.to_pkcs8_der()?.as_slice())))
    }

    /// Derive the public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(RsaPublicKey::from(&self.0))
    }

    pub(crate) fn inner(&self) -> &RsaPrivateKey {
        &self.0
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

impl PublicKey {
    /// Decode a PEM public key.
    ///
    /// Accepts `PUBLIC KEY` (SubjectPublicKeyInfo) and falls back to
    /// `RSA PUBLIC KEY` (PKCS#1), since device keys arrive in either form.
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        let pem = pem.trim();
        if pem.is_empty() {
            return Err(CryptoError::KeyEncoding { reason: "empty PEM".to_string() });
        }

        RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map(Self)
            .map_err(|e| CryptoError::KeyEncoding { reason: e.to_string() })
    }

    /// Encode as a `PUBLIC KEY` PEM block.
    pub fn to_pem(&self) -> Result<String, CryptoError> {
        self.0
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::KeyEncoding { reason: e.to_string() })
    }

    /// Decode DER `SubjectPublicKeyInfo`.
    pub fn from_spki_der(der: &[u8]) -> Result<Self, CryptoError> {
        RsaPublicKey::from_public_key_der(der)
            .map(Self)
            .map_err(|e| CryptoError::KeyEncoding { reason: e.to_string() })
    }

    /// Encode as DER `SubjectPublicKeyInfo`.
    pub fn to_spki_der(&self) -> Result<Vec<u8>, CryptoError> {
        self.0
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| CryptoError::KeyEncoding { reason: e.to_string() })
    }

    /// Decode the hex form used in key files.
    pub fn from_der_hex(hex_der: &str) -> Result<Self, CryptoError> {
        Self::from_spki_der(&decode_hex(hex_der.trim())?)
    }

    /// Encode as hex DER for key files.
    pub fn to_der_hex(&self) -> Result<String, CryptoError> {
        Ok(hex::encode(self.to_spki_der()?))
    }

    /// Modulus length in bytes.
    pub fn size(&self) -> usize {
        self.0.size()
    }

    pub(crate) fn inner(&self) -> &RsaPublicKey {
        &self.0
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({} bits)", self.size() * 8)
    }
}

pub(crate) fn decode_hex(input: &str) -> Result<Vec<u8>, CryptoError> {
    hex::decode(input).map_err(|e| CryptoError::InvalidHex { reason: e.to_string() })
}
