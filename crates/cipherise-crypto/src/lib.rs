//! Cipherise Cryptographic Primitives
//!
//! Cryptographic building blocks for the Cipherise protocol. Pure functions
//! with deterministic outputs where the algorithm allows it. Anything that
//! needs randomness (key generation, IVs, PKCS#1 padding) takes the RNG as a
//! parameter so tests can seed it.
//!
//! # Trust Binding
//!
//! A device is trusted through a chain of signatures the service provider
//! issued over a canonical hash of the device's identity:
//!
//! ```text
//! (host, serviceId, username, deviceId)
//!        │
//!        ▼
//! Canonical Hash (per key, per level) → SHA-256 hex
//!        │
//!        ▼
//! SP Signature (SHA256withRSA) → Signature Chain
//!        │
//!        ▼
//! Re-verified on every authentication
//! ```
//!
//! # Payload Encryption
//!
//! Application data travels in a hybrid envelope:
//!
//! - AES-256-CFB128 encrypts the data under a fresh single-use key
//! - RSA PKCS#1 v1.5 wraps that key for the recipient
//! - The sender signs the wrapped key, and the receiver verifies this before
//!   touching any ciphertext
//!
//! # Security
//!
//! - Verification functions return `bool` and treat malformed input as
//!   failure
//! - RSA decryption errors carry no detail
//! - Private key material and decrypted plaintext are zeroized on drop

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod aes_cfb;
pub mod canonical;
pub mod chain;
pub mod error;
pub mod keys;
pub mod signature;
pub mod wrap;

pub use aes_cfb::{AES_IV_SIZE, AES_KEY_SIZE, aes_decrypt, aes_encrypt, aes_encrypt_with_rng};
pub use canonical::{Binding, ID_WIDTH, canonical_hash, canonical_host, pad_id};
pub use chain::{
    CHAIN_LEN, DeviceKeyChain, MAX_LEVEL, MIN_LEVEL, SignatureChain, produce_chain, sign_level,
    verify_chain, verify_level,
};
pub use error::CryptoError;
pub use keys::{KeyPair, PrivateKey, PublicKey, RSA_KEY_BITS};
pub use signature::{sign, verify};
pub use wrap::{max_wrap_len, rsa_decrypt, rsa_encrypt};
