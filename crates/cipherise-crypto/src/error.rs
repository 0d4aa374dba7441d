//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors produced by the primitives in this crate.
///
/// Verification never produces an error: `verify` style functions return
/// `false` for every malformed or mismatched input so callers cannot
/// accidentally treat a parse failure differently from a forgery.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// RSA key pair generation failed
    #[error("key generation failed: {reason}")]
    KeyGeneration {
        /// Underlying library error
        reason: String,
    },

    /// A key could not be encoded or decoded (PEM, DER or hex)
    #[error("invalid key encoding: {reason}")]
    KeyEncoding {
        /// Why the encoding was rejected
        reason: String,
    },

    /// The public half of a key file does not belong to its private half
    #[error("public key does not match private key")]
    KeyMismatch,

    /// Input that must be hex was not
    #[error("invalid hex input: {reason}")]
    InvalidHex {
        /// Decoder error
        reason: String,
    },

    /// RSA signing failed
    #[error("signing failed: {reason}")]
    Signing {
        /// Underlying library error
        reason: String,
    },

    /// RSA encryption failed (including oversized input)
    #[error("RSA encryption failed: {reason}")]
    RsaEncryption {
        /// Why the block could not be encrypted
        reason: String,
    },

    /// RSA decryption failed
    ///
    /// Carries no detail: padding errors must not be distinguishable.
    #[error("RSA decryption failed")]
    RsaDecryption,

    /// AES key was not 32 bytes
    #[error("invalid AES key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Required length
        expected: usize,
        /// Provided length
        actual: usize,
    },

    /// Encrypting zero bytes is rejected
    #[error("nothing to encrypt")]
    EmptyPlaintext,

    /// AES input too short to contain both ciphertext and IV
    #[error("ciphertext too short: {len} bytes")]
    CiphertextTooShort {
        /// Length of the rejected input
        len: usize,
    },

    /// Canonical hash input failed normalization
    #[error("invalid canonical hash input: {reason}")]
    CanonicalInput {
        /// Which input was rejected and why
        reason: String,
    },

    /// A key chain or signature chain is structurally invalid
    #[error("invalid chain: {reason}")]
    InvalidChain {
        /// What is wrong with the chain
        reason: String,
    },
}
