//! Error types for the Cipherise client core.
//!
//! Protocol failures, transport failures and cryptographic failures stay
//! distinguishable so callers can tell a rejected request from a dropped one.
//! Payload failures carry the exact text relayed to the device, which the
//! remote side may localise.

use cipherise_crypto::CryptoError;
use cipherise_proto::{ErrorFields, WireError};
use thiserror::Error;

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, CipheriseError>;

/// Failures of the payload side channel.
///
/// `Display` output is relayed to the device and the caller verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    /// Request plaintext could not be serialized
    #[error("Payload json error.")]
    Json,

    /// AES key could not be wrapped for the recipient
    #[error("Payload RSA encryption error.")]
    RsaEncryption,

    /// Plaintext could not be encrypted
    #[error("Payload AES encryption error.")]
    AesEncryption,

    /// Wrapped key could not be signed
    #[error("Payload signing error.")]
    Signing,

    /// Envelope is missing a member
    #[error("Invalid payload for parsing.")]
    InvalidEnvelope,

    /// Signature over the wrapped key did not verify
    #[error("Invalid payload signature.")]
    InvalidSignature,

    /// Wrapped key could not be unwrapped
    #[error("Unable to decrypt payload AES key.")]
    KeyUnwrap,

    /// Ciphertext could not be decrypted
    #[error("Unable to decrypt payload data.")]
    DataDecryption,

    /// Decrypted plaintext is not the expected JSON
    #[error("Unable to parse decrypted payload data.")]
    DataParse,

    /// Device answered with an error inside the envelope
    #[error("{0}")]
    Rejected(String),

    /// A payload was sent but none came back
    #[error("No Payload response!")]
    Missing,

    /// Device did not store the `set` values
    #[error("Payload response 'set' failed!")]
    SetFailed,

    /// Payload request could not be delivered
    #[error("Sending Payload failed!")]
    SendFailed,

    /// Payload exchange reply could not be read
    #[error("Parsing payload response failed!")]
    ResponseParse,

    /// Caller declined the device's answer
    #[error("Payload response was rejected by SDK caller.")]
    CallerRejected,
}

/// Errors surfaced by flows and the driver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CipheriseError {
    /// Network failure, or a reply that is not a Cipherise body
    #[error("transport error: {reason}")]
    Transport {
        /// What went wrong
        reason: String,
    },

    /// Reply is missing a field or holds an unusable value
    #[error("schema error: {0}")]
    Schema(#[from] WireError),

    /// Server reported an error for the request
    #[error("{message}")]
    Protocol {
        /// Server or device error code
        code: i64,
        /// Error text
        message: String,
        /// Server log correlation id, empty if absent
        log_id: String,
    },

    /// Cryptographic operation failed
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Payload side channel failed
    #[error("{0}")]
    Payload(#[from] PayloadError),

    /// Code or request expired before the device responded
    #[error("timed out waiting for the device")]
    Timeout,

    /// Caller abandoned the operation
    #[error("cancelled by caller")]
    Cancelled,

    /// Caller-supplied argument is unusable
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// What is wrong with it
        reason: String,
    },

    /// Flow received an event it cannot handle in its current state
    #[error("invalid state transition: cannot {operation} in {state}")]
    InvalidState {
        /// State name
        state: &'static str,
        /// Attempted operation
        operation: &'static str,
    },

    /// Operation needs a registered service provider
    #[error("service provider is not registered")]
    NotRegistered,

    /// Registration attempted with an identity already in place
    #[error("service provider is already registered")]
    AlreadyRegistered,

    /// Key persistence failed
    #[error("key store error: {reason}")]
    KeyStore {
        /// What went wrong
        reason: String,
    },
}

impl CipheriseError {
    /// Protocol error from a reply's error block.
    pub fn protocol(fields: &ErrorFields) -> Self {
        Self::Protocol {
            code: fields.effective_code(),
            message: fields.message().to_string(),
            log_id: fields.log_id.clone(),
        }
    }

    /// Transport error with a reason.
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport { reason: reason.into() }
    }

    /// Returns true if this error is transient and may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout)
    }

    /// True for a server error whose text mentions a timeout.
    pub fn mentions_timeout(&self) -> bool {
        match self {
            Self::Protocol { message, .. } => message.to_ascii_lowercase().contains("timeout"),
            _ => false,
        }
    }
}
