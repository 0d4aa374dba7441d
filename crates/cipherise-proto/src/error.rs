//! Wire decoding errors.

use thiserror::Error;

/// Result alias for wire operations.
pub type Result<T> = std::result::Result<T, WireError>;

/// Errors raised while decoding or validating wire messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Body is not valid JSON for the expected message
    #[error("malformed {message}: {reason}")]
    Malformed {
        /// Message type that failed to decode
        message: &'static str,
        /// serde error text
        reason: String,
    },

    /// A field the protocol requires is missing or empty
    #[error("{message} is missing required field '{field}'")]
    MissingField {
        /// Message type being validated
        message: &'static str,
        /// Wire name of the field
        field: &'static str,
    },

    /// A field is present but holds an unusable value
    #[error("{message} has invalid '{field}': {reason}")]
    InvalidField {
        /// Message type being validated
        message: &'static str,
        /// Wire name of the field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// Message could not be serialized
    #[error("failed to encode {message}: {reason}")]
    Encode {
        /// Message type that failed to encode
        message: &'static str,
        /// serde error text
        reason: String,
    },
}
