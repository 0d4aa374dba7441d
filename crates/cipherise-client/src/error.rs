//! Driver-side errors.

use cipherise_core::CipheriseError;
use thiserror::Error;

/// Transport errors. Only raised when no HTTP response was received.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection could not be established.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Request did not complete in time.
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Request or response body could not be transferred.
    #[error("body transfer failed: {0}")]
    Body(String),
}

impl From<TransportError> for CipheriseError {
    fn from(err: TransportError) -> Self {
        Self::transport(err.to_string())
    }
}

/// Key persistence errors.
#[derive(Debug, Error)]
pub enum KeyStoreError {
    /// File could not be read, written or removed.
    #[error("key file {path}: {source}")]
    Io {
        /// File involved
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Stored key material is not a valid key pair.
    #[error("key file {path} is corrupt: {reason}")]
    Corrupt {
        /// File involved
        path: String,
        /// What is wrong with it
        reason: String,
    },

    /// Service id cannot be used as a file name.
    #[error("invalid service id '{0}'")]
    InvalidServiceId(String),
}

impl From<KeyStoreError> for CipheriseError {
    fn from(err: KeyStoreError) -> Self {
        Self::KeyStore { reason: err.to_string() }
    }
}
