//! JSON message bodies exchanged with the Cipherise server.
//!
//! Every reply embeds the common [`ErrorFields`] block. A reply is decoded in
//! two steps: serde parses the body, then [`ServerReply::validate`] checks the
//! fields the protocol requires. Error bodies are checked by the caller
//! between the two steps, since a reply carrying an error is expected to be
//! missing its payload fields.
//!
//! Request bodies omit empty optional members, matching what the server
//! accepts. Replies tolerate absent and `null` members.

pub mod auth;
pub mod enrol;
pub mod payload;
pub mod service;

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};

use crate::error::{Result, WireError};

/// Level-indexed map as it appears on the wire (`{"1": .., "4": ..}`).
pub type LevelMap = BTreeMap<String, String>;

/// Deserialize `null` as the type's default.
pub(crate) fn null_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub(crate) fn is_false(value: &bool) -> bool {
    !*value
}

pub(crate) fn is_zero(value: &i64) -> bool {
    *value == 0
}

/// Error block common to every server reply.
///
/// The enrolment fields are only set by direct (app-link) enrolment, where
/// the device reports its own failure through the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFields {
    /// Error flag
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "is_false")]
    pub error: bool,

    /// Server error code
    #[serde(
        rename = "error_code",
        default,
        deserialize_with = "null_default",
        skip_serializing_if = "is_zero"
    )]
    pub code: i64,

    /// Server error text
    #[serde(
        rename = "error_message",
        default,
        deserialize_with = "null_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub error_message: String,

    /// Server-side log correlation id
    #[serde(
        rename = "logId",
        default,
        deserialize_with = "null_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub log_id: String,

    /// Device-reported enrolment error code
    #[serde(
        rename = "enrolmentErrorCode",
        default,
        deserialize_with = "null_default",
        skip_serializing_if = "is_zero"
    )]
    pub enrolment_code: i64,

    /// Device-reported enrolment error text
    #[serde(
        rename = "enrolmentErrorMsg",
        default,
        deserialize_with = "null_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub enrolment_message: String,

    /// Device-reported failure reason
    #[serde(
        rename = "failReason",
        default,
        deserialize_with = "null_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub fail_reason: String,
}

impl ErrorFields {
    /// Error block carrying only a message, as produced locally.
    pub fn from_message(message: impl Into<String>) -> Self {
        let error_message = message.into();
        Self { error: !error_message.is_empty(), error_message, ..Self::default() }
    }

    /// True if the block describes an error.
    ///
    /// A server error needs both the flag and a message. A device error needs
    /// a non-zero code and some text.
    pub fn has_error(&self) -> bool {
        (self.error && !self.error_message.is_empty())
            || (self.enrolment_code != 0
                && (!self.fail_reason.is_empty() || !self.enrolment_message.is_empty()))
    }

    /// Most specific error text available.
    pub fn message(&self) -> &str {
        if self.enrolment_code != 0 {
            if !self.fail_reason.is_empty() {
                return &self.fail_reason;
            }
            if !self.enrolment_message.is_empty() {
                return &self.enrolment_message;
            }
        }
        &self.error_message
    }

    /// Error code to report: the device code when one is set.
    pub fn effective_code(&self) -> i64 {
        if self.enrolment_code != 0 { self.enrolment_code } else { self.code }
    }

    /// True if the error text mentions a timeout (any case).
    pub fn mentions_timeout(&self) -> bool {
        self.message().to_ascii_lowercase().contains("timeout")
    }
}

/// A reply body from the server.
pub trait ServerReply: DeserializeOwned {
    /// Message name used in error reports.
    const NAME: &'static str;

    /// The embedded error block.
    fn error_fields(&self) -> &ErrorFields;

    /// Check the fields the protocol requires on success.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Reply with no fields beyond the error block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyReply {
    /// Error block
    #[serde(flatten)]
    pub status: ErrorFields,
}

impl ServerReply for EmptyReply {
    const NAME: &'static str = "empty reply";

    fn error_fields(&self) -> &ErrorFields {
        &self.status
    }
}

/// Parse a reply body without validating it.
///
/// An empty body parses as `{}`.
pub fn parse<T: ServerReply>(body: &[u8]) -> Result<T> {
    let body = if body.iter().all(u8::is_ascii_whitespace) { b"{}".as_slice() } else { body };
    serde_json::from_slice(body)
        .map_err(|e| WireError::Malformed { message: T::NAME, reason: e.to_string() })
}

/// Serialize a request body.
pub fn encode<T: Serialize>(name: &'static str, message: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(message)
        .map_err(|e| WireError::Encode { message: name, reason: e.to_string() })
}

/// Require a non-empty string field.
pub(crate) fn require(message: &'static str, field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() { Err(WireError::MissingField { message, field }) } else { Ok(()) }
}

/// Require a level map with exactly four non-empty entries.
pub(crate) fn require_levels(
    message: &'static str,
    field: &'static str,
    map: &LevelMap,
) -> Result<()> {
    if map.is_empty() {
        return Err(WireError::MissingField { message, field });
    }
    if map.len() != 4 || map.values().any(String::is_empty) {
        return Err(WireError::InvalidField {
            message,
            field,
            reason: format!("expected 4 levels, got {}", map.len()),
        });
    }
    Ok(())
}
