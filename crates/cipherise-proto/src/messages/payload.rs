//! Payload side channel: the encrypted envelope, its plaintext request and
//! response, and the verify finalizer shared by both flows.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{ErrorFields, ServerReply, null_default};
use crate::error::{Result, WireError};

/// Hybrid-encrypted payload. Every member is lowercase hex.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadEnvelope {
    /// AES-CFB ciphertext followed by the 16-byte IV
    #[serde(default, deserialize_with = "null_default")]
    pub data: String,
    /// AES key wrapped with the recipient's RSA key
    #[serde(default, deserialize_with = "null_default")]
    pub key: String,
    /// Sender's signature over `key`
    #[serde(default, deserialize_with = "null_default")]
    pub signature: String,
}

impl PayloadEnvelope {
    /// True if all three members are non-empty.
    pub fn is_complete(&self) -> bool {
        !self.data.is_empty() && !self.key.is_empty() && !self.signature.is_empty()
    }
}

/// Plaintext sent to the device inside an envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadRequest {
    /// Values for the device to store
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "BTreeMap::is_empty")]
    pub set: BTreeMap<String, String>,
    /// Keys whose values the device should return
    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "Vec::is_empty")]
    pub get: Vec<String>,
}

impl PayloadRequest {
    /// True if there is nothing to set or get.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.get.is_empty()
    }
}

/// Plaintext returned by the device inside an envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadResponse {
    /// Error block
    #[serde(flatten)]
    pub status: ErrorFields,
    /// True if the device stored every `set` value
    #[serde(rename = "setResponse", default, deserialize_with = "null_default")]
    pub set_response: bool,
    /// Values for the requested `get` keys
    #[serde(
        rename = "getResponse",
        default,
        deserialize_with = "null_default",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub get_response: BTreeMap<String, String>,
}

impl ServerReply for PayloadResponse {
    const NAME: &'static str = "payload response";

    fn error_fields(&self) -> &ErrorFields {
        &self.status
    }
}

/// `{payload}` body, sent to `payloadURL` and returned from it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadExchange {
    /// Error block
    #[serde(flatten)]
    pub status: ErrorFields,
    /// The envelope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<PayloadEnvelope>,
}

impl PayloadExchange {
    /// Request body carrying `envelope`.
    pub fn new(envelope: PayloadEnvelope) -> Self {
        Self { status: ErrorFields::default(), payload: Some(envelope) }
    }
}

impl ServerReply for PayloadExchange {
    const NAME: &'static str = "payload exchange";

    fn error_fields(&self) -> &ErrorFields {
        &self.status
    }

    fn validate(&self) -> Result<()> {
        match self.payload {
            Some(_) => Ok(()),
            None => Err(WireError::MissingField { message: Self::NAME, field: "payload" }),
        }
    }
}

/// Finalizer body posted to the verify URL of either flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyRequest {
    /// Outcome as seen by the service provider
    pub verified: bool,
    /// Why the outcome was negative
    #[serde(rename = "failReason", default, skip_serializing_if = "Option::is_none")]
    pub fail_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{encode, parse};

    #[test]
    fn empty_members_are_omitted_from_request() {
        let only_get = PayloadRequest { set: BTreeMap::new(), get: vec!["k".into()] };
        assert_eq!(encode("p", &only_get).unwrap(), br#"{"get":["k"]}"#);
        assert!(PayloadRequest::default().is_empty());
    }

    #[test]
    fn response_defaults_when_members_absent() {
        let response: PayloadResponse = parse(br#"{"getResponse": {"a": "1"}}"#).unwrap();

        assert!(!response.set_response);
        assert_eq!(response.get_response.get("a").map(String::as_str), Some("1"));
    }

    #[test]
    fn verify_omits_absent_reason() {
        let ok = VerifyRequest { verified: true, fail_reason: None };
        assert_eq!(encode("v", &ok).unwrap(), br#"{"verified":true}"#);

        let failed = VerifyRequest { verified: false, fail_reason: Some("bad".into()) };
        assert_eq!(encode("v", &failed).unwrap(), br#"{"verified":false,"failReason":"bad"}"#);
    }

    #[test]
    fn exchange_reply_requires_envelope() {
        let empty: PayloadExchange = parse(b"{}").unwrap();
        assert!(empty.validate().is_err());

        let envelope =
            PayloadEnvelope { data: "a".into(), key: "b".into(), signature: String::new() };
        assert!(!envelope.is_complete());
        assert!(PayloadExchange::new(envelope).validate().is_ok());
    }
}
