//! Enrolment messages: init, scan status, validate, confirm.

use serde::{Deserialize, Serialize};

use super::{
    ErrorFields, LevelMap, ServerReply, null_default, payload::PayloadEnvelope, require,
    require_levels,
};
use crate::error::Result;

/// `POST sp/enrol-user` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrolRequest {
    /// User to enrol
    pub username: String,
}

/// Enrolment init reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrolReply {
    /// Error block
    #[serde(flatten)]
    pub status: ErrorFields,
    /// Image URL of the code the device scans
    #[serde(rename = "qrCodeURL", default, deserialize_with = "null_default")]
    pub scan_code_url: String,
    /// Fetched once the code is scanned
    #[serde(rename = "validateURL", default, deserialize_with = "null_default")]
    pub validate_url: String,
    /// Polled until the code is scanned
    #[serde(rename = "statusURL", default, deserialize_with = "null_default")]
    pub status_url: String,
    /// Link that opens the app directly; absent on some servers
    #[serde(rename = "directEnrolURL", default, deserialize_with = "null_default")]
    pub direct_url: String,
}

impl ServerReply for EnrolReply {
    const NAME: &'static str = "enrolment init";

    fn error_fields(&self) -> &ErrorFields {
        &self.status
    }

    fn validate(&self) -> Result<()> {
        require(Self::NAME, "qrCodeURL", &self.scan_code_url)?;
        require(Self::NAME, "validateURL", &self.validate_url)?;
        require(Self::NAME, "statusURL", &self.status_url)
    }
}

/// Enrolment scan status reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrolStatusReply {
    /// Error block
    #[serde(flatten)]
    pub status: ErrorFields,
    /// Free-text scan status
    #[serde(rename = "QREnrolStatus", default, deserialize_with = "null_default")]
    pub scan_status: String,
}

impl ServerReply for EnrolStatusReply {
    const NAME: &'static str = "enrolment status";

    fn error_fields(&self) -> &ErrorFields {
        &self.status
    }

    fn validate(&self) -> Result<()> {
        require(Self::NAME, "QREnrolStatus", &self.scan_status)
    }
}

/// Validate reply carrying the device identity and its key chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateReply {
    /// Error block
    #[serde(flatten)]
    pub status: ErrorFields,
    /// Identicon image; empty for direct enrolment
    #[serde(rename = "identiconURL", default, deserialize_with = "null_default")]
    pub identicon_url: String,
    /// Where the confirm decision is posted
    #[serde(rename = "confirmationURL", default, deserialize_with = "null_default")]
    pub confirmation_url: String,
    /// Device being enrolled
    #[serde(rename = "deviceId", default, deserialize_with = "null_default")]
    pub device_id: String,
    /// Device public keys by level
    #[serde(rename = "publicKeys", default, deserialize_with = "null_default")]
    pub public_keys: LevelMap,
}

impl ServerReply for ValidateReply {
    const NAME: &'static str = "enrolment validate";

    fn error_fields(&self) -> &ErrorFields {
        &self.status
    }

    fn validate(&self) -> Result<()> {
        require(Self::NAME, "confirmationURL", &self.confirmation_url)?;
        require(Self::NAME, "deviceId", &self.device_id)?;
        require_levels(Self::NAME, "publicKeys", &self.public_keys)
    }
}

/// Confirm decision as sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmDecision {
    /// Bind the device
    Confirm,
    /// Abandon the binding
    Reject,
}

/// `POST confirmationURL` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmRequest {
    /// The decision
    pub confirm: ConfirmDecision,
    /// SP signatures over each level's canonical hash
    pub signatures: LevelMap,
    /// Payload for the device; only sent with `confirm`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<PayloadEnvelope>,
}

/// Confirm reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmReply {
    /// Error block
    #[serde(flatten)]
    pub status: ErrorFields,
    /// Echo of the decision
    #[serde(default, deserialize_with = "null_default")]
    pub confirm: String,
    /// Finalizer URL, present when a payload was exchanged
    #[serde(rename = "payloadVerifyURL", default, deserialize_with = "null_default")]
    pub payload_verify_url: String,
    /// Device's payload response
    #[serde(default)]
    pub payload: Option<PayloadEnvelope>,
}

impl ServerReply for ConfirmReply {
    const NAME: &'static str = "enrolment confirm";

    fn error_fields(&self) -> &ErrorFields {
        &self.status
    }

    fn validate(&self) -> Result<()> {
        require(Self::NAME, "confirm", &self.confirm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{encode, parse};

    fn signatures() -> LevelMap {
        (1..=4).map(|l| (l.to_string(), format!("sig{l}"))).collect()
    }

    #[test]
    fn reject_never_carries_payload_member() {
        let request = ConfirmRequest {
            confirm: ConfirmDecision::Reject,
            signatures: signatures(),
            payload: None,
        };
        let json: serde_json::Value =
            serde_json::from_slice(&encode("confirm", &request).unwrap()).unwrap();

        assert_eq!(json["confirm"], "reject");
        assert_eq!(json["signatures"]["4"], "sig4");
        assert!(json.get("payload").is_none());
    }

    #[test]
    fn direct_enrolment_validate_has_no_identicon() {
        let reply: ValidateReply = parse(
            br#"{"confirmationURL": "https://c", "deviceId": "d1",
                 "publicKeys": {"1": "a", "2": "b", "3": "c", "4": "d"}}"#,
        )
        .unwrap();

        assert!(reply.validate().is_ok());
        assert!(reply.identicon_url.is_empty());
    }

    #[test]
    fn init_reply_without_direct_url_is_valid() {
        let reply: EnrolReply =
            parse(br#"{"qrCodeURL": "q", "validateURL": "v", "statusURL": "s"}"#).unwrap();

        assert!(reply.validate().is_ok());
        assert!(reply.direct_url.is_empty());
    }

    #[test]
    fn confirm_reply_parses_payload() {
        let reply: ConfirmReply = parse(
            br#"{"confirm": "confirm", "payloadVerifyURL": "https://v",
                 "payload": {"data": "aa", "key": "bb", "signature": "cc"}}"#,
        )
        .unwrap();

        assert!(reply.validate().is_ok());
        assert_eq!(reply.payload.map(|p| p.key), Some("bb".to_string()));
    }
}
