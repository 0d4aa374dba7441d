//! Service provider administration: session handshake, registration,
//! device listing and revocation.

use serde::{Deserialize, Serialize};

use super::{ErrorFields, LevelMap, ServerReply, null_default, require, require_levels};
use crate::error::Result;

/// `GET sp/authenticate-service/{serviceId}` reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthChallengeReply {
    /// Error block
    #[serde(flatten)]
    pub status: ErrorFields,
    /// Token echoed back with the solution
    #[serde(rename = "authToken", default, deserialize_with = "null_default")]
    pub auth_token: String,
    /// Hex challenge to sign with the SP key
    #[serde(rename = "spAuthChallenge", default, deserialize_with = "null_default")]
    pub challenge: String,
}

impl ServerReply for AuthChallengeReply {
    const NAME: &'static str = "service challenge";

    fn error_fields(&self) -> &ErrorFields {
        &self.status
    }

    fn validate(&self) -> Result<()> {
        require(Self::NAME, "authToken", &self.auth_token)?;
        require(Self::NAME, "spAuthChallenge", &self.challenge)
    }
}

/// `POST sp/authenticate-service/` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequest {
    /// Token from the challenge reply
    #[serde(rename = "authToken")]
    pub auth_token: String,
    /// Hex signature over the challenge
    #[serde(rename = "spAuthChallengeSolution")]
    pub solution: String,
}

/// Session handshake reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReply {
    /// Error block
    #[serde(flatten)]
    pub status: ErrorFields,
    /// Session id for the `sessionId` header
    #[serde(rename = "sessionId", default, deserialize_with = "null_default")]
    pub session_id: String,
}

impl ServerReply for SessionReply {
    const NAME: &'static str = "session reply";

    fn error_fields(&self) -> &ErrorFields {
        &self.status
    }

    fn validate(&self) -> Result<()> {
        require(Self::NAME, "sessionId", &self.session_id)
    }
}

/// `GET info` reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoReply {
    /// Error block
    #[serde(flatten)]
    pub status: ErrorFields,
    /// Server version string
    #[serde(rename = "serverVersion", default, deserialize_with = "null_default")]
    pub server_version: String,
}

impl ServerReply for InfoReply {
    const NAME: &'static str = "server info";

    fn error_fields(&self) -> &ErrorFields {
        &self.status
    }

    fn validate(&self) -> Result<()> {
        require(Self::NAME, "serverVersion", &self.server_version)
    }
}

/// `POST sp/create-service/` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateServiceRequest {
    /// Name shown to users on their devices
    #[serde(rename = "friendlyName")]
    pub friendly_name: String,
    /// SP public key, SubjectPublicKeyInfo PEM
    #[serde(rename = "publicKey")]
    pub public_key: String,
}

/// Registration reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateServiceReply {
    /// Error block
    #[serde(flatten)]
    pub status: ErrorFields,
    /// Server-assigned service id
    #[serde(rename = "serviceId", default, deserialize_with = "null_default")]
    pub service_id: String,
}

impl ServerReply for CreateServiceReply {
    const NAME: &'static str = "service registration";

    fn error_fields(&self) -> &ErrorFields {
        &self.status
    }

    fn validate(&self) -> Result<()> {
        require(Self::NAME, "serviceId", &self.service_id)
    }
}

/// One device from the `sp/user-devices/` listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Device id
    #[serde(rename = "deviceId", default, deserialize_with = "null_default")]
    pub device_id: String,
    /// Device name chosen by the user
    #[serde(rename = "friendlyName", default, deserialize_with = "null_default")]
    pub friendly_name: String,
    /// Public keys by level
    #[serde(rename = "publicKeys", default, deserialize_with = "null_default")]
    pub public_keys: LevelMap,
    /// SP signatures by level
    #[serde(default, deserialize_with = "null_default")]
    pub signatures: LevelMap,
    /// Non-zero if the binding is authorised
    #[serde(rename = "bindingAuthorised", default, deserialize_with = "null_default")]
    pub binding_authorised: i64,
    /// Non-zero if the device is authorised
    #[serde(rename = "deviceAuthorised", default, deserialize_with = "null_default")]
    pub device_authorised: i64,
}

impl DeviceEntry {
    const NAME: &'static str = "device entry";

    /// Check identity fields and both level maps.
    pub fn validate(&self) -> Result<()> {
        require(Self::NAME, "deviceId", &self.device_id)?;
        require(Self::NAME, "friendlyName", &self.friendly_name)?;
        require_levels(Self::NAME, "publicKeys", &self.public_keys)?;
        require_levels(Self::NAME, "signatures", &self.signatures)
    }

    /// True if both the binding and the device are authorised.
    pub fn is_authorised(&self) -> bool {
        self.binding_authorised != 0 && self.device_authorised != 0
    }
}

/// Device listing reply.
///
/// Entries are validated one at a time by the caller so a single bad device
/// does not hide the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicesReply {
    /// Error block
    #[serde(flatten)]
    pub status: ErrorFields,
    /// Devices bound to the user
    #[serde(default, deserialize_with = "null_default")]
    pub devices: Vec<DeviceEntry>,
}

impl ServerReply for DevicesReply {
    const NAME: &'static str = "user devices";

    fn error_fields(&self) -> &ErrorFields {
        &self.status
    }
}

/// `POST sp/revoke-user/` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeUserRequest {
    /// User to revoke
    pub username: String,
    /// Restrict revocation to these devices; all devices when absent
    #[serde(rename = "deviceIds", default, skip_serializing_if = "Option::is_none")]
    pub device_ids: Option<Vec<String>>,
}

/// User revocation reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeUserReply {
    /// Error block
    #[serde(flatten)]
    pub status: ErrorFields,
    /// Requested device ids the server did not know
    #[serde(
        rename = "invalidDeviceIds",
        default,
        deserialize_with = "null_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub invalid_device_ids: Vec<String>,
}

impl ServerReply for RevokeUserReply {
    const NAME: &'static str = "user revocation";

    fn error_fields(&self) -> &ErrorFields {
        &self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{encode, parse};

    #[test]
    fn challenge_reply_requires_token_and_challenge() {
        let reply: AuthChallengeReply =
            parse(br#"{"authToken": "t", "spAuthChallenge": "abcd"}"#).unwrap();
        assert!(reply.validate().is_ok());

        let missing: AuthChallengeReply = parse(br#"{"authToken": "t"}"#).unwrap();
        assert!(missing.validate().is_err());
    }

    #[test]
    fn revoke_user_omits_absent_device_list() {
        let all = RevokeUserRequest { username: "alice".into(), device_ids: None };
        assert_eq!(encode("r", &all).unwrap(), br#"{"username":"alice"}"#);

        let some =
            RevokeUserRequest { username: "alice".into(), device_ids: Some(vec!["d1".into()]) };
        assert_eq!(encode("r", &some).unwrap(), br#"{"username":"alice","deviceIds":["d1"]}"#);
    }

    #[test]
    fn device_listing_parses_level_maps() {
        let reply: DevicesReply = parse(
            br#"{"devices": [{
                "deviceId": "d1", "friendlyName": "Phone",
                "publicKeys": {"1": "a", "2": "b", "3": "c", "4": "d"},
                "signatures": {"1": "e", "2": "f", "3": "g", "4": "h"},
                "bindingAuthorised": 1, "deviceAuthorised": 0
            }]}"#,
        )
        .unwrap();

        let device = &reply.devices[0];
        assert!(device.validate().is_ok());
        assert!(!device.is_authorised());
        assert_eq!(device.public_keys.get("3").map(String::as_str), Some("c"));
    }

    #[test]
    fn device_with_partial_chain_fails_validation() {
        let device = DeviceEntry {
            device_id: "d1".into(),
            friendly_name: "Phone".into(),
            public_keys: (1..=4).map(|l| (l.to_string(), "k".into())).collect(),
            signatures: (1..=2).map(|l| (l.to_string(), "s".into())).collect(),
            ..DeviceEntry::default()
        };

        assert!(device.validate().is_err());
    }
}
