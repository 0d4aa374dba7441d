//! Authentication messages: request, status, app challenge, challenge
//! exchange and the long-polled solution.

use serde::{Deserialize, Serialize};

use super::{ErrorFields, ServerReply, is_false, is_zero, null_default, require};
use crate::error::Result;

/// Error code sent when the SP could not sign the app challenge.
pub const UNABLE_TO_SIGN: i64 = 800;

/// How the device is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InteractionKind {
    /// Push notification to a known device
    Push,
    /// Device scans a code shown by the SP
    Wave,
}

/// Request type; only authentication is issued by this client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    /// Authenticate a user
    #[default]
    Authentication,
}

fn is_unset(level: &u8) -> bool {
    *level == 0
}

/// Members shared by the authentication request and the challenge exchange.
///
/// All of them are omitted when empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthDetails {
    /// Hex SP challenge the device must sign
    #[serde(rename = "authenticationChallenge", default, skip_serializing_if = "String::is_empty")]
    pub challenge: String,
    /// Requested trust level, 1..=4
    #[serde(rename = "authenticationLevel", default, skip_serializing_if = "is_unset")]
    pub level: u8,
    /// Push notification text
    #[serde(rename = "notificationMessage", default, skip_serializing_if = "String::is_empty")]
    pub notification_message: String,
    /// Text shown on the device
    #[serde(rename = "authenticationMessage", default, skip_serializing_if = "String::is_empty")]
    pub authentication_message: String,
    /// Branding shown on the device
    #[serde(rename = "brandingMessage", default, skip_serializing_if = "String::is_empty")]
    pub branding_message: String,
    /// Where the app returns after a wave authentication
    #[serde(rename = "appRedirectURL", default, skip_serializing_if = "String::is_empty")]
    pub app_redirect_url: String,
}

/// `POST sp/authentication` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequest {
    /// Request type
    #[serde(rename = "type")]
    pub kind: RequestType,
    /// Push or wave
    pub interaction: InteractionKind,
    /// Push only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Push only
    #[serde(rename = "deviceId", default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Challenge, level and display texts
    #[serde(flatten)]
    pub details: AuthDetails,
}

/// Authentication request reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthReply {
    /// Error block
    #[serde(flatten)]
    pub status: ErrorFields,
    /// Fetches the app's counter-challenge
    #[serde(rename = "appAuthenticationURL", default, deserialize_with = "null_default")]
    pub app_challenge_url: String,
    /// Exchange target and long-poll source of the solution
    #[serde(rename = "challengeExchangeURL", default, deserialize_with = "null_default")]
    pub exchange_url: String,
    /// Wave only: code image
    #[serde(rename = "qrURL", default, deserialize_with = "null_default")]
    pub scan_code_url: String,
    /// Wave only: app link
    #[serde(rename = "directURL", default, deserialize_with = "null_default")]
    pub direct_url: String,
    /// Polled for progress
    #[serde(rename = "statusURL", default, deserialize_with = "null_default")]
    pub status_url: String,
    /// Push delivery failure
    #[serde(rename = "pnErrorMessage", default, deserialize_with = "null_default")]
    pub push_error: String,
}

impl ServerReply for AuthReply {
    const NAME: &'static str = "authentication";

    fn error_fields(&self) -> &ErrorFields {
        &self.status
    }

    /// A push failure reply is valid as-is so the failure can be reported.
    fn validate(&self) -> Result<()> {
        if !self.push_error.is_empty() {
            return Ok(());
        }
        require(Self::NAME, "statusURL", &self.status_url)?;
        require(Self::NAME, "challengeExchangeURL", &self.exchange_url)?;
        require(Self::NAME, "appAuthenticationURL", &self.app_challenge_url)
    }
}

/// Authentication status reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStatusReply {
    /// Error block
    #[serde(flatten)]
    pub status: ErrorFields,
    /// Human-readable status
    #[serde(rename = "statusText", default, deserialize_with = "null_default")]
    pub status_text: String,
    /// See [`crate::AuthStatus`]
    #[serde(rename = "statusCode", default, deserialize_with = "null_default")]
    pub status_code: i64,
}

impl ServerReply for AuthStatusReply {
    const NAME: &'static str = "authentication status";

    fn error_fields(&self) -> &ErrorFields {
        &self.status
    }
}

/// App counter-challenge reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppChallengeReply {
    /// Hex challenge for the SP to sign
    #[serde(rename = "appChallenge", default, deserialize_with = "null_default")]
    pub app_challenge: String,
    /// User the device identified as
    #[serde(default, deserialize_with = "null_default")]
    pub username: String,
    /// Error block
    #[serde(flatten)]
    pub status: ErrorFields,
}

impl ServerReply for AppChallengeReply {
    const NAME: &'static str = "app challenge";

    fn error_fields(&self) -> &ErrorFields {
        &self.status
    }

    fn validate(&self) -> Result<()> {
        require(Self::NAME, "appChallenge", &self.app_challenge)
    }
}

/// `POST challengeExchangeURL` body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRequest {
    /// Challenge, level and display texts
    #[serde(flatten)]
    pub details: AuthDetails,
    /// SP signature over the app challenge
    #[serde(rename = "appChallengeSolution", default, skip_serializing_if = "String::is_empty")]
    pub solution: String,
    /// Set when the SP reports a failure instead of a solution
    #[serde(default, skip_serializing_if = "is_false")]
    pub error: bool,
    /// 800..=899
    #[serde(rename = "errorCode", default, skip_serializing_if = "is_zero")]
    pub error_code: i64,
    /// Optional failure text
    #[serde(rename = "errorMessage", default, skip_serializing_if = "String::is_empty")]
    pub error_message: String,
    /// Always emitted
    #[serde(rename = "waitForAppSolution", default)]
    pub wait_for_app_solution: bool,
}

impl ExchangeRequest {
    /// Exchange carrying a solution.
    pub fn solved(details: AuthDetails, solution: String) -> Self {
        Self { details, solution, ..Self::default() }
    }

    /// Exchange reporting a failure. Every other member is cleared.
    pub fn failed(code: i64) -> Self {
        Self { error: true, error_code: code, ..Self::default() }
    }

    /// True if this exchange reports a failure.
    pub fn is_error(&self) -> bool {
        self.error
    }
}

/// Long-polled authentication solution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionReply {
    /// Error block
    #[serde(flatten)]
    pub status: ErrorFields,
    /// Device signature over the SP challenge
    #[serde(rename = "authenticationSolution", default, deserialize_with = "null_default")]
    pub solution: String,
    /// `true`, `false`, `cancelled`, `report` or `reported`
    #[serde(default, deserialize_with = "null_default")]
    pub authenticated: String,
    /// Device name chosen by the user
    #[serde(rename = "deviceFriendlyName", default, deserialize_with = "null_default")]
    pub device_name: String,
    /// Responding device
    #[serde(rename = "deviceId", default, deserialize_with = "null_default")]
    pub device_id: String,
    /// Responding user
    #[serde(default, deserialize_with = "null_default")]
    pub username: String,
    /// Device public key PEM at `publicKeyLevel`
    #[serde(rename = "publicKey", default, deserialize_with = "null_default")]
    pub public_key: String,
    /// Level of `publicKey`; absent means unset
    #[serde(rename = "publicKeyLevel", default)]
    pub public_key_level: Option<i64>,
    /// SP signature for `publicKey` at its level
    #[serde(rename = "keySignature", default, deserialize_with = "null_default")]
    pub key_signature: String,
    /// Payload exchange target
    #[serde(rename = "payloadURL", default, deserialize_with = "null_default")]
    pub payload_url: String,
    /// Finalizer target; only sent with an accepted solution
    #[serde(rename = "verifyAuthenticationURL", default, deserialize_with = "null_default")]
    pub verify_url: String,
}

impl SolutionReply {
    /// Key level if it is one of 1..=4.
    pub fn level(&self) -> Option<u8> {
        self.public_key_level
            .and_then(|level| u8::try_from(level).ok())
            .filter(|level| (1..=4).contains(level))
    }

    /// True if the device reported `authenticated: true`.
    pub fn claims_accept(&self) -> bool {
        self.authenticated.eq_ignore_ascii_case("true")
    }
}

impl ServerReply for SolutionReply {
    const NAME: &'static str = "authentication solution";

    fn error_fields(&self) -> &ErrorFields {
        &self.status
    }

    fn validate(&self) -> Result<()> {
        require(Self::NAME, "authenticated", &self.authenticated)?;
        if !self.claims_accept() {
            return Ok(());
        }

        require(Self::NAME, "verifyAuthenticationURL", &self.verify_url)?;
        require(Self::NAME, "deviceId", &self.device_id)?;
        require(Self::NAME, "username", &self.username)?;
        require(Self::NAME, "authenticationSolution", &self.solution)?;
        require(Self::NAME, "publicKey", &self.public_key)?;
        require(Self::NAME, "keySignature", &self.key_signature)?;
        match self.level() {
            Some(_) => Ok(()),
            None => Err(crate::WireError::InvalidField {
                message: Self::NAME,
                field: "publicKeyLevel",
                reason: format!("{:?} is not a level", self.public_key_level),
            }),
        }
    }
}
