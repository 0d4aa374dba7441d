//! Cipherise Wire Protocol
//!
//! JSON message bodies for the Cipherise service provider API, the error
//! block every reply carries, status codes, and endpoint paths.
//!
//! # Replies
//!
//! ```text
//! body bytes ──parse──> T: ServerReply ──has_error?──> protocol error
//!                                      └─validate()──> missing / invalid field
//! ```
//!
//! Replies are lenient: absent members and `null` read as defaults, so the
//! error block can be inspected before any payload field is required.
//!
//! # Requests
//!
//! Optional request members are omitted when empty. The server treats an
//! empty string differently from an absent member in several places (e.g.
//! `appRedirectURL`).

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod error;
pub mod messages;
pub mod paths;
pub mod status;

pub use error::{Result, WireError};
pub use messages::{
    EmptyReply, ErrorFields, LevelMap, ServerReply,
    auth::{
        AppChallengeReply, AuthDetails, AuthReply, AuthRequest, AuthStatusReply, ExchangeRequest,
        InteractionKind, RequestType, SolutionReply, UNABLE_TO_SIGN,
    },
    encode,
    enrol::{
        ConfirmDecision, ConfirmReply, ConfirmRequest, EnrolReply, EnrolRequest, EnrolStatusReply,
        ValidateReply,
    },
    parse,
    payload::{PayloadEnvelope, PayloadExchange, PayloadRequest, PayloadResponse, VerifyRequest},
    service::{
        AuthChallengeReply, CreateServiceReply, CreateServiceRequest, DeviceEntry, DevicesReply,
        InfoReply, RevokeUserReply, RevokeUserRequest, SessionReply, SessionRequest,
    },
};
pub use status::{AuthStatus, ScanStatus};
