//! Endpoint paths, relative to the Cipherise server base URL.
//!
//! Flow-specific follow-up URLs (status, validate, confirm, exchange, verify)
//! are absolute and come from the server; only entry points live here.

/// Server version. No session required.
pub const INFO: &str = "info";

/// Session handshake: `GET` + `{serviceId}` for the challenge, `POST` for the
/// solution.
pub const AUTHENTICATE_SERVICE: &str = "sp/authenticate-service/";

/// Service provider registration. Replies `201 Created`.
pub const CREATE_SERVICE: &str = "sp/create-service/";

/// Service provider revocation.
pub const REVOKE_SERVICE: &str = "sp/revoke-service/";

/// Enrolment entry point.
pub const ENROL_USER: &str = "sp/enrol-user";

/// Authentication entry point (push and wave).
pub const AUTHENTICATION: &str = "sp/authentication";

/// Device listing: `+ {escaped username}[?all=true]`.
pub const USER_DEVICES: &str = "sp/user-devices/";

/// User or device revocation.
pub const REVOKE_USER: &str = "sp/revoke-user/";

/// HTTP header carrying the session id.
pub const SESSION_HEADER: &str = "sessionId";
