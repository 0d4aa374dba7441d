//! Transport-neutral HTTP exchange types.
//!
//! Flows emit [`HttpRequest`]s and consume [`HttpResponse`]s; the driver owns
//! the actual client. [`decode_reply`] is the single place a response body
//! becomes a typed reply or one of the error classes.

use cipherise_proto::{ServerReply, WireError};
use serde::Serialize;

use crate::error::{CipheriseError, Result};

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST` with a JSON body
    Post,
}

/// Outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method
    pub method: Method,
    /// Absolute URL
    pub url: String,
    /// JSON body, `POST` only
    pub body: Option<Vec<u8>>,
    /// Value for the `sessionId` header
    pub session_id: Option<String>,
}

impl HttpRequest {
    /// `GET url`.
    pub fn get(url: impl Into<String>) -> Self {
        Self { method: Method::Get, url: url.into(), body: None, session_id: None }
    }

    /// `POST url` with `message` as the JSON body.
    pub fn post<T: Serialize>(
        url: impl Into<String>,
        name: &'static str,
        message: &T,
    ) -> Result<Self> {
        let body = cipherise_proto::encode(name, message)?;
        Ok(Self { method: Method::Post, url: url.into(), body: Some(body), session_id: None })
    }

    /// `POST url` without a body.
    pub fn post_empty(url: impl Into<String>) -> Self {
        Self { method: Method::Post, url: url.into(), body: None, session_id: None }
    }

    /// Attach a session id.
    #[must_use]
    pub fn with_session(mut self, session_id: Option<&str>) -> Self {
        self.session_id = session_id.map(str::to_string);
        self
    }
}

/// Inbound response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// Body bytes; empty when absent
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Response with a status and body.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self { status, body: body.into() }
    }

    /// True for 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Interpret a response as reply `T`.
///
/// # Errors
///
/// - `Transport` if the body is not a parseable reply, or the status is
///   non-2xx without an error block
/// - `Protocol` if the reply carries an error block
/// - `Schema` if a required field is missing
pub fn decode_reply<T: ServerReply>(response: &HttpResponse) -> Result<T> {
    let reply: T = match cipherise_proto::parse(&response.body) {
        Ok(reply) => reply,
        Err(WireError::Malformed { reason, .. }) => {
            return Err(CipheriseError::transport(format!(
                "HTTP {} with unreadable {} body: {reason}",
                response.status,
                T::NAME
            )));
        },
        Err(other) => return Err(other.into()),
    };

    if reply.error_fields().has_error() {
        return Err(CipheriseError::protocol(reply.error_fields()));
    }
    if !response.is_success() {
        return Err(CipheriseError::transport(format!(
            "HTTP {} for {}",
            response.status,
            T::NAME
        )));
    }

    reply.validate()?;
    Ok(reply)
}

/// Like [`decode_reply`], but the status must be exactly `expected`.
pub fn decode_reply_with_status<T: ServerReply>(
    response: &HttpResponse,
    expected: u16,
) -> Result<T> {
    let reply = decode_reply::<T>(response)?;
    if response.status != expected {
        return Err(CipheriseError::transport(format!(
            "HTTP {} for {}, expected {expected}",
            response.status,
            T::NAME
        )));
    }
    Ok(reply)
}
