//! Service provider session.
//!
//! Every administrative and flow request after registration carries a
//! session id in the `sessionId` header. The id is obtained by signing a
//! server challenge with the SP key:
//!
//! ```text
//! GET  sp/authenticate-service/{serviceId}   → {authToken, spAuthChallenge}
//! POST sp/authenticate-service/              ← {authToken, spAuthChallengeSolution}
//!                                            → {sessionId}
//! ```
//!
//! The id lives in a [`OnceCell`], so concurrent first uses wait on a single
//! handshake.

use cipherise_core::{
    CipheriseError, HttpRequest, Result, ServerUrl, ServiceIdentity, decode_reply,
};
use cipherise_crypto::sign;
use cipherise_proto::{AuthChallengeReply, SessionReply, SessionRequest, paths};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::transport::Transport;

/// Server URL plus the lazily established session id.
#[derive(Debug)]
pub struct SessionContext {
    server: ServerUrl,
    session: OnceCell<String>,
}

impl SessionContext {
    /// Context with no session yet.
    pub fn new(server: ServerUrl) -> Self {
        Self { server, session: OnceCell::new() }
    }

    /// Server base URL.
    pub fn server(&self) -> &ServerUrl {
        &self.server
    }

    /// Session id if one has been established.
    pub fn current(&self) -> Option<&str> {
        self.session.get().map(String::as_str)
    }

    /// Session id, running the handshake on first use.
    pub async fn session_id<T: Transport>(
        &self,
        transport: &T,
        identity: &ServiceIdentity,
    ) -> Result<&str> {
        self.session
            .get_or_try_init(|| handshake(&self.server, transport, identity))
            .await
            .map(String::as_str)
    }

    /// Seed the context with a session obtained earlier.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if `session_id` is empty
    /// - `InvalidState` if a session is already established
    pub fn resume(&self, session_id: impl Into<String>) -> Result<()> {
        let session_id = session_id.into();
        if session_id.is_empty() {
            return Err(CipheriseError::InvalidInput { reason: "empty session id".to_string() });
        }
        self.session
            .set(session_id)
            .map_err(|_| CipheriseError::InvalidState { state: "SessionOpen", operation: "resume" })
    }

    /// Forget the session.
    pub fn clear(&mut self) {
        self.session.take();
    }
}

/// Run the challenge handshake and return the new session id.
pub async fn handshake<T: Transport>(
    server: &ServerUrl,
    transport: &T,
    identity: &ServiceIdentity,
) -> Result<String> {
    let url = server.endpoint_for(paths::AUTHENTICATE_SERVICE, identity.service_id(), None)?;
    let response = transport.request(HttpRequest::get(url)).await?;
    let challenge: AuthChallengeReply = decode_reply(&response)?;

    let solution = SessionRequest {
        auth_token: challenge.auth_token,
        solution: sign(identity.keys().private(), &challenge.challenge)?,
    };
    debug!(service_id = identity.service_id(), "service challenge signed");

    let request = HttpRequest::post(
        server.endpoint(paths::AUTHENTICATE_SERVICE)?,
        "session request",
        &solution,
    )?;
    let response = transport.request(request).await?;
    let reply: SessionReply = decode_reply(&response)?;

    info!(service_id = identity.service_id(), "session established");
    Ok(reply.session_id)
}
