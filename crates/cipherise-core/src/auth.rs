//! Authentication state machine.
//!
//! Push and wave authentications share one machine; they differ only in how
//! the request reaches the device.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐ POST authentication ┌───────────┐ wave: show code ┌─────────────┐
//! │ Init │────────────────────>│ Requested │────────────────>│ ShowingCode │
//! └──────┘                     └───────────┘                 └─────────────┘
//!    ↑ timeout + repeat              │ push                         │
//!    │                        ┌──────↓──┐ <────────────────────────┘
//!    └────────────────────────│ Polling │──40300──> FetchingChallenge ──> Exchanging
//!                             └─────────┘                                    │
//!                                  │ 40500          (short poll: back to polling)
//!                          ┌───────↓──────────┐ <──────────(long poll)───────┘
//!                          │ AwaitingSolution │──accept──> verify ──> payload
//!                          └──────────────────┘                          │
//!                                  │ cancel / report                     │
//!                             ┌────↓──────┐ <───────────────────────────┘
//!                             │ Verifying │──> Done
//!                             └───────────┘
//! ```
//!
//! # Security
//!
//! An `Accept` is only reported after three checks pass: the device key
//! parses, the device signed this run's SP challenge with it, and the SP's
//! own signature binds that key to the user and device at the claimed
//! level. Any failure downgrades the outcome to `Cancel`.
//!
//! Once a solution has been collected the verify finalizer is always
//! posted, so the server never waits on an unfinished authentication.

use std::collections::BTreeMap;

use cipherise_crypto::{Binding, PublicKey, sign, verify, verify_level};
use cipherise_proto::{
    AppChallengeReply, AuthDetails, AuthReply, AuthRequest, AuthStatus, AuthStatusReply,
    EmptyReply, ErrorFields, ExchangeRequest, InteractionKind, PayloadExchange, PayloadRequest,
    RequestType, SolutionReply, UNABLE_TO_SIGN, VerifyRequest, WireError, paths,
};
use tracing::{debug, info, warn};

use crate::{
    env::Environment,
    error::{CipheriseError, PayloadError, Result},
    flow::{Decision, Flow, FlowAction, FlowContext, FlowEvent, Notice, PollInterval, Prompt},
    http::{HttpRequest, HttpResponse, decode_reply},
    payload,
};

/// Size of the SP challenge in bytes.
pub const CHALLENGE_SIZE: usize = 32;

const INVALID_DEVICE_KEY: &str = "Unable to get PEM from the devices public key.";
const INVALID_SOLUTION: &str = "Invalid authentication solution!";
const INVALID_KEY_SIGNATURE: &str = "Invalid device signature!";

/// How the device is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthKind {
    /// Push notification to an enrolled device.
    Push {
        /// User to authenticate
        username: String,
        /// Device to notify
        device_id: String,
        /// Notification text
        notification_message: String,
    },
    /// The user scans a code shown by the service provider.
    Wave {
        /// Where the app returns afterwards; empty for none
        app_redirect_url: String,
    },
}

impl AuthKind {
    fn interaction(&self) -> InteractionKind {
        match self {
            Self::Push { .. } => InteractionKind::Push,
            Self::Wave { .. } => InteractionKind::Wave,
        }
    }
}

/// Trust level the device must authenticate at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum AuthLevel {
    /// Acknowledge a notification
    Notification = 1,
    /// Approve or decline
    #[default]
    Approval = 2,
    /// Approve with a biometric
    Biometric = 3,
    /// Approve with the OneTiCK gesture
    OneTick = 4,
}

impl AuthLevel {
    /// Wire value, 1..=4.
    pub fn value(self) -> u8 {
        self as u8
    }

    /// Level for a wire value.
    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Notification),
            2 => Some(Self::Approval),
            3 => Some(Self::Biometric),
            4 => Some(Self::OneTick),
            _ => None,
        }
    }
}

/// Outcome of an authentication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthResponse {
    /// The user approved and every check passed
    Accept,
    /// Declined, expired, abandoned or failed verification
    #[default]
    Cancel,
    /// The user flagged the request as suspicious
    Report,
}

/// Caller's authentication parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationRequest {
    /// Push or wave
    pub kind: AuthKind,
    /// Required trust level
    pub level: AuthLevel,
    /// Text shown on the device
    pub authentication_message: String,
    /// Branding shown on the device
    pub branding_message: String,
    /// Status polling policy
    pub interval: PollInterval,
    /// Start over with a fresh challenge when the request expires
    pub repeat_on_timeout: bool,
}

impl AuthenticationRequest {
    /// Request with default polling. Wave requests repeat on timeout, push
    /// requests do not.
    pub fn new(kind: AuthKind, level: AuthLevel) -> Self {
        let repeat_on_timeout = matches!(kind, AuthKind::Wave { .. });
        Self {
            kind,
            level,
            authentication_message: String::new(),
            branding_message: String::new(),
            interval: PollInterval::Default,
            repeat_on_timeout,
        }
    }

    /// Set the texts shown on the device.
    #[must_use]
    pub fn with_messages(
        mut self,
        authentication_message: impl Into<String>,
        branding_message: impl Into<String>,
    ) -> Self {
        self.authentication_message = authentication_message.into();
        self.branding_message = branding_message.into();
        self
    }

    /// Set the polling policy.
    #[must_use]
    pub fn with_interval(mut self, interval: PollInterval) -> Self {
        self.interval = interval;
        self
    }
}

/// Final authentication outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthenticationReport {
    /// Outcome
    pub response: AuthResponse,
    /// Responding user, if known
    pub username: String,
    /// Responding device's friendly name, if known
    pub device_name: String,
    /// Responding device, if known
    pub device_id: String,
    /// True if the server acknowledged an accepted authentication
    pub verified: bool,
    /// Device's answers to the payload `get` keys
    pub payload: Option<BTreeMap<String, String>>,
}

/// Authentication state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// Not started
    Init,
    /// Waiting for the authentication reply
    Requested,
    /// Waiting for the caller to show the scan code
    ShowingCode,
    /// Waiting for the caller to show the direct URL
    ShowingDirectUrl,
    /// Waiting for the status reply
    Polling,
    /// Waiting for a poll continuation decision
    AskingContinue,
    /// Waiting between polls
    Sleeping,
    /// Waiting for the app challenge
    FetchingChallenge,
    /// Waiting for the challenge exchange reply
    Exchanging,
    /// Waiting for the reply to a failure exchange sent after an error
    ReportingFailure,
    /// Waiting for the long-polled solution
    AwaitingSolution,
    /// Waiting for the payload to send
    AskingPayload,
    /// Waiting for the payload exchange reply
    SendingPayload,
    /// Waiting for the caller to review the device's payload answer
    ReviewingPayload,
    /// Waiting for the verify reply
    Verifying,
    /// Finished
    Done,
    /// Failed
    Failed,
}

impl AuthState {
    fn name(self) -> &'static str {
        match self {
            Self::Init => "Init",
            Self::Requested => "Requested",
            Self::ShowingCode => "ShowingCode",
            Self::ShowingDirectUrl => "ShowingDirectUrl",
            Self::Polling => "Polling",
            Self::AskingContinue => "AskingContinue",
            Self::Sleeping => "Sleeping",
            Self::FetchingChallenge => "FetchingChallenge",
            Self::Exchanging => "Exchanging",
            Self::ReportingFailure => "ReportingFailure",
            Self::AwaitingSolution => "AwaitingSolution",
            Self::AskingPayload => "AskingPayload",
            Self::SendingPayload => "SendingPayload",
            Self::ReviewingPayload => "ReviewingPayload",
            Self::Verifying => "Verifying",
            Self::Done => "Done",
            Self::Failed => "Failed",
        }
    }
}

type Actions = Vec<FlowAction<AuthenticationReport>>;

/// Authentication flow for one request.
#[derive(Debug)]
pub struct AuthenticationFlow<E: Environment> {
    ctx: FlowContext,
    env: E,
    request: AuthenticationRequest,
    state: AuthState,
    challenge: String,
    urls: AuthReply,
    waiting_notified: bool,
    /// True if the exchange in flight already reports a failure
    exchange_is_error: bool,
    pending: Option<CipheriseError>,
    solution: SolutionReply,
    device_key: Option<PublicKey>,
    sent_set: bool,
    response: AuthResponse,
    fail_reason: Option<String>,
    received: Option<BTreeMap<String, String>>,
}

impl<E: Environment> AuthenticationFlow<E> {
    /// Create a flow in [`AuthState::Init`].
    pub fn new(ctx: FlowContext, env: E, request: AuthenticationRequest) -> Self {
        Self {
            ctx,
            env,
            request,
            state: AuthState::Init,
            challenge: String::new(),
            urls: AuthReply::default(),
            waiting_notified: false,
            exchange_is_error: false,
            pending: None,
            solution: SolutionReply::default(),
            device_key: None,
            sent_set: false,
            response: AuthResponse::Cancel,
            fail_reason: None,
            received: None,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> AuthState {
        self.state
    }

    /// SP challenge of the current attempt, hex. Empty before start.
    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    fn transition(&mut self, next: AuthState) {
        debug!(from = self.state.name(), to = next.name(), "authentication transition");
        self.state = next;
    }

    fn send(&mut self, next: AuthState, request: HttpRequest) -> Actions {
        self.transition(next);
        vec![FlowAction::Send(self.ctx.authorize(request))]
    }

    fn prompt(&mut self, next: AuthState, prompt: Prompt) -> Actions {
        self.transition(next);
        vec![FlowAction::Prompt(prompt)]
    }

    fn long_poll(&self) -> bool {
        self.request.interval == PollInterval::LongPoll
    }

    fn details(&self) -> AuthDetails {
        let (notification_message, app_redirect_url) = match &self.request.kind {
            AuthKind::Push { notification_message, .. } => {
                (notification_message.clone(), String::new())
            },
            AuthKind::Wave { app_redirect_url } => (String::new(), app_redirect_url.clone()),
        };
        AuthDetails {
            challenge: self.challenge.clone(),
            level: self.request.level.value(),
            notification_message,
            authentication_message: self.request.authentication_message.clone(),
            branding_message: self.request.branding_message.clone(),
            app_redirect_url,
        }
    }

    fn begin(&mut self) -> Result<Actions> {
        let mut challenge = [0u8; CHALLENGE_SIZE];
        self.env.random_bytes(&mut challenge);
        self.challenge = hex::encode(challenge);
        self.urls = AuthReply::default();
        self.waiting_notified = false;

        let (username, device_id) = match &self.request.kind {
            AuthKind::Push { username, device_id, .. } => {
                (Some(username.clone()), Some(device_id.clone()))
            },
            AuthKind::Wave { .. } => (None, None),
        };
        let body = AuthRequest {
            kind: RequestType::Authentication,
            interaction: self.request.kind.interaction(),
            username,
            device_id,
            details: self.details(),
        };

        let url = self.ctx.server.endpoint(paths::AUTHENTICATION)?;
        let request = HttpRequest::post(url, "authentication request", &body)?;
        Ok(self.send(AuthState::Requested, request))
    }

    fn on_requested(&mut self, response: &HttpResponse) -> Result<Actions> {
        let reply: AuthReply = decode_reply(response)?;
        if !reply.push_error.is_empty() {
            warn!(reason = %reply.push_error, "push notification not delivered");
            return Err(CipheriseError::protocol(&ErrorFields::from_message(reply.push_error)));
        }
        self.urls = reply;

        match self.request.kind {
            AuthKind::Push { .. } => self.start_polling(),
            AuthKind::Wave { .. } => {
                if self.urls.scan_code_url.is_empty() {
                    let missing =
                        WireError::MissingField { message: "authentication", field: "qrURL" };
                    return Err(missing.into());
                }
                let url = self.urls.scan_code_url.clone();
                Ok(self.prompt(AuthState::ShowingCode, Prompt::ShowScanCode { url }))
            },
        }
    }

    fn after_code_shown(&mut self) -> Result<Actions> {
        if self.state == AuthState::ShowingCode && !self.urls.direct_url.is_empty() {
            let url = self.urls.direct_url.clone();
            return Ok(self.prompt(AuthState::ShowingDirectUrl, Prompt::ShowDirectUrl { url }));
        }
        self.start_polling()
    }

    fn start_polling(&mut self) -> Result<Actions> {
        if self.long_poll() { Ok(self.fetch_challenge()) } else { Ok(self.poll_status()) }
    }

    fn poll_status(&mut self) -> Actions {
        let url = self.urls.status_url.clone();
        self.send(AuthState::Polling, HttpRequest::get(url))
    }

    fn ask_continue(&mut self) -> Actions {
        self.prompt(AuthState::AskingContinue, Prompt::ContinuePolling)
    }

    fn waiting_for_app(&mut self, actions: &mut Actions) {
        if !self.waiting_notified {
            self.waiting_notified = true;
            actions.push(FlowAction::Notify(Notice::WaitingForApp));
        }
    }

    fn on_status(&mut self, response: &HttpResponse) -> Result<Actions> {
        let reply: AuthStatusReply = match decode_reply(response) {
            Ok(reply) => reply,
            Err(err) if err.mentions_timeout() => return self.timed_out(),
            Err(err) => return Err(err),
        };
        let status = AuthStatus::from_code(reply.status_code);
        debug!(code = reply.status_code, text = %reply.status_text, "authentication status");

        let mut actions = Vec::new();
        if status != AuthStatus::Init {
            self.waiting_for_app(&mut actions);
        }
        match status {
            AuthStatus::NotFound => actions.extend(self.timed_out()?),
            AuthStatus::Done => actions.extend(self.await_solution()),
            AuthStatus::PendingSp => actions.extend(self.fetch_challenge()),
            AuthStatus::Init
            | AuthStatus::Scanned
            | AuthStatus::PendingApp
            | AuthStatus::Other(_) => actions.extend(self.ask_continue()),
        }
        Ok(actions)
    }

    fn timed_out(&mut self) -> Result<Actions> {
        info!(repeat = self.request.repeat_on_timeout, "authentication request expired");
        let mut actions = vec![FlowAction::Notify(Notice::Timeout)];
        if self.request.repeat_on_timeout {
            actions.extend(self.begin()?);
        } else {
            actions.extend(self.cancelled());
        }
        Ok(actions)
    }

    fn fetch_challenge(&mut self) -> Actions {
        let url = self.urls.app_challenge_url.clone();
        self.send(AuthState::FetchingChallenge, HttpRequest::get(url))
    }

    fn on_app_challenge(&mut self, response: &HttpResponse) -> Result<Actions> {
        let reply: AppChallengeReply = match decode_reply(response) {
            Ok(reply) => reply,
            Err(err) if err.mentions_timeout() => return self.timed_out(),
            Err(err) => return Err(err),
        };

        let mut actions = Vec::new();
        if self.long_poll() {
            self.waiting_for_app(&mut actions);
        }

        let exchange = match sign(self.ctx.identity.keys().private(), &reply.app_challenge) {
            Ok(solution) => ExchangeRequest::solved(self.details(), solution),
            // The device still hears 800, but an SP that cannot sign ends the flow.
            Err(err) => {
                warn!(error = %err, "app challenge could not be signed");
                self.pending = Some(err.into());
                ExchangeRequest::failed(UNABLE_TO_SIGN)
            },
        };
        if !reply.username.is_empty() {
            let username = reply.username;
            actions.push(FlowAction::Notify(Notice::AppIdentifiedUser { username }));
        }

        self.exchange_is_error = exchange.is_error();
        let url = self.urls.exchange_url.clone();
        let request = HttpRequest::post(url, "challenge exchange", &exchange)?;
        actions.extend(self.send(AuthState::Exchanging, request));
        Ok(actions)
    }

    fn on_exchanged(&mut self, outcome: Result<()>) -> Result<Actions> {
        if let Some(err) = self.pending.take() {
            return Err(err);
        }
        match outcome {
            Ok(()) if self.long_poll() => Ok(self.await_solution()),
            Ok(()) => Ok(self.ask_continue()),
            Err(err) if self.exchange_is_error => Err(err),
            Err(err) => {
                warn!(error = %err, "challenge exchange failed, reporting to device");
                let notice = Notice::Error { message: err.to_string() };
                let mut actions = vec![FlowAction::Notify(notice)];
                self.pending = Some(err);
                self.exchange_is_error = true;
                let request = HttpRequest::post(
                    self.urls.exchange_url.clone(),
                    "challenge exchange",
                    &ExchangeRequest::failed(UNABLE_TO_SIGN),
                )?;
                actions.extend(self.send(AuthState::ReportingFailure, request));
                Ok(actions)
            },
        }
    }

    fn await_solution(&mut self) -> Actions {
        let url = self.urls.exchange_url.clone();
        self.send(AuthState::AwaitingSolution, HttpRequest::get(url))
    }

    fn on_solution(&mut self, response: &HttpResponse) -> Result<Actions> {
        let reply: SolutionReply = match decode_reply(response) {
            Ok(reply) => reply,
            Err(err) if err.mentions_timeout() => return self.timed_out(),
            Err(err) => return Err(err),
        };

        let authenticated = reply.authenticated.to_ascii_lowercase();
        self.response = match authenticated.as_str() {
            "true" => AuthResponse::Accept,
            "false" | "cancelled" => AuthResponse::Cancel,
            "report" | "reported" => AuthResponse::Report,
            other => {
                self.fail_reason = Some(format!("Invalid authentication response: {other}"));
                AuthResponse::Cancel
            },
        };
        info!(
            response = ?self.response,
            device_id = %reply.device_id,
            "authentication solution received"
        );

        let checked = (self.response == AuthResponse::Accept).then(|| self.check_solution(&reply));
        self.solution = reply;

        match checked {
            Some(Ok(device_key)) => {
                self.device_key = Some(device_key);
                Ok(self.prompt(AuthState::AskingPayload, Prompt::PayloadToSend))
            },
            Some(Err(reason)) => {
                warn!(%reason, "authentication solution rejected");
                self.fail_reason = Some(reason.to_string());
                self.finalize()
            },
            None => self.finalize(),
        }
    }

    fn check_solution(
        &self,
        reply: &SolutionReply,
    ) -> std::result::Result<PublicKey, &'static str> {
        let device_key = PublicKey::from_pem(&reply.public_key).map_err(|_| INVALID_DEVICE_KEY)?;
        if !verify(&device_key, &self.challenge, &reply.solution) {
            return Err(INVALID_SOLUTION);
        }

        let binding = Binding::new(
            self.ctx.server.as_str(),
            self.ctx.identity.service_id(),
            &reply.username,
            &reply.device_id,
        );
        let level = reply.level().unwrap_or_default();
        if !verify_level(
            self.ctx.identity.keys().public(),
            &binding,
            &reply.public_key,
            level,
            &reply.key_signature,
        ) {
            return Err(INVALID_KEY_SIGNATURE);
        }
        Ok(device_key)
    }

    fn on_payload_to_send(&mut self, request: &PayloadRequest) -> Result<Actions> {
        if request.is_empty() || self.solution.payload_url.is_empty() {
            return self.finalize();
        }
        let Some(device_key) = self.device_key.as_ref() else {
            return self.finalize();
        };

        match payload::encode(request, device_key, self.ctx.identity.keys().private(), &self.env) {
            Ok(Some(envelope)) => {
                self.sent_set = !request.set.is_empty();
                let request = HttpRequest::post(
                    self.solution.payload_url.clone(),
                    "payload exchange",
                    &PayloadExchange::new(envelope),
                )?;
                Ok(self.send(AuthState::SendingPayload, request))
            },
            Ok(None) => self.finalize(),
            Err(err) => self.payload_failed(&err),
        }
    }

    fn on_payload_reply(&mut self, response: Option<&HttpResponse>) -> Result<Actions> {
        match self.open_payload_reply(response) {
            Ok(values) => {
                self.received = Some(values.clone());
                Ok(self.prompt(AuthState::ReviewingPayload, Prompt::PayloadReceived { values }))
            },
            Err(err) => self.payload_failed(&err),
        }
    }

    fn open_payload_reply(
        &self,
        response: Option<&HttpResponse>,
    ) -> std::result::Result<BTreeMap<String, String>, PayloadError> {
        let response = response.ok_or(PayloadError::SendFailed)?;
        let reply: PayloadExchange = decode_reply(response).map_err(|err| match err {
            CipheriseError::Protocol { message, .. } => PayloadError::Rejected(message),
            _ => PayloadError::ResponseParse,
        })?;
        let envelope = reply.payload.ok_or(PayloadError::ResponseParse)?;
        let device_key = self.device_key.as_ref().ok_or(PayloadError::ResponseParse)?;

        let opened = payload::decode(&envelope, device_key, self.ctx.identity.keys().private())?;
        if self.sent_set && !opened.set_response {
            return Err(PayloadError::SetFailed);
        }
        Ok(opened.get_response)
    }

    fn payload_failed(&mut self, err: &PayloadError) -> Result<Actions> {
        warn!(error = %err, "authentication payload failed");
        self.fail_reason = Some(err.to_string());
        self.finalize()
    }

    fn finalize(&mut self) -> Result<Actions> {
        let mut actions = Vec::new();
        if let Some(reason) = &self.fail_reason {
            actions.push(FlowAction::Notify(Notice::Error { message: reason.clone() }));
            if self.response == AuthResponse::Accept {
                self.response = AuthResponse::Cancel;
            }
        }

        if self.solution.verify_url.is_empty() {
            debug!(response = ?self.response, "no verify URL, finishing without finalizer");
            actions.extend(self.finish());
            return Ok(actions);
        }

        let body = VerifyRequest {
            verified: self.response == AuthResponse::Accept,
            fail_reason: self.fail_reason.clone(),
        };
        let request =
            HttpRequest::post(self.solution.verify_url.clone(), "authentication verify", &body)?;
        actions.extend(self.send(AuthState::Verifying, request));
        Ok(actions)
    }

    fn on_verified(&mut self, response: Option<&HttpResponse>) -> Actions {
        let outcome = match response {
            Some(response) => decode_reply::<EmptyReply>(response).map(|_| ()),
            None => Err(CipheriseError::transport("authentication verify not delivered")),
        };
        if let Err(err) = outcome {
            warn!(error = %err, "authentication verify failed");
            self.response = AuthResponse::Cancel;
        }
        self.finish()
    }

    fn cancelled(&mut self) -> Actions {
        self.response = AuthResponse::Cancel;
        self.finish()
    }

    fn finish(&mut self) -> Actions {
        self.transition(AuthState::Done);
        let username = match (&self.request.kind, self.solution.username.is_empty()) {
            (AuthKind::Push { username, .. }, true) => username.clone(),
            _ => self.solution.username.clone(),
        };
        let report = AuthenticationReport {
            response: self.response,
            username,
            device_name: self.solution.device_name.clone(),
            device_id: self.solution.device_id.clone(),
            verified: self.response == AuthResponse::Accept,
            payload: self.received.take(),
        };
        info!(response = ?report.response, verified = report.verified, "authentication finished");
        vec![FlowAction::Finish(report)]
    }

    fn validate_request(&self) -> Result<()> {
        if let AuthKind::Push { username, device_id, .. } = &self.request.kind {
            if username.is_empty() || device_id.is_empty() {
                return Err(CipheriseError::InvalidInput {
                    reason: "push authentication needs a username and device id".into(),
                });
            }
        }
        Ok(())
    }

    fn step(&mut self, event: FlowEvent) -> Result<Actions> {
        use AuthState as S;

        match (self.state, event) {
            (S::Init, FlowEvent::Start) => {
                self.validate_request()?;
                self.begin()
            },
            (S::Requested, FlowEvent::Response(r)) => self.on_requested(&r),
            (S::ShowingCode | S::ShowingDirectUrl, FlowEvent::Decided(d)) => {
                if d.is_accept() { self.after_code_shown() } else { Ok(self.cancelled()) }
            },
            (S::Polling, FlowEvent::Response(r)) => self.on_status(&r),
            (S::AskingContinue, FlowEvent::Decided(d)) => {
                if !d.is_accept() {
                    info!("authentication polling cancelled by caller");
                    return Ok(self.cancelled());
                }
                let period = self.request.interval.period().unwrap_or_default();
                self.transition(S::Sleeping);
                Ok(vec![FlowAction::Sleep(period)])
            },
            (S::Sleeping, FlowEvent::Woke) => Ok(self.poll_status()),
            (S::FetchingChallenge, FlowEvent::Response(r)) => self.on_app_challenge(&r),
            (S::Exchanging, FlowEvent::Response(r)) => {
                self.on_exchanged(decode_reply::<EmptyReply>(&r).map(|_| ()))
            },
            (S::Exchanging, FlowEvent::TransportFailed(reason)) => {
                self.on_exchanged(Err(CipheriseError::transport(reason)))
            },
            (S::ReportingFailure, FlowEvent::Response(_) | FlowEvent::TransportFailed(_)) => {
                Err(self.pending.take().unwrap_or(CipheriseError::Cancelled))
            },
            (S::AwaitingSolution, FlowEvent::Response(r)) => self.on_solution(&r),
            (S::AskingPayload, FlowEvent::Decided(d)) => self.on_payload_to_send(&d.into_payload()),
            (S::SendingPayload, FlowEvent::Response(r)) => self.on_payload_reply(Some(&r)),
            (S::SendingPayload, FlowEvent::TransportFailed(_)) => self.on_payload_reply(None),
            (S::ReviewingPayload, FlowEvent::Decided(d)) => {
                if d.is_accept() {
                    self.finalize()
                } else {
                    self.payload_failed(&PayloadError::CallerRejected)
                }
            },
            (S::Verifying, FlowEvent::Response(r)) => Ok(self.on_verified(Some(&r))),
            (S::Verifying, FlowEvent::TransportFailed(_)) => Ok(self.on_verified(None)),
            (_, FlowEvent::TransportFailed(reason)) => Err(CipheriseError::transport(reason)),
            (state, _) => {
                Err(CipheriseError::InvalidState { state: state.name(), operation: "handle event" })
            },
        }
    }
}

impl<E: Environment> Flow for AuthenticationFlow<E> {
    type Output = AuthenticationReport;

    fn handle(&mut self, event: FlowEvent) -> Result<Actions> {
        let result = self.step(event);
        if let Err(err) = &result {
            warn!(state = self.state.name(), error = %err, "authentication failed");
            self.state = AuthState::Failed;
        }
        result
    }
}
