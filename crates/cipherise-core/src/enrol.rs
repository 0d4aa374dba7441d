//! Enrolment state machine.
//!
//! Binds a user's device to the service provider. The device presents a
//! four-level key chain, the service provider signs each level, and the
//! server stores the signatures for later authentications.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐ POST enrol-user ┌───────────┐ shown ┌──────────────────┐
//! │ Init │────────────────>│ Requested │──────>│ ShowingCode/Url  │
//! └──────┘                 └───────────┘       └──────────────────┘
//!    ↑ "not found" + repeat                          │ accepted
//!    │                  ┌──────────┐ "scanned" ┌─────↓──────┐
//!    └──────────────────│ Polling  │──────────>│ Validating │ (long poll skips polling)
//!                       └──────────┘           └────────────┘
//!                            │ other: sleep          │ sign chain
//!                            ↓                ┌──────↓─────┐ error ┌───────────┐
//!                     ContinuePolling?        │ Confirming │──────>│ Rejecting │──> Failed
//!                                             └────────────┘       └───────────┘
//!                                                    │ payload sent
//!                                             ┌──────↓────┐  always  ┌───────────┐
//!                                             │ Reviewing │────────>│ Verifying │──> Done
//!                                             └───────────┘         └───────────┘
//! ```
//!
//! Declining the scan code, the direct URL or a poll continuation ends the
//! flow with `confirmed = false`, which is not an error.

use std::collections::BTreeMap;

use cipherise_crypto::{Binding, PublicKey};
use cipherise_proto::{
    ConfirmDecision, ConfirmReply, ConfirmRequest, EmptyReply, EnrolReply, EnrolRequest,
    EnrolStatusReply, LevelMap, PayloadEnvelope, PayloadRequest, ScanStatus, ValidateReply,
    VerifyRequest, paths,
};
use tracing::{debug, info, warn};

use crate::{
    binding::sign_device,
    env::Environment,
    error::{CipheriseError, PayloadError, Result},
    flow::{Decision, Flow, FlowAction, FlowContext, FlowEvent, Notice, PollInterval, Prompt},
    http::{HttpRequest, HttpResponse, decode_reply},
    payload,
};

/// Caller's enrolment parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrolmentRequest {
    /// User to enrol
    pub username: String,
    /// Scan status polling policy
    pub interval: PollInterval,
    /// Issue a fresh code when the current one expires
    pub repeat_on_timeout: bool,
}

impl EnrolmentRequest {
    /// Request for `username` with default polling that repeats on timeout.
    pub fn new(username: impl Into<String>) -> Self {
        Self { username: username.into(), interval: PollInterval::Default, repeat_on_timeout: true }
    }
}

/// Final enrolment outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrolmentReport {
    /// True if the device was bound
    pub confirmed: bool,
    /// Enrolled user
    pub username: String,
    /// Enrolled device; empty if the flow ended before validation
    pub device_id: String,
    /// Device's answers to the payload `get` keys
    pub payload: Option<BTreeMap<String, String>>,
}

/// Enrolment state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrolState {
    /// Not started
    Init,
    /// Waiting for the enrolment init reply
    Requested,
    /// Waiting for the caller to show the scan code
    ShowingCode,
    /// Waiting for the caller to show the direct URL
    ShowingDirectUrl,
    /// Waiting for a poll continuation decision
    AskingContinue,
    /// Waiting for the scan status reply
    Polling,
    /// Waiting between polls
    Sleeping,
    /// Waiting for the device key chain
    Validating,
    /// Waiting for the identicon decision
    ConfirmingIdenticon,
    /// Waiting for the payload to send
    AskingPayload,
    /// Waiting for the confirm reply
    Confirming,
    /// Waiting for the cleanup reject reply
    Rejecting,
    /// Waiting for the caller to review the device's payload answer
    ReviewingPayload,
    /// Waiting for the payload verify reply
    Verifying,
    /// Finished
    Done,
    /// Failed
    Failed,
}

impl EnrolState {
    fn name(self) -> &'static str {
        match self {
            Self::Init => "Init",
            Self::Requested => "Requested",
            Self::ShowingCode => "ShowingCode",
            Self::ShowingDirectUrl => "ShowingDirectUrl",
            Self::AskingContinue => "AskingContinue",
            Self::Polling => "Polling",
            Self::Sleeping => "Sleeping",
            Self::Validating => "Validating",
            Self::ConfirmingIdenticon => "ConfirmingIdenticon",
            Self::AskingPayload => "AskingPayload",
            Self::Confirming => "Confirming",
            Self::Rejecting => "Rejecting",
            Self::ReviewingPayload => "ReviewingPayload",
            Self::Verifying => "Verifying",
            Self::Done => "Done",
            Self::Failed => "Failed",
        }
    }
}

/// Device details from the validate step.
#[derive(Debug, Clone)]
struct ValidatedDevice {
    device_id: String,
    identicon_url: String,
    confirmation_url: String,
    signatures: LevelMap,
    payload_key_pem: String,
}

type Actions = Vec<FlowAction<EnrolmentReport>>;

/// Enrolment flow for one user.
#[derive(Debug)]
pub struct EnrolmentFlow<E: Environment> {
    ctx: FlowContext,
    env: E,
    request: EnrolmentRequest,
    state: EnrolState,
    urls: EnrolReply,
    device: Option<ValidatedDevice>,
    confirmed: bool,
    /// Device key and whether `set` values were sent, once a payload is out
    payload_out: Option<(PublicKey, bool)>,
    verify_url: String,
    received: Option<BTreeMap<String, String>>,
    /// Error reported once the cleanup or finalizer round trip completes
    pending: Option<CipheriseError>,
}

impl<E: Environment> EnrolmentFlow<E> {
    /// Create a flow in [`EnrolState::Init`].
    pub fn new(ctx: FlowContext, env: E, request: EnrolmentRequest) -> Self {
        Self {
            ctx,
            env,
            request,
            state: EnrolState::Init,
            urls: EnrolReply::default(),
            device: None,
            confirmed: false,
            payload_out: None,
            verify_url: String::new(),
            received: None,
            pending: None,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> EnrolState {
        self.state
    }

    fn transition(&mut self, next: EnrolState) {
        debug!(from = self.state.name(), to = next.name(), "enrolment transition");
        self.state = next;
    }

    fn send(&mut self, next: EnrolState, request: HttpRequest) -> Actions {
        self.transition(next);
        vec![FlowAction::Send(self.ctx.authorize(request))]
    }

    fn prompt(&mut self, next: EnrolState, prompt: Prompt) -> Actions {
        self.transition(next);
        vec![FlowAction::Prompt(prompt)]
    }

    fn finish(&mut self) -> Actions {
        self.transition(EnrolState::Done);
        let report = EnrolmentReport {
            confirmed: self.confirmed,
            username: self.request.username.clone(),
            device_id: self.device.as_ref().map(|d| d.device_id.clone()).unwrap_or_default(),
            payload: self.received.take(),
        };
        info!(confirmed = report.confirmed, device_id = %report.device_id, "enrolment finished");
        vec![FlowAction::Finish(report)]
    }

    /// Caller declined; the flow ends without an error.
    fn declined(&mut self) -> Actions {
        self.confirmed = false;
        self.device = None;
        self.finish()
    }

    fn request_code(&mut self) -> Result<Actions> {
        self.urls = EnrolReply::default();
        self.device = None;
        let url = self.ctx.server.endpoint(paths::ENROL_USER)?;
        let body = EnrolRequest { username: self.request.username.clone() };
        Ok(self.send(EnrolState::Requested, HttpRequest::post(url, "enrol request", &body)?))
    }

    fn on_code(&mut self, response: &HttpResponse) -> Result<Actions> {
        self.urls = decode_reply(response)?;
        let url = self.urls.scan_code_url.clone();
        Ok(self.prompt(EnrolState::ShowingCode, Prompt::ShowScanCode { url }))
    }

    fn after_code_shown(&mut self) -> Result<Actions> {
        if self.state == EnrolState::ShowingCode && !self.urls.direct_url.is_empty() {
            let url = self.urls.direct_url.clone();
            return Ok(self.prompt(EnrolState::ShowingDirectUrl, Prompt::ShowDirectUrl { url }));
        }
        match self.request.interval {
            PollInterval::LongPoll => self.validate(),
            PollInterval::Default | PollInterval::Every(_) => {
                Ok(self.prompt(EnrolState::AskingContinue, Prompt::ContinuePolling))
            },
        }
    }

    fn on_scan_status(&mut self, response: &HttpResponse) -> Result<Actions> {
        let reply: EnrolStatusReply = decode_reply(response)?;
        debug!(status = %reply.scan_status, "enrolment scan status");

        match ScanStatus::parse(&reply.scan_status) {
            ScanStatus::NotFound => self.timed_out(),
            ScanStatus::Scanned => self.validate(),
            ScanStatus::Waiting => {
                let period = self.request.interval.period().unwrap_or_default();
                self.transition(EnrolState::Sleeping);
                Ok(vec![FlowAction::Sleep(period)])
            },
        }
    }

    fn timed_out(&mut self) -> Result<Actions> {
        info!(repeat = self.request.repeat_on_timeout, "enrolment code expired");
        let mut actions = vec![FlowAction::Notify(Notice::Timeout)];
        if self.request.repeat_on_timeout {
            actions.extend(self.request_code()?);
        } else {
            actions.extend(self.declined());
        }
        Ok(actions)
    }

    fn validate(&mut self) -> Result<Actions> {
        let url = self.urls.validate_url.clone();
        Ok(self.send(EnrolState::Validating, HttpRequest::get(url)))
    }

    fn on_validated(&mut self, response: &HttpResponse) -> Result<Actions> {
        let reply: ValidateReply = match decode_reply(response) {
            Ok(reply) => reply,
            Err(err) if err.mentions_timeout() => return self.timed_out(),
            Err(err) => return Err(err),
        };

        let identity = &self.ctx.identity;
        let binding = Binding::new(
            self.ctx.server.as_str(),
            identity.service_id(),
            &self.request.username,
            &reply.device_id,
        );
        let signatures = sign_device(identity.keys().private(), &binding, &reply.public_keys)?;
        debug!(device_id = %reply.device_id, "device key chain signed");

        let payload_key_pem = reply.public_keys.get("1").cloned().unwrap_or_default();
        self.device = Some(ValidatedDevice {
            device_id: reply.device_id,
            identicon_url: reply.identicon_url,
            confirmation_url: reply.confirmation_url,
            signatures,
            payload_key_pem,
        });

        let identicon = self.device.as_ref().map(|d| d.identicon_url.clone()).unwrap_or_default();
        if identicon.is_empty() {
            self.confirmed = true;
            Ok(self.prompt(EnrolState::AskingPayload, Prompt::PayloadToSend))
        } else {
            let prompt = Prompt::ShowIdenticon { url: identicon };
            Ok(self.prompt(EnrolState::ConfirmingIdenticon, prompt))
        }
    }

    fn on_identicon(&mut self, decision: &Decision) -> Result<Actions> {
        self.confirmed = decision.is_accept();
        if self.confirmed {
            Ok(self.prompt(EnrolState::AskingPayload, Prompt::PayloadToSend))
        } else {
            info!("identicon rejected by caller");
            self.confirm(None)
        }
    }

    fn on_payload_to_send(&mut self, request: &PayloadRequest) -> Result<Actions> {
        match self.build_payload(request) {
            Ok(envelope) => self.confirm(envelope),
            Err(err) => {
                warn!(error = %err, "enrolment payload could not be built");
                self.reject_after(err)
            },
        }
    }

    fn build_payload(&mut self, request: &PayloadRequest) -> Result<Option<PayloadEnvelope>> {
        if request.is_empty() {
            return Ok(None);
        }
        let pem = self.device.as_ref().map(|d| d.payload_key_pem.as_str()).unwrap_or_default();
        let device_key = PublicKey::from_pem(pem)?;
        let envelope =
            payload::encode(request, &device_key, self.ctx.identity.keys().private(), &self.env)?;
        self.payload_out = Some((device_key, !request.set.is_empty()));
        Ok(envelope)
    }

    fn confirm_request(
        &self,
        decision: ConfirmDecision,
        payload: Option<PayloadEnvelope>,
    ) -> Result<HttpRequest> {
        let (url, signatures) = self
            .device
            .as_ref()
            .map(|d| (d.confirmation_url.clone(), d.signatures.clone()))
            .ok_or(CipheriseError::InvalidState {
                state: self.state.name(),
                operation: "confirm",
            })?;
        let body = ConfirmRequest { confirm: decision, signatures, payload };
        HttpRequest::post(url, "enrolment confirm", &body)
    }

    fn confirm(&mut self, payload: Option<PayloadEnvelope>) -> Result<Actions> {
        let decision =
            if self.confirmed { ConfirmDecision::Confirm } else { ConfirmDecision::Reject };
        let request = self.confirm_request(decision, payload)?;
        Ok(self.send(EnrolState::Confirming, request))
    }

    /// Best-effort reject so the server does not keep a half-open binding.
    fn reject_after(&mut self, err: CipheriseError) -> Result<Actions> {
        self.confirmed = false;
        self.payload_out = None;
        self.pending = Some(err);
        let request = self.confirm_request(ConfirmDecision::Reject, None)?;
        Ok(self.send(EnrolState::Rejecting, request))
    }

    fn on_confirmed(&mut self, response: &HttpResponse) -> Result<Actions> {
        let reply: ConfirmReply = match decode_reply(response) {
            Ok(reply) => reply,
            Err(err) if !self.confirmed => return Err(err),
            Err(err) => {
                warn!(error = %err, "enrolment confirm failed, sending reject");
                return self.reject_after(err);
            },
        };

        let Some((device_key, sent_set)) = self.payload_out.take() else {
            return Ok(self.finish());
        };

        if reply.payload_verify_url.is_empty() {
            return Err(cipherise_proto::WireError::MissingField {
                message: "enrolment confirm",
                field: "payloadVerifyURL",
            }
            .into());
        }
        self.verify_url = reply.payload_verify_url;

        let opened = reply
            .payload
            .as_ref()
            .ok_or(PayloadError::Missing)
            .and_then(|envelope| {
                payload::decode(envelope, &device_key, self.ctx.identity.keys().private())
            })
            .and_then(|response| {
                if sent_set && !response.set_response {
                    Err(PayloadError::SetFailed)
                } else {
                    Ok(response)
                }
            });

        match opened {
            Ok(response) => {
                let values = response.get_response;
                self.received = Some(values.clone());
                Ok(self.prompt(EnrolState::ReviewingPayload, Prompt::PayloadReceived { values }))
            },
            Err(err) => {
                warn!(error = %err, "enrolment payload response rejected");
                self.pending = Some(err.into());
                self.verify(false)
            },
        }
    }

    fn on_reviewed(&mut self, decision: &Decision) -> Result<Actions> {
        if decision.is_accept() {
            self.verify(true)
        } else {
            self.pending = Some(PayloadError::CallerRejected.into());
            self.verify(false)
        }
    }

    fn verify(&mut self, verified: bool) -> Result<Actions> {
        let body = VerifyRequest { verified, fail_reason: None };
        let request = HttpRequest::post(self.verify_url.clone(), "payload verify", &body)?;
        Ok(self.send(EnrolState::Verifying, request))
    }

    fn on_verified(&mut self, response: Option<&HttpResponse>) -> Result<Actions> {
        let outcome = match response {
            Some(response) => decode_reply::<EmptyReply>(response).map(|_| ()),
            None => Err(CipheriseError::transport("payload verify not delivered")),
        };
        if let Some(err) = self.pending.take() {
            return Err(err);
        }
        outcome?;
        Ok(self.finish())
    }

    fn on_rejected(&mut self, response: Option<&HttpResponse>) -> Result<Actions> {
        match response.map(decode_reply::<EmptyReply>) {
            Some(Ok(_)) => debug!("cleanup reject accepted"),
            Some(Err(err)) => warn!(error = %err, "cleanup reject failed"),
            None => warn!("cleanup reject not delivered"),
        }
        Err(self.pending.take().unwrap_or(CipheriseError::Cancelled))
    }

    fn step(&mut self, event: FlowEvent) -> Result<Actions> {
        use EnrolState as S;

        match (self.state, event) {
            (S::Init, FlowEvent::Start) => {
                if self.request.username.is_empty() {
                    return Err(CipheriseError::InvalidInput { reason: "username is empty".into() });
                }
                self.request_code()
            },
            (S::Requested, FlowEvent::Response(r)) => self.on_code(&r),
            (S::ShowingCode | S::ShowingDirectUrl, FlowEvent::Decided(d)) => {
                if d.is_accept() { self.after_code_shown() } else { Ok(self.declined()) }
            },
            (S::AskingContinue, FlowEvent::Decided(d)) => {
                if d.is_accept() {
                    let url = self.urls.status_url.clone();
                    Ok(self.send(S::Polling, HttpRequest::get(url)))
                } else {
                    info!("enrolment polling cancelled by caller");
                    Ok(self.declined())
                }
            },
            (S::Polling, FlowEvent::Response(r)) => self.on_scan_status(&r),
            (S::Sleeping, FlowEvent::Woke) => {
                Ok(self.prompt(S::AskingContinue, Prompt::ContinuePolling))
            },
            (S::Validating, FlowEvent::Response(r)) => self.on_validated(&r),
            (S::ConfirmingIdenticon, FlowEvent::Decided(d)) => self.on_identicon(&d),
            (S::AskingPayload, FlowEvent::Decided(d)) => self.on_payload_to_send(&d.into_payload()),
            (S::Confirming, FlowEvent::Response(r)) => self.on_confirmed(&r),
            (S::Confirming, FlowEvent::TransportFailed(reason)) => {
                warn!(%reason, "enrolment confirm not delivered, sending reject");
                self.reject_after(CipheriseError::transport(reason))
            },
            (S::Rejecting, FlowEvent::Response(r)) => self.on_rejected(Some(&r)),
            (S::Rejecting, FlowEvent::TransportFailed(_)) => self.on_rejected(None),
            (S::ReviewingPayload, FlowEvent::Decided(d)) => self.on_reviewed(&d),
            (S::Verifying, FlowEvent::Response(r)) => self.on_verified(Some(&r)),
            (S::Verifying, FlowEvent::TransportFailed(_)) => self.on_verified(None),
            (_, FlowEvent::TransportFailed(reason)) => Err(CipheriseError::transport(reason)),
            (state, _) => {
                Err(CipheriseError::InvalidState { state: state.name(), operation: "handle event" })
            },
        }
    }
}

impl<E: Environment> Flow for EnrolmentFlow<E> {
    type Output = EnrolmentReport;

    fn handle(&mut self, event: FlowEvent) -> Result<Actions> {
        let result = self.step(event);
        if let Err(err) = &result {
            warn!(state = self.state.name(), error = %err, "enrolment failed");
            self.state = EnrolState::Failed;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use cipherise_proto::{ErrorFields, PayloadResponse};
    use serde_json::json;

    use super::*;
    use crate::{
        binding::verify_device,
        flow::DEFAULT_POLL_INTERVAL,
        payload::{open, seal},
        testing::{
            SERVER, SERVICE_ID, SeededEnv, body, context, device_keys, reply, sent, sp_keys,
            wire_keys,
        },
    };

    const CONFIRM_URL: &str = "https://cipherise.example.com/enrol/confirm";
    const VERIFY_URL: &str = "https://cipherise.example.com/enrol/payload-verify";

    fn flow(interval: PollInterval, repeat_on_timeout: bool) -> EnrolmentFlow<SeededEnv> {
        let request =
            EnrolmentRequest { username: "alice".to_string(), interval, repeat_on_timeout };
        EnrolmentFlow::new(context(), SeededEnv::new(11), request)
    }

    fn code_reply() -> FlowEvent {
        reply(json!({
            "qrCodeURL": "https://cipherise.example.com/qr/1.png",
            "validateURL": "https://cipherise.example.com/enrol/validate",
            "statusURL": "https://cipherise.example.com/enrol/status",
        }))
    }

    fn validate_reply(identicon: &str) -> FlowEvent {
        reply(json!({
            "identiconURL": identicon,
            "confirmationURL": CONFIRM_URL,
            "deviceId": "dev-1",
            "publicKeys": wire_keys(),
        }))
    }

    fn accept() -> FlowEvent {
        FlowEvent::Decided(Decision::Accept)
    }

    fn decline() -> FlowEvent {
        FlowEvent::Decided(Decision::Decline)
    }

    fn finished(actions: &[FlowAction<EnrolmentReport>]) -> &EnrolmentReport {
        match actions.last() {
            Some(FlowAction::Finish(report)) => report,
            other => panic!("expected a report, got {other:?}"),
        }
    }

    /// Drive a short-poll flow up to its first status request.
    fn polling(repeat_on_timeout: bool) -> EnrolmentFlow<SeededEnv> {
        let mut flow = flow(PollInterval::Default, repeat_on_timeout);
        flow.handle(FlowEvent::Start).unwrap();
        flow.handle(code_reply()).unwrap();
        flow.handle(accept()).unwrap();
        flow.handle(accept()).unwrap();
        assert_eq!(flow.state(), EnrolState::Polling);
        flow
    }

    /// Drive a long-poll flow up to the validate reply.
    fn validated(identicon: &str) -> (EnrolmentFlow<SeededEnv>, Vec<FlowAction<EnrolmentReport>>) {
        let mut flow = flow(PollInterval::LongPoll, false);
        flow.handle(FlowEvent::Start).unwrap();
        flow.handle(code_reply()).unwrap();
        flow.handle(accept()).unwrap();
        let actions = flow.handle(validate_reply(identicon)).unwrap();
        (flow, actions)
    }

    #[test]
    fn start_posts_username_with_session() {
        let mut flow = flow(PollInterval::Default, true);
        let actions = flow.handle(FlowEvent::Start).unwrap();

        let request = sent(&actions);
        assert_eq!(request.url, format!("{SERVER}sp/enrol-user"));
        assert_eq!(request.session_id.as_deref(), Some("session-1"));
        assert_eq!(body(request), json!({"username": "alice"}));
    }

    #[test]
    fn empty_username_is_rejected_before_any_request() {
        let request = EnrolmentRequest::new("");
        let mut flow = EnrolmentFlow::new(context(), SeededEnv::new(1), request);

        assert!(matches!(flow.handle(FlowEvent::Start), Err(CipheriseError::InvalidInput { .. })));
        assert_eq!(flow.state(), EnrolState::Failed);
    }

    #[test]
    fn scan_code_then_direct_url_are_shown() {
        let mut flow = flow(PollInterval::Default, true);
        flow.handle(FlowEvent::Start).unwrap();
        let shown = flow
            .handle(reply(json!({
                "qrCodeURL": "https://cipherise.example.com/qr/1.png",
                "validateURL": "https://cipherise.example.com/enrol/validate",
                "statusURL": "https://cipherise.example.com/enrol/status",
                "directEnrolURL": "cipherise://enrol/1",
            })))
            .unwrap();
        assert_eq!(
            shown,
            vec![FlowAction::Prompt(Prompt::ShowScanCode {
                url: "https://cipherise.example.com/qr/1.png".to_string()
            })]
        );

        let direct = flow.handle(accept()).unwrap();
        assert_eq!(
            direct,
            vec![FlowAction::Prompt(Prompt::ShowDirectUrl {
                url: "cipherise://enrol/1".to_string()
            })]
        );
    }

    #[test]
    fn declining_scan_code_ends_unconfirmed() {
        let mut flow = flow(PollInterval::Default, true);
        flow.handle(FlowEvent::Start).unwrap();
        flow.handle(code_reply()).unwrap();

        let actions = flow.handle(decline()).unwrap();
        let report = finished(&actions);
        assert!(!report.confirmed);
        assert_eq!(report.username, "alice");
        assert_eq!(flow.state(), EnrolState::Done);
    }

    #[test]
    fn waiting_status_sleeps_then_asks_to_continue() {
        let mut flow = polling(true);

        let slept = flow.handle(reply(json!({"QREnrolStatus": "waiting"}))).unwrap();
        assert_eq!(slept, vec![FlowAction::Sleep(DEFAULT_POLL_INTERVAL)]);

        let asked = flow.handle(FlowEvent::Woke).unwrap();
        assert_eq!(asked, vec![FlowAction::Prompt(Prompt::ContinuePolling)]);
    }

    #[test]
    fn declining_continue_cancels_without_error() {
        let mut flow = polling(true);
        flow.handle(reply(json!({"QREnrolStatus": "waiting"}))).unwrap();
        flow.handle(FlowEvent::Woke).unwrap();

        let actions = flow.handle(decline()).unwrap();
        assert!(!finished(&actions).confirmed);
    }

    #[test]
    fn expired_code_without_repeat_finishes_unconfirmed() {
        let mut flow = polling(false);

        let actions = flow.handle(reply(json!({"QREnrolStatus": "Not Found"}))).unwrap();
        assert_eq!(actions[0], FlowAction::Notify(Notice::Timeout));
        assert!(!finished(&actions).confirmed);
        assert_eq!(actions.len(), 2);
    }

    #[test]
    fn expired_code_with_repeat_requests_a_fresh_code() {
        let mut flow = polling(true);

        let actions = flow.handle(reply(json!({"QREnrolStatus": "NOT FOUND"}))).unwrap();
        assert_eq!(actions[0], FlowAction::Notify(Notice::Timeout));
        assert_eq!(sent(&actions).url, format!("{SERVER}sp/enrol-user"));
        assert_eq!(flow.state(), EnrolState::Requested);

        let shown = flow.handle(code_reply()).unwrap();
        assert!(matches!(shown[..], [FlowAction::Prompt(Prompt::ShowScanCode { .. })]));
    }

    #[test]
    fn scanned_status_fetches_device_keys() {
        let mut flow = polling(true);

        let actions = flow.handle(reply(json!({"QREnrolStatus": "Scanned"}))).unwrap();
        assert_eq!(sent(&actions).url, "https://cipherise.example.com/enrol/validate");
        assert_eq!(flow.state(), EnrolState::Validating);
    }

    #[test]
    fn long_poll_skips_status_loop() {
        let mut flow = flow(PollInterval::LongPoll, true);
        flow.handle(FlowEvent::Start).unwrap();
        flow.handle(code_reply()).unwrap();

        let actions = flow.handle(accept()).unwrap();
        assert_eq!(sent(&actions).url, "https://cipherise.example.com/enrol/validate");
    }

    #[test]
    fn validate_timeout_counts_as_expiry() {
        let mut flow = flow(PollInterval::LongPoll, false);
        flow.handle(FlowEvent::Start).unwrap();
        flow.handle(code_reply()).unwrap();
        flow.handle(accept()).unwrap();

        let actions = flow
            .handle(reply(json!({"error": true, "error_message": "Enrolment request Timeout"})))
            .unwrap();
        assert_eq!(actions[0], FlowAction::Notify(Notice::Timeout));
        assert!(!finished(&actions).confirmed);
    }

    #[test]
    fn three_device_keys_fail_the_flow() {
        let mut flow = flow(PollInterval::LongPoll, false);
        flow.handle(FlowEvent::Start).unwrap();
        flow.handle(code_reply()).unwrap();
        flow.handle(accept()).unwrap();

        let mut keys = wire_keys();
        keys.remove("4");
        let result = flow.handle(reply(json!({
            "identiconURL": "",
            "confirmationURL": CONFIRM_URL,
            "deviceId": "dev-1",
            "publicKeys": keys,
        })));

        assert!(result.is_err());
        assert_eq!(flow.state(), EnrolState::Failed);
    }

    #[test]
    fn direct_enrolment_confirms_with_verifiable_chain() {
        let (mut flow, actions) = validated("");
        assert_eq!(actions, vec![FlowAction::Prompt(Prompt::PayloadToSend)]);

        let no_payload = FlowEvent::Decided(Decision::Payload(PayloadRequest::default()));
        let confirm = flow.handle(no_payload).unwrap();
        let request = sent(&confirm);
        assert_eq!(request.url, CONFIRM_URL);

        let sent_body = body(request);
        assert_eq!(sent_body["confirm"], "confirm");
        assert!(sent_body.get("payload").is_none());
        let signatures: LevelMap = serde_json::from_value(sent_body["signatures"].clone()).unwrap();
        let binding = Binding::new(SERVER, SERVICE_ID, "alice", "dev-1");
        assert!(verify_device(sp_keys().public(), &binding, &wire_keys(), &signatures));

        let done = flow.handle(reply(json!({"confirm": "confirm"}))).unwrap();
        let report = finished(&done);
        assert!(report.confirmed);
        assert_eq!(report.device_id, "dev-1");
        assert_eq!(report.payload, None);
    }

    #[test]
    fn rejected_identicon_sends_reject_and_skips_payload() {
        let (mut flow, actions) = validated("https://cipherise.example.com/identicon/1.png");
        assert!(matches!(actions[..], [FlowAction::Prompt(Prompt::ShowIdenticon { .. })]));

        let reject = flow.handle(decline()).unwrap();
        assert_eq!(reject.len(), 1);
        let reject_body = body(sent(&reject));
        assert_eq!(reject_body["confirm"], "reject");
        assert!(reject_body.get("payload").is_none());
        assert_eq!(flow.state(), EnrolState::Confirming);

        let done = flow.handle(reply(json!({"confirm": "reject"}))).unwrap();
        let report = finished(&done);
        assert!(!report.confirmed);
        assert_eq!(report.payload, None);
        assert_eq!(flow.state(), EnrolState::Done);
    }

    #[test]
    fn confirm_error_sends_one_reject_then_fails_with_original() {
        let (mut flow, _) = validated("");
        flow.handle(FlowEvent::Decided(Decision::Payload(PayloadRequest::default()))).unwrap();

        let cleanup = flow
            .handle(reply(json!({"error": true, "error_message": "binding refused"})))
            .unwrap();
        assert_eq!(flow.state(), EnrolState::Rejecting);
        let cleanup_body = body(sent(&cleanup));
        assert_eq!(cleanup_body["confirm"], "reject");
        assert!(cleanup_body.get("payload").is_none());

        let result =
            flow.handle(reply(json!({"error": true, "error_message": "already rejected"})));
        assert!(matches!(
            result,
            Err(CipheriseError::Protocol { ref message, .. }) if message == "binding refused"
        ));
        assert_eq!(flow.state(), EnrolState::Failed);
        assert!(matches!(
            flow.handle(FlowEvent::Start),
            Err(CipheriseError::InvalidState { state: "Failed", .. })
        ));
    }

    #[test]
    fn payload_is_exchanged_then_verified() {
        let (mut flow, _) = validated("");
        let payload_request = PayloadRequest {
            set: BTreeMap::from([("colour".to_string(), "blue".to_string())]),
            get: vec!["shoe-size".to_string()],
        };

        let decided = FlowEvent::Decided(Decision::Payload(payload_request.clone()));
        let confirm = flow.handle(decided).unwrap();
        let envelope: PayloadEnvelope =
            serde_json::from_value(body(sent(&confirm))["payload"].clone()).unwrap();
        let received: PayloadRequest =
            open(&envelope, sp_keys().public(), device_keys(1).private()).unwrap();
        assert_eq!(received, payload_request);

        let answer = PayloadResponse {
            status: ErrorFields::default(),
            set_response: true,
            get_response: BTreeMap::from([("shoe-size".to_string(), "9".to_string())]),
        };
        let env = SeededEnv::new(5);
        let sealed = seal(&answer, sp_keys().public(), device_keys(1).private(), &env).unwrap();
        let answered =
            json!({"confirm": "confirm", "payloadVerifyURL": VERIFY_URL, "payload": sealed});
        let review = flow.handle(reply(answered)).unwrap();
        assert_eq!(
            review,
            vec![FlowAction::Prompt(Prompt::PayloadReceived {
                values: answer.get_response.clone()
            })]
        );

        let verify = flow.handle(accept()).unwrap();
        assert_eq!(sent(&verify).url, VERIFY_URL);
        assert_eq!(body(sent(&verify)), json!({"verified": true}));

        let done = flow.handle(reply(json!({}))).unwrap();
        let report = finished(&done);
        assert!(report.confirmed);
        assert_eq!(report.payload, Some(answer.get_response));
    }

    #[test]
    fn missing_payload_answer_still_posts_verify() {
        let (mut flow, _) = validated("");
        let payload_request = PayloadRequest { set: BTreeMap::new(), get: vec!["k".to_string()] };
        flow.handle(FlowEvent::Decided(Decision::Payload(payload_request))).unwrap();

        let verify = flow
            .handle(reply(json!({"confirm": "confirm", "payloadVerifyURL": VERIFY_URL})))
            .unwrap();
        assert_eq!(body(sent(&verify)), json!({"verified": false}));

        let result = flow.handle(reply(json!({})));
        assert_eq!(result, Err(CipheriseError::Payload(PayloadError::Missing)));
    }

    #[test]
    fn caller_rejecting_payload_answer_fails_after_verify() {
        let (mut flow, _) = validated("");
        let payload_request = PayloadRequest { set: BTreeMap::new(), get: vec!["k".to_string()] };
        flow.handle(FlowEvent::Decided(Decision::Payload(payload_request))).unwrap();

        let answer = PayloadResponse { set_response: true, ..PayloadResponse::default() };
        let env = SeededEnv::new(6);
        let sealed = seal(&answer, sp_keys().public(), device_keys(1).private(), &env).unwrap();
        let answered =
            json!({"confirm": "confirm", "payloadVerifyURL": VERIFY_URL, "payload": sealed});
        let review = flow.handle(reply(answered)).unwrap();
        assert!(matches!(review[..], [FlowAction::Prompt(Prompt::PayloadReceived { .. })]));

        let verify = flow.handle(decline()).unwrap();
        assert_eq!(sent(&verify).url, VERIFY_URL);
        assert_eq!(body(sent(&verify)), json!({"verified": false}));
        assert_eq!(
            flow.handle(reply(json!({}))),
            Err(CipheriseError::Payload(PayloadError::CallerRejected))
        );
        assert_eq!(flow.state(), EnrolState::Failed);
    }
}
