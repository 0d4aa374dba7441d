//! Events, actions and caller interaction shared by both flows.
//!
//! A flow is a pure state machine. The driver feeds it [`FlowEvent`]s and
//! executes the [`FlowAction`]s it returns:
//!
//! ```text
//!            ┌──────────── FlowEvent ─────────────┐
//!            ↓                                    │
//!       ┌─────────┐   Send / Sleep / Prompt   ┌────────┐
//!       │  Flow   │──────────────────────────>│ Driver │
//!       └─────────┘   Notify / Finish         └────────┘
//! ```
//!
//! Each batch of actions holds any number of `Notify` actions followed by
//! exactly one of `Send`, `Sleep`, `Prompt` or `Finish`. The driver answers
//! the last one with the matching event.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use cipherise_crypto::KeyPair;
use cipherise_proto::PayloadRequest;

use crate::{
    error::Result,
    http::{HttpRequest, HttpResponse},
    server::ServerUrl,
};

/// Default interval between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);

/// Status polling policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PollInterval {
    /// Poll every [`DEFAULT_POLL_INTERVAL`]
    #[default]
    Default,
    /// Poll at a custom interval
    Every(Duration),
    /// Skip status polling and block on a single long-poll request
    LongPoll,
}

impl PollInterval {
    /// Map the millisecond convention: `0` is the default, negative is long
    /// poll.
    pub fn from_millis(millis: i64) -> Self {
        match millis {
            0 => Self::Default,
            m if m < 0 => Self::LongPoll,
            m => Self::Every(Duration::from_millis(m.unsigned_abs())),
        }
    }

    /// Sleep between polls, `None` for long poll.
    pub fn period(self) -> Option<Duration> {
        match self {
            Self::Default => Some(DEFAULT_POLL_INTERVAL),
            Self::Every(period) => Some(period),
            Self::LongPoll => None,
        }
    }
}

/// Registered service provider: server-assigned id plus its key pair.
#[derive(Debug)]
pub struct ServiceIdentity {
    service_id: String,
    keys: KeyPair,
}

impl ServiceIdentity {
    /// Pair a service id with its key pair.
    pub fn new(service_id: impl Into<String>, keys: KeyPair) -> Self {
        Self { service_id: service_id.into(), keys }
    }

    /// Server-assigned service id.
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// Service provider key pair.
    pub fn keys(&self) -> &KeyPair {
        &self.keys
    }
}

/// Everything a flow needs from its session.
#[derive(Debug, Clone)]
pub struct FlowContext {
    /// Server base URL
    pub server: ServerUrl,
    /// Registered identity
    pub identity: Arc<ServiceIdentity>,
    /// Established session id, attached to every request
    pub session_id: String,
}

impl FlowContext {
    /// Attach the session to a request.
    pub(crate) fn authorize(&self, request: HttpRequest) -> HttpRequest {
        request.with_session(Some(&self.session_id))
    }
}

/// Inputs to a flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEvent {
    /// Begin the flow
    Start,
    /// Reply to the last `Send`
    Response(HttpResponse),
    /// The last `Send` failed at the network level
    TransportFailed(String),
    /// The last `Sleep` elapsed
    Woke,
    /// Caller's answer to the last `Prompt`
    Decided(Decision),
}

/// Progress notices. The caller only observes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The device has picked up the request
    WaitingForApp,
    /// The device identified its user during a wave authentication
    AppIdentifiedUser {
        /// Username reported by the device
        username: String,
    },
    /// Code or request expired
    Timeout,
    /// Failure text relayed to the device
    Error {
        /// Message
        message: String,
    },
}

/// Questions for the caller. The flow waits for a [`Decision`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    /// Display the scan code; decline to cancel
    ShowScanCode {
        /// Code image URL
        url: String,
    },
    /// Offer the same-device link; decline to cancel
    ShowDirectUrl {
        /// App link
        url: String,
    },
    /// Does the identicon match the device? Decline to reject the enrolment
    ShowIdenticon {
        /// Identicon image URL
        url: String,
    },
    /// Keep polling? Decline to cancel
    ContinuePolling,
    /// What should be sent to the device? Answer with [`Decision::Payload`]
    PayloadToSend,
    /// The device answered the payload; decline to reject it
    PayloadReceived {
        /// Values for the requested `get` keys
        values: BTreeMap<String, String>,
    },
}

/// Caller's answer to a [`Prompt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Yes
    Accept,
    /// No
    Decline,
    /// Payload request, possibly empty
    Payload(PayloadRequest),
}

impl Decision {
    /// True for [`Decision::Accept`].
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }

    /// Payload request carried by the decision; empty for yes/no answers.
    pub fn into_payload(self) -> PayloadRequest {
        match self {
            Self::Payload(request) => request,
            Self::Accept | Self::Decline => PayloadRequest::default(),
        }
    }
}

/// Outputs of a flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowAction<O> {
    /// Perform this request and answer with `Response` or `TransportFailed`
    Send(HttpRequest),
    /// Wait, then answer with `Woke`
    Sleep(Duration),
    /// Tell the caller something
    Notify(Notice),
    /// Ask the caller, then answer with `Decided`
    Prompt(Prompt),
    /// The flow is over
    Finish(O),
}

/// A steppable flow.
pub trait Flow {
    /// Final report.
    type Output;

    /// Advance the flow by one event.
    ///
    /// # Errors
    ///
    /// An error ends the flow. Later events return `InvalidState`.
    fn handle(&mut self, event: FlowEvent) -> Result<Vec<FlowAction<Self::Output>>>;
}
