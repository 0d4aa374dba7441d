//! Cipherise client core.
//!
//! Sans-IO state machines for enrolment and authentication, plus the payload
//! codec and error taxonomy they share.
//!
//! # Architecture
//!
//! Flows perform no I/O. They consume [`FlowEvent`]s and return
//! [`FlowAction`]s; a driver (see `cipherise-client`) executes the actions
//! against a real transport and a real caller:
//!
//! ```text
//! ┌──────────────────┐   FlowAction::Send    ┌───────────┐     HTTP     ┌────────┐
//! │ EnrolmentFlow    │──────────────────────>│           │─────────────>│        │
//! │ AuthenticationFlow│<─────────────────────│  Driver   │<─────────────│ Server │
//! └──────────────────┘  FlowEvent::Response  │           │              └────────┘
//!        │  ↑                                │           │
//!  Prompt│  │Decided                         │           │──> caller
//!        ↓  │                                └───────────┘
//! ```
//!
//! Randomness comes from an [`Environment`], so a seeded environment replays
//! a flow exactly, including every challenge and AES key.
//!
//! # Components
//!
//! - [`EnrolmentFlow`]: binds a device's key chain to the service provider
//! - [`AuthenticationFlow`]: push and wave authentication with a verify
//!   finalizer
//! - [`payload`]: hybrid-encrypted side channel to the device
//! - [`binding`]: wire level maps to signature chains

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod auth;
pub mod binding;
pub mod enrol;
pub mod env;
pub mod error;
pub mod flow;
pub mod http;
pub mod payload;
pub mod server;

pub use auth::{
    AuthKind, AuthLevel, AuthResponse, AuthState, AuthenticationFlow, AuthenticationReport,
    AuthenticationRequest, CHALLENGE_SIZE,
};
pub use enrol::{EnrolState, EnrolmentFlow, EnrolmentReport, EnrolmentRequest};
pub use env::{EnvRng, Environment};
pub use error::{CipheriseError, PayloadError, Result};
pub use flow::{
    DEFAULT_POLL_INTERVAL, Decision, Flow, FlowAction, FlowContext, FlowEvent, Notice,
    PollInterval, Prompt, ServiceIdentity,
};
pub use http::{HttpRequest, HttpResponse, Method, decode_reply, decode_reply_with_status};
pub use server::ServerUrl;

#[cfg(test)]
pub(crate) mod testing {
    use std::{
        sync::{Arc, Mutex, OnceLock, PoisonError},
        time::Duration,
    };

    use cipherise_crypto::KeyPair;
    use cipherise_proto::LevelMap;
    use rand::{RngCore, SeedableRng};
    use rand_chacha::ChaCha20Rng;

    use crate::{
        env::Environment,
        flow::{FlowAction, FlowContext, FlowEvent, ServiceIdentity},
        http::{HttpRequest, HttpResponse},
        server::ServerUrl,
    };

    /// Server every flow test talks to.
    pub(crate) const SERVER: &str = "https://cipherise.example.com/";

    /// Service id of the test identity.
    pub(crate) const SERVICE_ID: &str = "sp-1";

    /// Deterministic environment: seeded RNG, sleeps complete immediately.
    #[derive(Debug, Clone)]
    pub(crate) struct SeededEnv {
        rng: Arc<Mutex<ChaCha20Rng>>,
    }

    impl SeededEnv {
        pub(crate) fn new(seed: u64) -> Self {
            Self { rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))) }
        }
    }

    impl Environment for SeededEnv {
        type Instant = std::time::Instant;

        fn now(&self) -> Self::Instant {
            std::time::Instant::now()
        }

        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            std::future::ready(())
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
        }
    }

    static SP_KEYS: OnceLock<KeyPair> = OnceLock::new();
    static DEVICE_KEYS: [OnceLock<KeyPair>; 4] = [const { OnceLock::new() }; 4];

    fn generate(seed: u64) -> KeyPair {
        KeyPair::generate(&mut ChaCha20Rng::seed_from_u64(seed)).unwrap()
    }

    /// Service provider key pair shared by all unit tests.
    pub(crate) fn sp_keys() -> &'static KeyPair {
        SP_KEYS.get_or_init(|| generate(0x5350))
    }

    /// Device key pair for `level` (1..=4).
    pub(crate) fn device_keys(level: u8) -> &'static KeyPair {
        let index = usize::from(level.clamp(1, 4) - 1);
        DEVICE_KEYS[index].get_or_init(|| generate(0xD000 + u64::from(level)))
    }

    /// Wire `publicKeys` map for the four device keys.
    pub(crate) fn wire_keys() -> LevelMap {
        (1..=4u8)
            .map(|level| (level.to_string(), device_keys(level).public().to_pem().unwrap()))
            .collect()
    }

    /// Flow context for the test identity.
    pub(crate) fn context() -> FlowContext {
        FlowContext {
            server: ServerUrl::parse(SERVER).unwrap(),
            identity: Arc::new(ServiceIdentity::new(SERVICE_ID, sp_keys().clone())),
            session_id: "session-1".to_string(),
        }
    }

    /// 200 reply with a JSON body.
    pub(crate) fn reply(body: serde_json::Value) -> FlowEvent {
        FlowEvent::Response(HttpResponse::new(200, body.to_string()))
    }

    /// The request a batch ends with.
    pub(crate) fn sent<O: std::fmt::Debug>(actions: &[FlowAction<O>]) -> &HttpRequest {
        match actions.last() {
            Some(FlowAction::Send(request)) => request,
            other => panic!("expected a request, got {other:?}"),
        }
    }

    /// Decoded JSON body of a request.
    pub(crate) fn body(request: &HttpRequest) -> serde_json::Value {
        serde_json::from_slice(request.body.as_deref().unwrap_or(b"null")).unwrap()
    }
}
