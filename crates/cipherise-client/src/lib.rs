//! Cipherise service provider client.
//!
//! Async shell around the Sans-IO flows in `cipherise-core`. The core decides
//! what to send and what to ask; this crate does the sending and asking.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐  enrol / authenticate  ┌────────────┐  FlowAction   ┌──────┐
//! │ ServiceProvider │───────────────────────>│ driver::run│<─────────────>│ Flow │
//! └─────────────────┘                        └────────────┘   FlowEvent   └──────┘
//!    │    │     │                               │      │
//!    │    │     └─ KeyStore (identity)          │      └─> Interaction (caller)
//!    │    └─ SessionContext (sessionId, once)   └─> Transport (HTTP)
//!    └─ admin calls: info, register, revoke, user devices, revoke user
//! ```
//!
//! # Components
//!
//! - [`ServiceProvider`]: every high-level operation
//! - [`Transport`]: HTTP seam; [`HttpTransport`] with the `transport` feature
//! - [`KeyStore`]: identity persistence; [`FileKeyStore`], [`MemoryKeyStore`]
//! - [`Interaction`]: the caller's notices and decisions
//! - [`SystemEnv`]: OS clock, entropy and tokio timers

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod driver;
pub mod error;
pub mod interaction;
pub mod key_store;
pub mod provider;
pub mod session;
pub mod system_env;
pub mod transport;

pub use error::{KeyStoreError, TransportError};
pub use interaction::Interaction;
pub use key_store::{FileKeyStore, KeyStore, MemoryKeyStore};
pub use provider::{DEFAULT_KEY_DIR, DeviceRecord, ProviderConfig, ServiceProvider};
pub use session::SessionContext;
pub use system_env::SystemEnv;
#[cfg(feature = "transport")]
pub use transport::HttpTransport;
pub use transport::{DEFAULT_REQUEST_TIMEOUT, Transport};
