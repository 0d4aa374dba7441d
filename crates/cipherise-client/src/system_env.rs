//! Production environment: monotonic clock, OS entropy, tokio timers.

use std::time::Duration;

use cipherise_core::Environment;

/// Production [`Environment`].
///
/// # Security
///
/// Randomness comes from `getrandom`, i.e. the OS CSPRNG. Challenges, AES
/// keys, IVs and RSA key generation all draw from it.
///
/// # Panics
///
/// Panics if the OS RNG fails. Without entropy no challenge or key this
/// process produced could be trusted.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Production environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG is available");
    }
}
