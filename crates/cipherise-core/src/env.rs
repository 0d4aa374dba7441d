//! Clock, timer and entropy seam.
//!
//! Flows never read the clock or the OS entropy pool directly. Nonces, AES
//! keys, IVs and RSA padding all come from [`Environment::random_bytes`], so a
//! seeded environment replays a flow byte for byte.

use std::time::Duration;

use rand::{CryptoRng, RngCore};

/// Time, randomness, and the one async primitive drivers need.
///
/// # Safety
///
/// Required of every implementation:
///
/// - `now()` is monotonic
/// - `random_bytes()` uses cryptographically secure entropy in production and
///   is safe to call from concurrent flows
pub trait Environment: Clone + Send + Sync + 'static {
    /// Instant type of this environment's clock.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current instant.
    fn now(&self) -> Self::Instant;

    /// Wait for `duration`.
    ///
    /// Only drivers call this. Flows ask for a sleep with an action.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fill `buffer` from the entropy source.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Draw a `u64`, big-endian from eight random bytes.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}

/// Borrow an [`Environment`] as a `rand` RNG for the primitives that take one.
pub struct EnvRng<'a, E>(pub &'a E);

impl<E: Environment> RngCore for EnvRng<'_, E> {
    fn next_u32(&mut self) -> u32 {
        let mut bytes = [0u8; 4];
        self.0.random_bytes(&mut bytes);
        u32::from_be_bytes(bytes)
    }

    fn next_u64(&mut self) -> u64 {
        self.0.random_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.random_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.0.random_bytes(dest);
        Ok(())
    }
}

impl<E: Environment> CryptoRng for EnvRng<'_, E> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SeededEnv;

    #[test]
    fn adapter_draws_from_environment() {
        let a = SeededEnv::new(9);
        let b = SeededEnv::new(9);

        let mut from_adapter = [0u8; 24];
        EnvRng(&a).fill_bytes(&mut from_adapter);
        let mut direct = [0u8; 24];
        b.random_bytes(&mut direct);

        assert_eq!(from_adapter, direct);
    }

    #[test]
    fn successive_draws_differ() {
        let env = SeededEnv::new(1);
        assert_ne!(env.random_u64(), env.random_u64());
    }
}
