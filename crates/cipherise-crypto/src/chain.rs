//! Four-level device key chain and its service provider signatures.
//!
//! A device enrols with one public key per trust level. The service provider
//! signs the canonical hash of each key and hands the signatures back to the
//! server, which later returns them (or one of them) for re-verification.
//!
//! ```text
//! DeviceKeyChain          SignatureChain
//! 1 → pem₁   ──sign──>    1 → sig(hash(binding, pem₁, 1))
//! 2 → pem₂   ──sign──>    2 → sig(hash(binding, pem₂, 2))
//! 3 → pem₃   ──sign──>    3 → sig(hash(binding, pem₃, 3))
//! 4 → pem₄   ──sign──>    4 → sig(hash(binding, pem₄, 4))
//! ```
//!
//! # Invariants
//!
//! - A complete chain holds exactly the levels `1..=4`, each non-empty
//! - Verification is all-or-nothing: one bad level rejects the chain

use std::collections::BTreeMap;

use crate::{
    canonical::{Binding, canonical_hash},
    error::CryptoError,
    keys::{PrivateKey, PublicKey},
    signature::{sign, verify},
};

/// Number of levels in a complete chain.
pub const CHAIN_LEN: usize = 4;

/// Lowest trust level.
pub const MIN_LEVEL: u8 = 1;

/// Highest trust level.
pub const MAX_LEVEL: u8 = 4;

/// Device public keys (PEM) by level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceKeyChain(BTreeMap<u8, String>);

/// Hex signatures by level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureChain(BTreeMap<u8, String>);

macro_rules! level_map {
    ($name:ident) => {
        impl $name {
            /// Wrap an existing level map.
            pub fn new(entries: BTreeMap<u8, String>) -> Self {
                Self(entries)
            }

            /// Entry for `level`, if present.
            pub fn get(&self, level: u8) -> Option<&str> {
                self.0.get(&level).map(String::as_str)
            }

            /// Insert or replace the entry for `level`.
            pub fn insert(&mut self, level: u8, value: impl Into<String>) {
                self.0.insert(level, value.into());
            }

            /// Number of entries.
            pub fn len(&self) -> usize {
                self.0.len()
            }

            /// True if there are no entries.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            /// Entries in level order.
            pub fn iter(&self) -> impl Iterator<Item = (u8, &str)> {
                self.0.iter().map(|(level, value)| (*level, value.as_str()))
            }

            /// True if exactly levels `1..=4` are present and non-empty.
            pub fn is_complete(&self) -> bool {
                self.0.len() == CHAIN_LEN
                    && (MIN_LEVEL..=MAX_LEVEL)
                        .all(|level| self.get(level).is_some_and(|value| !value.is_empty()))
            }

            /// Unwrap into the level map.
            pub fn into_inner(self) -> BTreeMap<u8, String> {
                self.0
            }
        }

        impl FromIterator<(u8, String)> for $name {
            fn from_iter<T: IntoIterator<Item = (u8, String)>>(iter: T) -> Self {
                Self(iter.into_iter().collect())
            }
        }
    };
}

level_map!(DeviceKeyChain);
level_map!(SignatureChain);

/// Sign the canonical hash of one key at one level.
pub fn sign_level(
    sp_private: &PrivateKey,
    binding: &Binding<'_>,
    device_key_pem: &str,
    level: u8,
) -> Result<String, CryptoError> {
    let hash = canonical_hash(binding, device_key_pem, level)?;
    sign(sp_private, &hash)
}

/// Verify one level's signature. `false` on any failure.
pub fn verify_level(
    sp_public: &PublicKey,
    binding: &Binding<'_>,
    device_key_pem: &str,
    level: u8,
    signature: &str,
) -> bool {
    if !(MIN_LEVEL..=MAX_LEVEL).contains(&level) || signature.is_empty() {
        return false;
    }
    canonical_hash(binding, device_key_pem, level)
        .is_ok_and(|hash| verify(sp_public, &hash, signature))
}

/// Sign every level of a complete key chain.
///
/// # Errors
///
/// - `InvalidChain` unless `keys` is complete
/// - Any canonical hash or signing error, aborting the whole chain
pub fn produce_chain(
    sp_private: &PrivateKey,
    binding: &Binding<'_>,
    keys: &DeviceKeyChain,
) -> Result<SignatureChain, CryptoError> {
    if !keys.is_complete() {
        return Err(CryptoError::InvalidChain {
            reason: format!("expected levels 1..=4, got {} entries", keys.len()),
        });
    }

    keys.iter()
        .map(|(level, pem)| sign_level(sp_private, binding, pem, level).map(|sig| (level, sig)))
        .collect()
}

/// Verify a signature chain against its key chain.
///
/// Both chains must be complete with identical levels, and every level must
/// verify.
pub fn verify_chain(
    sp_public: &PublicKey,
    binding: &Binding<'_>,
    keys: &DeviceKeyChain,
    signatures: &SignatureChain,
) -> bool {
    if !keys.is_complete() || !signatures.is_complete() {
        return false;
    }
    if !keys.0.keys().eq(signatures.0.keys()) {
        return false;
    }

    keys.iter().all(|(level, pem)| {
        signatures
            .get(level)
            .is_some_and(|sig| verify_level(sp_public, binding, pem, level, sig))
    })
}
