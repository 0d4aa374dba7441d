//! Canonical signature hash.
//!
//! Binds one device key at one trust level to a (host, service, user, device)
//! tuple. The service provider signs this hash at enrolment and re-verifies it
//! on every authentication, so the normalization below must be byte-for-byte
//! stable: any divergence invalidates every signature issued so far.
//!
//! ```text
//! sha256( host || pad16(serviceId) || lower(username) || pad16(deviceId) || pem || level )
//! ```

use sha2::{Digest, Sha256};

use crate::error::CryptoError;

/// Width that service and device ids are padded or truncated to.
pub const ID_WIDTH: usize = 16;

const HTTPS_SCHEME: &str = "https://";
const HTTP_SCHEME: &str = "http://";

/// The identity half of a canonical hash input.
///
/// Shared by every level of a chain; only the key and level vary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding<'a> {
    /// Cipherise server URL (normalized internally)
    pub host: &'a str,
    /// Service provider id
    pub service_id: &'a str,
    /// End-user name
    pub username: &'a str,
    /// Device id
    pub device_id: &'a str,
}

impl<'a> Binding<'a> {
    /// Bundle the identity fields.
    pub fn new(host: &'a str, service_id: &'a str, username: &'a str, device_id: &'a str) -> Self {
        Self { host, service_id, username, device_id }
    }
}

/// Normalize a server URL to the form hashed into signatures.
///
/// `"  https://Foo.COM:443/bar "` becomes `"https://foo.com/"`.
///
/// # Errors
///
/// - `CanonicalInput` if the host is empty or has no `http(s)://` scheme
pub fn canonical_host(host: &str) -> Result<String, CryptoError> {
    let trimmed = host.trim_matches(|c| c == ' ' || c == '/' || c == '\\').to_lowercase();

    let scheme_len = if trimmed.starts_with(HTTPS_SCHEME) {
        HTTPS_SCHEME.len()
    } else if trimmed.starts_with(HTTP_SCHEME) {
        HTTP_SCHEME.len()
    } else {
        return Err(CryptoError::CanonicalInput {
            reason: format!("host '{host}' has no http:// or https:// scheme"),
        });
    };

    let authority_end = trimmed[scheme_len..].find('/').map_or(trimmed.len(), |i| scheme_len + i);
    let mut normalized = trimmed[..authority_end].replace(":443", "").replace(":80", "");
    normalized.push('/');

    Ok(normalized)
}

/// Left-pad with `0` or keep the trailing characters, to exactly
/// [`ID_WIDTH`] characters.
pub fn pad_id(id: &str) -> String {
    let count = id.chars().count();
    if count >= ID_WIDTH {
        id.chars().skip(count - ID_WIDTH).collect()
    } else {
        let mut padded = "0".repeat(ID_WIDTH - count);
        padded.push_str(id);
        padded
    }
}

/// Compute the canonical hash for one key at one level, as lowercase hex.
///
/// # Errors
///
/// - `CanonicalInput` if any identity field or the key is empty, or the host
///   fails [`canonical_host`]
pub fn canonical_hash(
    binding: &Binding<'_>,
    device_key_pem: &str,
    level: u8,
) -> Result<String, CryptoError> {
    for (name, value) in [
        ("host", binding.host),
        ("service id", binding.service_id),
        ("username", binding.username),
        ("device id", binding.device_id),
        ("device public key", device_key_pem),
    ] {
        if value.is_empty() {
            return Err(CryptoError::CanonicalInput { reason: format!("{name} is empty") });
        }
    }

    let host = canonical_host(binding.host)?;

    let mut hasher = Sha256::new();
    hasher.update(host.as_bytes());
    hasher.update(pad_id(binding.service_id).as_bytes());
    hasher.update(binding.username.to_lowercase().as_bytes());
    hasher.update(pad_id(binding.device_id).as_bytes());
    hasher.update(device_key_pem.as_bytes());
    hasher.update(level.to_string().as_bytes());

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding() -> Binding<'static> {
        Binding::new("https://cipherise.example.com", "abc", "Alice", "device-7")
    }

    #[test]
    fn host_is_trimmed_lowercased_and_port_stripped() {
        assert_eq!(canonical_host("  https://Foo.COM:443/bar ").unwrap(), "https://foo.com/");
    }

    #[test]
    fn http_default_port_is_stripped() {
        assert_eq!(canonical_host("http://x.y:80").unwrap(), "http://x.y/");
    }

    #[test]
    fn trailing_slashes_and_backslashes_collapse() {
        assert_eq!(canonical_host("https://a.b//").unwrap(), "https://a.b/");
        assert_eq!(canonical_host("\\https://a.b\\").unwrap(), "https://a.b/");
        assert_eq!(canonical_host("HTTPS://A.B/x/y/z").unwrap(), "https://a.b/");
    }

    #[test]
    fn non_default_port_is_kept() {
        assert_eq!(canonical_host("https://a.b:8443/").unwrap(), "https://a.b:8443/");
    }

    #[test]
    fn host_without_scheme_fails() {
        assert!(matches!(
            canonical_host("cipherise.example.com"),
            Err(CryptoError::CanonicalInput { .. })
        ));
        assert!(canonical_host("ftp://a.b").is_err());
        assert!(canonical_host("   ").is_err());
    }

    #[test]
    fn short_ids_are_zero_padded() {
        assert_eq!(pad_id("abc"), "0000000000000abc");
        assert_eq!(pad_id(""), "0000000000000000");
    }

    #[test]
    fn long_ids_keep_last_sixteen() {
        assert_eq!(pad_id("12345678901234567"), "2345678901234567");
        assert_eq!(pad_id("1234567890123456"), "1234567890123456");
    }

    #[test]
    fn hash_is_lowercase_sha256_hex() {
        let hash = canonical_hash(&binding(), "PEM", 1).unwrap();
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn hash_matches_manual_concatenation() {
        let expected = hex::encode(Sha256::digest(
            "https://cipherise.example.com/0000000000000abcalice00000000device-7PEM3".as_bytes(),
        ));
        assert_eq!(canonical_hash(&binding(), "PEM", 3).unwrap(), expected);
    }

    #[test]
    fn username_case_does_not_matter() {
        let upper = Binding { username: "ALICE", ..binding() };
        assert_eq!(
            canonical_hash(&binding(), "PEM", 2).unwrap(),
            canonical_hash(&upper, "PEM", 2).unwrap()
        );
    }

    #[test]
    fn every_field_changes_the_hash() {
        let base = canonical_hash(&binding(), "PEM", 1).unwrap();

        let variants = [
            canonical_hash(&Binding { host: "https://other.example.com", ..binding() }, "PEM", 1),
            canonical_hash(&Binding { service_id: "abd", ..binding() }, "PEM", 1),
            canonical_hash(&Binding { username: "bob", ..binding() }, "PEM", 1),
            canonical_hash(&Binding { device_id: "device-8", ..binding() }, "PEM", 1),
            canonical_hash(&binding(), "PEM2", 1),
            canonical_hash(&binding(), "PEM", 2),
        ];

        for variant in variants {
            assert_ne!(variant.unwrap(), base);
        }
    }

    #[test]
    fn empty_identity_fields_fail() {
        assert!(canonical_hash(&Binding { host: "", ..binding() }, "PEM", 1).is_err());
        assert!(canonical_hash(&Binding { service_id: "", ..binding() }, "PEM", 1).is_err());
        assert!(canonical_hash(&Binding { username: "", ..binding() }, "PEM", 1).is_err());
        assert!(canonical_hash(&Binding { device_id: "", ..binding() }, "PEM", 1).is_err());
        assert!(canonical_hash(&binding(), "", 1).is_err());
    }
}
