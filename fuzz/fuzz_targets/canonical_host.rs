//! Fuzz target for server URL normalization
//!
//! # Strategy
//!
//! - Structured URLs: scheme casing, host, optional port, path, padding
//! - Raw strings for everything the structured form cannot reach
//!
//! # Invariants
//!
//! - `canonical_host` and `ServerUrl::parse` never panic
//! - A canonical host keeps its scheme and ends in a trailing slash
//! - A canonical host built from a non-empty host is a fixed point
//! - Default ports never survive normalization

#![no_main]

use arbitrary::Arbitrary;
use cipherise_core::ServerUrl;
use cipherise_crypto::canonical_host;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Input {
    Structured(HostParts),
    Raw(String),
}

#[derive(Debug, Arbitrary)]
struct HostParts {
    scheme: Scheme,
    uppercase: bool,
    /// Filtered to `[A-Za-z0-9.-]`
    host: String,
    port: Option<u16>,
    path: String,
    leading_spaces: u8,
    trailing_slashes: u8,
}

#[derive(Debug, Arbitrary)]
enum Scheme {
    Http,
    Https,
}

impl HostParts {
    fn host(&self) -> String {
        self.host.chars().filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '-').collect()
    }

    fn render(&self) -> String {
        let scheme = match self.scheme {
            Scheme::Http => "http://",
            Scheme::Https => "https://",
        };
        let port = self.port.map(|p| format!(":{p}")).unwrap_or_default();
        let url = format!(
            "{}{scheme}{}{port}/{}{}",
            " ".repeat(usize::from(self.leading_spaces % 4)),
            self.host(),
            self.path,
            "/".repeat(usize::from(self.trailing_slashes % 4)),
        );
        if self.uppercase { url.to_uppercase() } else { url }
    }
}

fn check(input: &str) -> Option<String> {
    let canonical = canonical_host(input).ok();
    if let Some(host) = &canonical {
        assert!(host.starts_with("http://") || host.starts_with("https://"));
        assert!(host.ends_with('/'));
    }

    if let Ok(server) = ServerUrl::parse(input) {
        assert!(server.as_str().ends_with('/'));
        let _ = server.endpoint("sp/enrol-user");
        let _ = server.endpoint_for("sp/user-devices/", input, Some("all=true"));
    }
    canonical
}

fuzz_target!(|input: Input| {
    match input {
        Input::Raw(raw) => {
            check(&raw);
        },
        Input::Structured(parts) => {
            let Some(once) = check(&parts.render()) else {
                return;
            };
            if parts.host().is_empty() {
                return;
            }

            assert_eq!(canonical_host(&once).ok().as_deref(), Some(once.as_str()));
            assert!(!once.ends_with(":443/") && !once.ends_with(":80/"));
        },
    }
});
