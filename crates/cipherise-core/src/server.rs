//! Cipherise server base URL.

use std::fmt;

use url::Url;

use crate::error::{CipheriseError, Result};

/// Normalized server base URL.
///
/// Always `http` or `https`, always ends in `/`, and never carries the
/// scheme's default port. Relative endpoint paths join onto it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerUrl(Url);

impl ServerUrl {
    /// Parse and normalize a base URL.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for an unparseable URL or a non-HTTP scheme
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let mut url = Url::parse(trimmed).map_err(|e| CipheriseError::InvalidInput {
            reason: format!("server url '{trimmed}': {e}"),
        })?;

        if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
            return Err(CipheriseError::InvalidInput {
                reason: format!("server url '{trimmed}' must be http(s)"),
            });
        }

        url.set_query(None);
        url.set_fragment(None);
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        Ok(Self(url))
    }

    /// Absolute URL of an endpoint path such as `sp/enrol-user`.
    pub fn endpoint(&self, path: &str) -> Result<String> {
        self.0
            .join(path)
            .map(String::from)
            .map_err(|e| CipheriseError::InvalidInput { reason: format!("endpoint '{path}': {e}") })
    }

    /// Endpoint path followed by one percent-encoded segment and an optional
    /// query, e.g. `sp/user-devices/{username}?all=true`.
    pub fn endpoint_for(&self, path: &str, segment: &str, query: Option<&str>) -> Result<String> {
        let mut url = self
            .0
            .join(path)
            .map_err(|e| CipheriseError::InvalidInput {
                reason: format!("endpoint '{path}': {e}"),
            })?;

        url.path_segments_mut()
            .map_err(|()| CipheriseError::InvalidInput { reason: format!("endpoint '{path}'") })?
            .pop_if_empty()
            .push(segment);
        url.set_query(query);

        Ok(url.into())
    }

    /// Base URL as hashed into device bindings.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for ServerUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}
