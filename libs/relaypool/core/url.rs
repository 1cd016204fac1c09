//! Relay addresses
//!
//! Scheme and host are case-insensitive, so every `RelayUrl` is stored with
//! both lowercased. Path and query are kept as given since they are dialed
//! verbatim. Scheme validation is deferred to connection-open time.

use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Normalized relay URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct RelayUrl(String);

impl RelayUrl {
    /// Normalize a URL: trim whitespace, lowercase scheme and host, drop one trailing `/`
    pub fn new(raw: impl AsRef<str>) -> Self {
        let trimmed = raw.as_ref().trim();
        let mut url = match trimmed.split_once("://") {
            Some((scheme, rest)) => {
                let authority_end = rest
                    .find(|c: char| matches!(c, '/' | '?' | '#'))
                    .unwrap_or(rest.len());
                let (authority, tail) = rest.split_at(authority_end);
                // Userinfo is case-sensitive
                let host_start = authority.rfind('@').map_or(0, |at| at + 1);
                let (userinfo, host) = authority.split_at(host_start);
                format!(
                    "{}://{}{}{}",
                    scheme.to_ascii_lowercase(),
                    userinfo,
                    host.to_ascii_lowercase(),
                    tail
                )
            }
            None => trimmed.to_lowercase(),
        };
        if url.ends_with('/') && !url.ends_with("://") {
            url.pop();
        }
        Self(url)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check that the URL can be opened as a WebSocket connection
    ///
    /// # Returns
    /// * `Ok(())` - Scheme is `ws` or `wss` and a host is present
    /// * `Err(RelayError::RelayUrlInvalid)` - Anything else
    pub fn validate_scheme(&self) -> Result<()> {
        let parsed = ::url::Url::parse(&self.0)
            .map_err(|e| RelayError::RelayUrlInvalid(format!("{}: {}", self.0, e)))?;

        match parsed.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(RelayError::RelayUrlInvalid(format!(
                    "{}: unsupported scheme '{}'",
                    self.0, other
                )))
            }
        }

        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(RelayError::RelayUrlInvalid(format!("{}: missing host", self.0)));
        }

        Ok(())
    }
}

impl fmt::Display for RelayUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RelayUrl {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<&str> for RelayUrl {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<&String> for RelayUrl {
    fn from(raw: &String) -> Self {
        Self::new(raw)
    }
}

impl From<RelayUrl> for String {
    fn from(url: RelayUrl) -> Self {
        url.0
    }
}

/// A configured relay, as stored by an endpoint directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEndpoint {
    pub url: RelayUrl,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl RelayEndpoint {
    pub fn new(url: impl Into<RelayUrl>, enabled: bool) -> Self {
        Self {
            url: url.into(),
            enabled,
        }
    }

    /// Derive the desired relay set (enabled endpoints only)
    pub fn desired_set<'a>(endpoints: impl IntoIterator<Item = &'a RelayEndpoint>) -> HashSet<RelayUrl> {
        endpoints
            .into_iter()
            .filter(|endpoint| endpoint.enabled)
            .map(|endpoint| endpoint.url.clone())
            .collect()
    }
}
