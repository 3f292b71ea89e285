//! Authenticated server session shared by all transfers.
//!
//! The session is the crate's window onto the vault server: a pooled HTTP
//! client, the server base address, and an optional bearer credential. It
//! is created once and cloned into every concurrent download task; reqwest
//! clients share their connection pool across clones, so concurrent
//! requests do not interfere.

use std::time::Duration;

use reqwest::Client;
use thiserror::Error;
use url::Url;

use crate::download::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};

/// Errors from constructing a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The server base URL does not parse.
    #[error("invalid server URL: {url}")]
    InvalidUrl {
        /// The rejected URL string.
        url: String,
    },

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {source}")]
    Client {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },
}

/// Authenticated request capability plus the server base address.
#[derive(Clone)]
pub struct ServerSession {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl std::fmt::Debug for ServerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSession")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

impl ServerSession {
    /// Creates a session for `base_url` with the default timeouts,
    /// attaching `token` as a bearer credential on every request when
    /// present.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidUrl`] for an unparseable base URL and
    /// [`SessionError::Client`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, SessionError> {
        Self::with_timeouts(
            base_url,
            token,
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            Duration::from_secs(READ_TIMEOUT_SECS),
        )
    }

    /// Creates a session with explicit connect and per-read idle timeouts.
    ///
    /// The client carries no total request timeout: an archive streams for
    /// as long as it takes (hours, under a modest rate cap), and staleness
    /// is bounded per read instead.
    ///
    /// # Errors
    ///
    /// Same as [`ServerSession::new`].
    pub fn with_timeouts(
        base_url: &str,
        token: Option<String>,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, SessionError> {
        let trimmed = base_url.trim_end_matches('/');
        Url::parse(trimmed).map_err(|_| SessionError::InvalidUrl {
            url: base_url.to_string(),
        })?;
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .gzip(true)
            .user_agent(concat!("vaultdl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| SessionError::Client { source })?;
        Ok(Self {
            client,
            base_url: trimmed.to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    /// Returns the server base address without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Builds an authenticated GET request for an absolute URL.
    #[must_use]
    pub fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
    }

    /// Returns the per-item download endpoint.
    #[must_use]
    pub fn download_url(&self, item_id: &str) -> String {
        format!("{}/api/games/{item_id}/download", self.base_url)
    }

    /// Returns the redeem address for a one-time download token.
    #[must_use]
    pub fn otp_redeem_url(&self, otp: &str) -> String {
        format!("{}/api/otp/game?otp={otp}", self.base_url)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_invalid_url() {
        let result = ServerSession::new("not a url", None);
        assert!(matches!(result, Err(SessionError::InvalidUrl { .. })));
    }

    #[test]
    fn test_trailing_slash_is_stripped() {
        let session = ServerSession::new("https://vault.example.org/", None).unwrap();
        assert_eq!(session.base_url(), "https://vault.example.org");
    }

    #[test]
    fn test_download_url_shape() {
        let session = ServerSession::new("https://vault.example.org", None).unwrap();
        assert_eq!(
            session.download_url("42"),
            "https://vault.example.org/api/games/42/download"
        );
    }

    #[test]
    fn test_otp_redeem_url_shape() {
        let session = ServerSession::new("https://vault.example.org", None).unwrap();
        assert_eq!(
            session.otp_redeem_url("abc123"),
            "https://vault.example.org/api/otp/game?otp=abc123"
        );
    }

    #[test]
    fn test_debug_does_not_leak_token() {
        let session =
            ServerSession::new("https://vault.example.org", Some("secret-token".to_string()))
                .unwrap();
        let rendered = format!("{session:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("authenticated: true"));
    }

    #[test]
    fn test_empty_token_means_unauthenticated() {
        let session =
            ServerSession::new("https://vault.example.org", Some(String::new())).unwrap();
        let rendered = format!("{session:?}");
        assert!(rendered.contains("authenticated: false"));
    }
}
