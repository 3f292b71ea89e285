//! Error types for the download module.
//!
//! This module defines structured errors for all transfer operations.
//! Cancellation is deliberately a member of this enum: the streaming loop
//! reports it through the same channel as real faults, and the task maps it
//! to the `aborted` terminal state instead of `error`.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while transferring an archive.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The server answered with a non-success HTTP status.
    #[error("HTTP {status} downloading {url}")]
    RequestFailed {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Network-level error (DNS resolution, connection refused, TLS errors,
    /// stream interrupted mid-body, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// No destination could be opened for the received bytes (unwritable
    /// download directory, misconfigured path).
    #[error("cannot open download destination: {reason}")]
    SinkUnavailable {
        /// Human-readable description of why the destination is unusable.
        reason: String,
    },

    /// The destination was opened but a write or close failed afterwards.
    #[error("IO error writing to {path}: {source}")]
    SinkIo {
        /// The destination path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The transfer was cancelled, either explicitly or by the user
    /// declining a save prompt. Never surfaced as an error state.
    #[error("download cancelled")]
    Cancelled,
}

impl DownloadError {
    /// Creates a non-success HTTP status error.
    pub fn request_failed(url: impl Into<String>, status: u16) -> Self {
        Self::RequestFailed {
            url: url.into(),
            status,
        }
    }

    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an unopenable-destination error.
    pub fn sink_unavailable(reason: impl Into<String>) -> Self {
        Self::SinkUnavailable {
            reason: reason.into(),
        }
    }

    /// Creates a post-open sink IO error.
    pub fn sink_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::SinkIo {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Returns true for cancellation, which resolves to the `aborted`
    /// terminal state rather than `error`.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

// Note on From trait implementations:
// We intentionally do NOT implement `From<reqwest::Error>` or
// `From<std::io::Error>` because the variants require context (url, path)
// that the source errors don't provide. The helper constructors are the
// correct pattern here as they force callers to supply that context.

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_request_failed_display() {
        let error = DownloadError::request_failed("https://vault.example/api/games/42/download", 503);
        let msg = error.to_string();
        assert!(msg.contains("503"), "Expected '503' in: {msg}");
        assert!(
            msg.contains("https://vault.example/api/games/42/download"),
            "Expected URL in: {msg}"
        );
    }

    #[test]
    fn test_timeout_display() {
        let error = DownloadError::timeout("https://vault.example/api/games/7/download");
        assert!(error.to_string().contains("timeout"));
        assert!(error.to_string().contains("/api/games/7/download"));
    }

    #[test]
    fn test_sink_unavailable_display() {
        let error = DownloadError::sink_unavailable("permission denied creating /nope/game.zip");
        let msg = error.to_string();
        assert!(
            msg.contains("cannot open download destination"),
            "Expected destination phrase in: {msg}"
        );
        assert!(msg.contains("/nope/game.zip"), "Expected path in: {msg}");
    }

    #[test]
    fn test_sink_io_display() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let error = DownloadError::sink_io(PathBuf::from("/tmp/game.zip"), io_error);
        let msg = error.to_string();
        assert!(msg.contains("/tmp/game.zip"), "Expected path in: {msg}");
    }

    #[test]
    fn test_invalid_url_display() {
        let error = DownloadError::invalid_url("not-a-url");
        let msg = error.to_string();
        assert!(msg.contains("invalid URL"), "Expected 'invalid URL' in: {msg}");
        assert!(msg.contains("not-a-url"), "Expected URL in: {msg}");
    }

    #[test]
    fn test_cancelled_is_not_an_error_classification() {
        assert!(DownloadError::Cancelled.is_cancelled());
        assert!(!DownloadError::timeout("https://x.test/y").is_cancelled());
        assert!(!DownloadError::sink_unavailable("nope").is_cancelled());
    }
}
