//! Error types for the download module.
//!
//! Primary transport failures, fallback command failures and the terminal
//! retry-exhausted condition all live here. None of them escape
//! [`ItemDownloader::resolve`](super::ItemDownloader::resolve); they are
//! carried inside a failed [`DownloadResult`](super::DownloadResult) instead.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching a single URL.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS, body decode).
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error while writing the destination file.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The manifest URL is malformed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The fallback command did not produce the file.
    #[error(transparent)]
    Fallback(#[from] FallbackError),

    /// Every attempt of the retry budget failed.
    #[error("gave up on {url} after {attempts} attempt(s): {last}")]
    RetryExhausted {
        /// The URL that could not be fetched.
        url: String,
        /// Number of (primary, fallback) pairs that were tried.
        attempts: u32,
        /// The primary transport error from the final attempt.
        #[source]
        last: Box<DownloadError>,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a retry-exhausted error wrapping the final attempt's error.
    pub fn retry_exhausted(url: impl Into<String>, attempts: u32, last: DownloadError) -> Self {
        Self::RetryExhausted {
            url: url.into(),
            attempts,
            last: Box::new(last),
        }
    }

    /// Describes the error without the URL it concerns.
    ///
    /// The diagnostic log writes the URL after this text, so repeating it
    /// here would print it twice.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::Network { source, .. } => describe_network(source),
            Self::HttpStatus { status, .. } => format!("HTTP {status}"),
            Self::Io { .. } | Self::Fallback(_) => self.to_string(),
            Self::InvalidUrl { .. } => "invalid URL".to_string(),
            Self::RetryExhausted { last, .. } => last.summary(),
        }
    }

    /// Returns the error that ended the last attempt, unwrapping `RetryExhausted`.
    #[must_use]
    pub fn last_attempt(&self) -> &DownloadError {
        match self {
            Self::RetryExhausted { last, .. } => last.as_ref(),
            other => other,
        }
    }
}

/// Failures of the external fallback command.
///
/// The fallback is never allowed to panic or bubble up; the item downloader
/// treats every variant as "fallback did not succeed".
#[derive(Debug, Error)]
pub enum FallbackError {
    /// The command could not be started (missing binary, permissions).
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program that was invoked.
        program: String,
        /// The underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// The command ran but exited unsuccessfully.
    #[error("{program} exited with {}", describe_exit(.code))]
    ExitStatus {
        /// Program that was invoked.
        program: String,
        /// Exit code, or `None` when terminated by a signal.
        code: Option<i32>,
    },

    /// The command exceeded its ceiling and was killed.
    #[error("{program} timed out after {secs}s")]
    Timeout {
        /// Program that was invoked.
        program: String,
        /// The ceiling that was hit.
        secs: u64,
    },
}

// reqwest's own Display embeds the URL, so describe the kind and the cause.
fn describe_network(error: &reqwest::Error) -> String {
    let kind = if error.is_timeout() {
        "timed out"
    } else if error.is_connect() {
        "connection failed"
    } else if error.is_body() || error.is_decode() {
        "response body error"
    } else if error.is_redirect() {
        "redirect error"
    } else {
        "request failed"
    };
    match std::error::Error::source(error) {
        Some(cause) => format!("{kind}: {cause}"),
        None => kind.to_string(),
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

// Note on From trait implementations:
// `From<reqwest::Error>` and `From<std::io::Error>` are deliberately absent.
// Every variant needs the url or path the source error lacks, so callers go
// through the helper constructors above.
