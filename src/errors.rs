//! Error taxonomy for the scraping pipeline.
//!
//! Every fallible operation in the pipeline returns a [`ScrapeError`], which
//! carries enough classification for each layer to make its recovery decision:
//!
//! - The retry policy recovers transient [`ScrapeError::Network`] failures
//!   locally (see [`crate::fetch`]).
//! - The task boundary absorbs any unrecovered error as a task failure
//!   without touching sibling tasks (see [`crate::scheduler`]).
//! - Merger-level [`ScrapeError::Io`] failures abort the whole run, since a
//!   silently incomplete final artifact is worse than no artifact.
//!
//! Retryability is an explicit property of the error value, inspected with
//! [`ScrapeError::is_retryable`], rather than something inferred from control
//! flow.

use thiserror::Error;

/// Unified error type for the scraping pipeline.
#[derive(Error, Debug)]
pub enum ScrapeError {
    /// A malformed request row or an otherwise unusable configuration value.
    /// Surfaced immediately; the affected task is skipped.
    #[error("config error: {0}")]
    Config(String),

    /// A network-level failure: unreachable host, timeout, server error, or
    /// a rate-limit signal. `rate_limited` distinguishes throttling (which
    /// always warrants backoff) from generic transport trouble.
    #[error("network error: {message}")]
    Network { message: String, rate_limited: bool },

    /// The source's page or payload structure could not be read. Never
    /// retried: a structural mismatch will not fix itself.
    #[error("parse error: {0}")]
    Parse(String),

    /// An intermediate or final store could not be written.
    #[error("store I/O error")]
    Io(#[from] std::io::Error),

    /// The task stopped between fetches because shutdown was requested.
    /// Not a failure of the source; never retried.
    #[error("cancelled: shutdown requested")]
    Cancelled,
}

impl ScrapeError {
    /// Build a network error from a `reqwest` failure, classifying timeouts,
    /// connection failures and 5xx statuses as retryable transport errors.
    pub fn from_request(e: reqwest::Error) -> Self {
        ScrapeError::Network {
            message: e.to_string(),
            rate_limited: false,
        }
    }

    /// Shorthand for a rate-limit signal on `url`.
    pub fn rate_limited(url: &str) -> Self {
        ScrapeError::Network {
            message: format!("rate limited by {url}"),
            rate_limited: true,
        }
    }

    /// Whether the retry policy may spend attempt budget on this error.
    ///
    /// Only network failures are retryable; config, parse and I/O errors
    /// pass through the retry loop untouched.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScrapeError::Network { .. })
    }

    /// Whether this error is the distinguished rate-limit signal.
    pub fn is_rate_limit(&self) -> bool {
        matches!(
            self,
            ScrapeError::Network {
                rate_limited: true,
                ..
            }
        )
    }
}
