//! Error types for the fetcher module

use std::time::Duration;

use crate::error::Error as CrateError;
use thiserror::Error;

/// Error type for page fetches
#[derive(Debug, Error)]
pub enum FetchError {
    /// The page did not reach DOMContentLoaded in time
    #[error("timed out after {after:?} loading {url}")]
    Timeout { url: String, after: Duration },

    /// Navigation failed (DNS, TLS, HTTP error status, aborted load)
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// The site answered with a bot-detection or access-denied page
    #[error("blocked by {url} (status {status:?})")]
    Blocked { url: String, status: Option<u16> },

    /// Browser could not be launched or driven
    #[error("browser error: {0}")]
    Browser(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing error
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl FetchError {
    /// Transient failures worth another attempt. Blocks are not: hammering
    /// a site that just flagged us makes it worse.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::Timeout { .. } | FetchError::Navigation { .. } | FetchError::Http(_)
        )
    }
}

impl From<FetchError> for CrateError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Http(e) => CrateError::Http(e),
            _ => CrateError::Fetch(err.to_string()),
        }
    }
}
