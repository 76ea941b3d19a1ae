//! Error types for the classifier module

use std::time::Duration;

use crate::error::Error as CrateError;
use thiserror::Error;

/// Error type for classification calls
#[derive(Debug, Clone, Error)]
pub enum ClassificationError {
    /// Network or provider failure
    #[error("classification request failed: {0}")]
    Request(String),

    /// Provider quota or rate limit exhausted
    #[error("classification quota exhausted (retry after {retry_after_secs:?}s)")]
    Quota { retry_after_secs: Option<u64> },

    /// The call did not finish in time
    #[error("classification timed out after {0:?}")]
    Timeout(Duration),

    /// The model answered with something that is not the expected JSON
    #[error("malformed classification response: {0}")]
    MalformedResponse(String),
}

impl ClassificationError {
    /// Whether another attempt after a backoff may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ClassificationError::MalformedResponse(_))
    }
}

impl From<ClassificationError> for CrateError {
    fn from(err: ClassificationError) -> Self {
        CrateError::Classification(err.to_string())
    }
}
