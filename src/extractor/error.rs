//! Error types for the extractor module

use crate::error::Error as CrateError;
use thiserror::Error;

/// Error type for extractor construction. Extraction itself never fails.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// A configured CSS selector did not parse
    #[error("invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// A configured detail URL pattern did not compile
    #[error("invalid detail URL pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

impl From<ExtractError> for CrateError {
    fn from(err: ExtractError) -> Self {
        CrateError::Config(err.to_string())
    }
}
