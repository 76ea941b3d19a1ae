//! Error types for the bojo crate

use thiserror::Error;

/// Result type for bojo operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for bojo operations
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Page fetch error
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// AI classification error
    #[error("Classification error: {0}")]
    Classification(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Crawl orchestration error
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    /// Results query error
    #[error("Query error: {0}")]
    Query(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}
