//! Error types for results queries

use thiserror::Error;

use crate::error::Error as CrateError;
use crate::store::DbError;

/// Errors that can occur while reading run results
#[derive(Debug, Error)]
pub enum QueryError {
    /// Error occurred during database operations
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// No run with this id
    #[error("Run not found: {0}")]
    RunNotFound(String),

    /// Invalid query parameters
    #[error("Invalid query parameters: {0}")]
    InvalidParameters(String),
}

impl From<libsql::Error> for QueryError {
    fn from(err: libsql::Error) -> Self {
        QueryError::Database(DbError::Query(err.to_string()))
    }
}

impl From<QueryError> for CrateError {
    fn from(err: QueryError) -> Self {
        CrateError::Query(err.to_string())
    }
}
