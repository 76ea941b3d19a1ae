//! Error types for the orchestrator module

use crate::error::Error as CrateError;
use crate::store::DbError;
use thiserror::Error;

/// Errors that stop a run from starting or finishing. Region-level
/// failures never surface here; they become crawl log rows.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The region catalog could not be read
    #[error("region catalog unavailable: {0}")]
    Catalog(String),

    /// Run bookkeeping failed
    #[error("database error: {0}")]
    Database(#[from] DbError),

    /// No run with this id
    #[error("run not found: {0}")]
    RunNotFound(String),
}

impl From<OrchestratorError> for CrateError {
    fn from(err: OrchestratorError) -> Self {
        CrateError::Orchestrator(err.to_string())
    }
}
