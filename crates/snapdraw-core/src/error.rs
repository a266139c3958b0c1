//! Error types for drawing operations.

use crate::host::ServiceError;
use thiserror::Error;

/// Errors returned by the drawing core.
#[derive(Debug, Error)]
pub enum DrawError {
    #[error("Unknown mode: {0}")]
    UnknownMode(String),
    #[error("Unknown action: {0}")]
    UnknownAction(String),
    #[error("Invalid option: {0}")]
    InvalidOption(String),
    #[error("Feature not found: {0}")]
    FeatureNotFound(String),
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),
}

/// Result type for drawing operations.
pub type DrawResult<T> = Result<T, DrawError>;
