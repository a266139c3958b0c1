//! Error types for the replay tool.

use snapdraw_core::DrawError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Draw error: {0}")]
    Draw(#[from] DrawError),
    #[error("Usage: {0}")]
    Usage(String),
}

pub type ReplayResult<T> = Result<T, ReplayError>;
