use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Load failed: {0}")]
    LoadError(String),

    #[error("Missing entry point: {0}")]
    MissingEntryPoint(String),

    #[error("Execution failed: {0}")]
    ExecutionFailure(String),

    #[error("Execution timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
