use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("database schema unavailable: {0}")]
    SchemaUnavailable(String),

    #[error("LLM call failed: {0}")]
    LlmError(String),

    #[error("invalid generation result: {0}")]
    InvalidGenerationResult(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for PipelineError {
    fn from(e: rusqlite::Error) -> Self {
        PipelineError::SchemaUnavailable(format!("could not read database schema: {e}"))
    }
}
