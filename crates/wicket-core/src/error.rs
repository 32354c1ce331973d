use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("record {key} is corrupt: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum MarshalError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("failed to store upload {filename}: {source}")]
    Upload {
        filename: String,
        #[source]
        source: std::io::Error,
    },
}
