//! Service errors and their HTTP mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use wicket_core::{MarshalError, StoreError, WidgetId};
use wicket_pipeline::PipelineError;
use wicket_runtime::RuntimeError;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed request.
    #[error("{0}")]
    Validation(String),

    #[error("Widget with ID {0} not found.")]
    NotFound(WidgetId),

    #[error("Failed to generate widget: {0}")]
    Generation(#[from] PipelineError),

    #[error("{0}")]
    Marshal(#[from] MarshalError),

    #[error("{0}")]
    Execution(#[from] RuntimeError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Generation(e) => match e {
                PipelineError::SchemaUnavailable(_)
                | PipelineError::LlmError(_)
                | PipelineError::InvalidGenerationResult(_) => StatusCode::BAD_REQUEST,
                PipelineError::ConfigError(_)
                | PipelineError::IoError(_)
                | PipelineError::SerializationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ServiceError::Marshal(MarshalError::Validation(_)) => StatusCode::BAD_REQUEST,
            ServiceError::Marshal(MarshalError::Upload { .. })
            | ServiceError::Execution(_)
            | ServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Mapping for the widget execution route: server faults carry an
    /// `error` body, everything else the usual `detail`.
    pub fn into_execution_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            let body = serde_json::json!({
                "error": format!("An error occurred during execution: {self}"),
            });
            return (status, Json(body)).into_response();
        }
        self.into_response()
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = serde_json::json!({ "detail": self.to_string() });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_failures_are_client_faults() {
        let err = ServiceError::from(PipelineError::InvalidGenerationResult("x".into()));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let err = ServiceError::from(PipelineError::SchemaUnavailable("x".into()));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn runtime_failures_are_server_faults() {
        let err = ServiceError::from(RuntimeError::MissingEntryPoint("x".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let err = ServiceError::from(StoreError::Persistence("disk full".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn not_found_message_names_the_id() {
        let err = ServiceError::NotFound(WidgetId(42));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Widget with ID 42 not found.");
    }
}
