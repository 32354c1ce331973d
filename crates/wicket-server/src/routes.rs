//! HTTP routes.
//!
//! | method | path                   | body                | success            |
//! |--------|------------------------|---------------------|--------------------|
//! | POST   | `/generate_widget`     | `{"prompt": "..."}` | widget record      |
//! | GET    | `/get_widgets`         |                     | widgets, newest first |
//! | GET    | `/get_widget/{id}`     |                     | widget record      |
//! | POST   | `/run_widget/{id}`     | multipart or urlencoded form | `{"output": "..."}` |
//! | GET    | `/health`              |                     | `{"status", "version"}` |

use axum::{
    Form, Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Request, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use wicket_core::{RequestPayload, Widget, WidgetId};

use crate::error::ServiceError;
use crate::state::AppState;

/// Uploaded images can be large; the default 2 MiB is too tight.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct PromptRequest {
    pub prompt: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunResponse {
    pub output: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/generate_widget", post(generate_widget))
        .route("/get_widgets", get(get_widgets))
        .route("/get_widget/{id}", get(get_widget))
        .route("/run_widget/{id}", post(run_widget))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn generate_widget(
    State(state): State<AppState>,
    Json(request): Json<PromptRequest>,
) -> Result<Json<Widget>, ServiceError> {
    tracing::info!(prompt = %request.prompt, "Widget generation requested");
    let widget = state.service.create(&request.prompt).await?;
    Ok(Json(widget))
}

async fn get_widgets(State(state): State<AppState>) -> Result<Json<Vec<Widget>>, ServiceError> {
    Ok(Json(state.service.list().await?))
}

async fn get_widget(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Widget>, ServiceError> {
    Ok(Json(state.service.get(WidgetId(id)).await?))
}

async fn run_widget(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    request: Request,
) -> Response {
    let payload = match read_form(request).await {
        Ok(payload) => payload,
        Err(e) => return e.into_response(),
    };

    match state.service.execute(WidgetId(id), payload).await {
        Ok(output) => Json(RunResponse { output }).into_response(),
        Err(e) => e.into_execution_response(),
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Read the run form from a request body.
///
/// An empty body or one without a content type runs the widget with no
/// inputs. Multipart and urlencoded forms are accepted; any other content
/// type is a validation error.
async fn read_form(request: Request) -> Result<RequestPayload, ServiceError> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ServiceError::Validation(format!("cannot read request body: {e}")))?;

    let mime = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|essence| essence.trim().to_ascii_lowercase())
        .filter(|essence| !essence.is_empty());
    let Some(mime) = mime else {
        return Ok(RequestPayload::new());
    };
    if bytes.is_empty() {
        return Ok(RequestPayload::new());
    }

    let request = Request::from_parts(parts, Body::from(bytes));
    match mime.as_str() {
        "multipart/form-data" => {
            let multipart = Multipart::from_request(request, &())
                .await
                .map_err(|e| ServiceError::Validation(format!("malformed form data: {e}")))?;
            read_multipart(multipart).await
        }
        "application/x-www-form-urlencoded" => {
            let Form(pairs) = Form::<Vec<(String, String)>>::from_request(request, &())
                .await
                .map_err(|e| ServiceError::Validation(format!("malformed form data: {e}")))?;
            Ok(pairs
                .into_iter()
                .fold(RequestPayload::new(), |payload, (name, value)| {
                    payload.with_field(name, value)
                }))
        }
        other => Err(ServiceError::Validation(format!(
            "unsupported form content type '{other}'"
        ))),
    }
}

/// Split a multipart form into text fields and file uploads.
///
/// A part counts as an upload only when it carries a non-empty filename;
/// browsers send an empty file part for an untouched file input, and that
/// becomes an empty text field.
async fn read_multipart(mut multipart: Multipart) -> Result<RequestPayload, ServiceError> {
    let mut payload = RequestPayload::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::Validation(format!("malformed form data: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ServiceError::Validation(format!("cannot read form field '{name}': {e}")))?;

        payload = match filename {
            Some(filename) if !filename.is_empty() => payload.with_file(name, filename, bytes.to_vec()),
            _ => payload.with_field(name, String::from_utf8_lossy(&bytes).into_owned()),
        };
    }
    Ok(payload)
}
