// HTTP surface: one generation endpoint plus lookup of saved packs.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::archive::archive_filename;
use crate::errors::PipelineError;
use crate::pipeline::{CreatedDatapack, Pipeline};
use crate::wire::{GenerateRequest, ValidationStatus};

/// Longest value sent in `X-Datapack-Validation-Errors`.
pub const MAX_ERRORS_HEADER_CHARS: usize = 1800;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub default_version: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/generate", post(generate))
        .route("/api/datapacks/{id}", get(show))
        .with_state(state)
}

pub async fn serve(state: AppState, bind: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("datapack_forge listening on {bind}");
    axum::serve(listener, router(state)).await
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "datapack_forge" }))
}

async fn generate(
    State(state): State<AppState>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body.map_err(|_| ApiError::BadBody)?;
    let req = body.normalize(&state.default_version)?;

    let created = state
        .pipeline
        .create_datapack(&req.idea, &req.version, req.owner_id.as_deref())
        .await?;

    Ok(archive_response(created))
}

async fn show(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    match state.pipeline.store().load(&id).await? {
        Some(row) => Ok(Json(row).into_response()),
        None => Err(ApiError::NotFound(id)),
    }
}

fn archive_response(created: CreatedDatapack) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/zip"));
    put(
        &mut headers,
        header::CONTENT_DISPOSITION,
        &format!("attachment; filename=\"{}\"", archive_filename(&created.spec.name)),
    );
    put(&mut headers, HeaderName::from_static("x-datapack-id"), &created.id);
    put(&mut headers, HeaderName::from_static("x-datapack-pack-name"), &created.spec.name);
    put(
        &mut headers,
        HeaderName::from_static("x-datapack-files"),
        &serde_json::to_string(&created.entries).unwrap_or_default(),
    );
    put(&mut headers, HeaderName::from_static("x-datapack-validation"), created.status.as_str());
    put(
        &mut headers,
        HeaderName::from_static("x-datapack-repair-attempts"),
        &created.repair_attempts.to_string(),
    );
    if created.status == ValidationStatus::Failed && !created.errors.is_empty() {
        let errors = serde_json::to_string(&created.errors).unwrap_or_default();
        let truncated: String = errors.chars().take(MAX_ERRORS_HEADER_CHARS).collect();
        put(&mut headers, HeaderName::from_static("x-datapack-validation-errors"), &truncated);
    }

    (StatusCode::OK, headers, Bytes::from(created.archive)).into_response()
}

/// Header values must be visible ASCII; anything else becomes `?`.
fn put(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    let cleaned: String = value
        .chars()
        .map(|c| if (' '..='~').contains(&c) { c } else { '?' })
        .collect();
    if let Ok(v) = HeaderValue::from_str(&cleaned) {
        headers.insert(name, v);
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub category: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug)]
pub enum ApiError {
    BadBody,
    NotFound(String),
    Pipeline(PipelineError),
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        ApiError::Pipeline(e)
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadBody => (StatusCode::BAD_REQUEST, "INVALID_BODY"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Pipeline(e) => match e {
                PipelineError::Input(_) => (StatusCode::BAD_REQUEST, "INPUT_ERROR"),
                PipelineError::Configuration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIGURATION_ERROR"),
                PipelineError::Extraction => (StatusCode::BAD_GATEWAY, "EXTRACTION_ERROR"),
                PipelineError::Parse(_) => (StatusCode::BAD_GATEWAY, "PARSE_ERROR"),
                PipelineError::Backend(_) => (StatusCode::BAD_GATEWAY, "BACKEND_ERROR"),
                PipelineError::Validation { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
                PipelineError::Save(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SAVE_ERROR"),
                PipelineError::Packaging(_) => (StatusCode::INTERNAL_SERVER_ERROR, "PACKAGING_ERROR"),
            },
        }
    }

    fn category(&self) -> &'static str {
        match self {
            ApiError::BadBody | ApiError::NotFound(_) => "client",
            ApiError::Pipeline(e) => e.category().as_str(),
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::BadBody => "Invalid JSON body.".into(),
            ApiError::NotFound(id) => format!("no datapack with id {id}"),
            ApiError::Pipeline(PipelineError::Input(msg)) => msg.clone(),
            ApiError::Pipeline(PipelineError::Validation { attempts, .. }) => {
                format!("Datapack validation failed after {attempts} repair attempt(s).")
            }
            ApiError::Pipeline(e) => format!("Failed to generate datapack: {e}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(code, "request failed: {}", self.message());
        }
        let details = match &self {
            ApiError::Pipeline(PipelineError::Validation { errors, .. }) => Some(json!(errors)),
            _ => None,
        };
        let body = ErrorBody {
            error: ErrorDetail { code, category: self.category(), message: self.message(), details },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_values_are_made_ascii() {
        let mut h = HeaderMap::new();
        put(&mut h, HeaderName::from_static("x-datapack-pack-name"), "Héal\nPack");
        assert_eq!(h.get("x-datapack-pack-name").unwrap(), "H?al?Pack");
    }

    #[test]
    fn status_codes_follow_error_kind() {
        let code = |e: PipelineError| ApiError::from(e).status_and_code().0;
        assert_eq!(code(PipelineError::Input("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(code(PipelineError::Backend("x".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(code(PipelineError::Extraction), StatusCode::BAD_GATEWAY);
        assert_eq!(
            code(PipelineError::Validation { errors: vec![], attempts: 2 }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(code(PipelineError::Packaging("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(code(PipelineError::Save("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(code(PipelineError::Configuration("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(code(PipelineError::Parse("x".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(ApiError::BadBody.status_and_code().0, StatusCode::BAD_REQUEST);
    }
}
