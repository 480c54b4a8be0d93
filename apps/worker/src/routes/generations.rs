use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::builder::resume::meta_code;
use crate::errors::AppError;
use crate::models::generation::{validate_output_filename, DEFAULT_META_CODE};
use crate::models::{Job, NewJob, StatusCounts};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateGenerationRequest {
    pub output_filename: String,
    pub resume_data: Value,
    pub meta_code: Option<String>,
    pub resume_id: Option<String>,
    pub version_number: Option<i32>,
}

/// POST /api/v1/generations
/// Inserts a PENDING job; the worker picks it up through the insert feed.
pub async fn handle_create(
    State(state): State<AppState>,
    Json(req): Json<CreateGenerationRequest>,
) -> Result<(StatusCode, Json<Job>), AppError> {
    validate_output_filename(&req.output_filename).map_err(AppError::Validation)?;
    if !req.resume_data.is_object() {
        return Err(AppError::Validation(
            "resume_data must be a JSON object".to_string(),
        ));
    }

    let code = req
        .meta_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .or_else(|| meta_code(&req.resume_data))
        .unwrap_or(DEFAULT_META_CODE)
        .to_uppercase();

    let new_job = NewJob {
        resume_id: req.resume_id,
        version_number: req.version_number,
        ..NewJob::new(req.output_filename, req.resume_data)
    }
    .with_meta_code(code);

    let job = state.store.insert_job(new_job).await?;
    tracing::info!("Enqueued job {} ({})", job.id, job.output_filename);
    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /api/v1/generations/:id
pub async fn handle_get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>, AppError> {
    state
        .store
        .get_job(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Generation {id} not found")))
}

/// GET /api/v1/generations/stats
pub async fn handle_stats(State(state): State<AppState>) -> Result<Json<StatusCounts>, AppError> {
    Ok(Json(state.store.count_by_status().await?))
}
