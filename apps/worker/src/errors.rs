use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::archive::ArchiveError;
use crate::builder::{CompileError, RenderError};
use crate::models::JobStatus;

/// Failures talking to the job store.
///
/// Fatal on the claim/update paths; the live watcher recovers from
/// subscription failures with a backoff.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Subscription error: {0}")]
    Subscription(String),

    #[error("Job {id} cannot move to {to}: it is not PROCESSING")]
    InvalidTransition { id: Uuid, to: JobStatus },

    #[error("Corrupt job record {id}: {reason}")]
    CorruptRecord { id: Uuid, reason: String },
}

/// Per-job pipeline failure. Captured at the job boundary and written to the
/// job's `error_log`; never escapes the worker loop.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Render failed: {0}")]
    Render(#[from] RenderError),

    #[error("Compile failed: {0}")]
    Compile(#[from] CompileError),

    #[error("Upload failed: {0}")]
    Archive(#[from] ArchiveError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error type for the HTTP surface.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Store(e) => {
                tracing::error!("Store error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
