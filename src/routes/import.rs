use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use tracing::{debug, info};
use uuid::Uuid;

use crate::extraction::Document;
use crate::models::{AppState, JobResultResponse, JobStatusResponse, SubmitResponse};
use crate::queue::{JobOutcome, JobStatusView};
use crate::types::{AppError, AppResult};

/// Room for multipart boundaries and the small form fields next to the file
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.pipeline.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/api/import/jobs", post(submit_job))
        .route("/api/import/jobs/{id}", get(job_status))
        .route("/api/import/jobs/{id}/result", get(job_result))
        .route("/api/import/jobs/{id}/cancel", post(cancel_job))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

struct Upload {
    filename: String,
    content_type: Option<String>,
    data: Bytes,
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::Validation("uploaded file is too large".to_string())
    } else {
        AppError::Validation(format!("invalid multipart body: {}", e.body_text()))
    }
}

/// Unparseable ids cannot name a job, so they read as not found
fn parse_job_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound(format!("job {raw}")))
}

impl From<JobStatusView> for JobStatusResponse {
    fn from(view: JobStatusView) -> Self {
        Self {
            job_id: view.job_id,
            status: view.status,
            progress: view.progress,
            error: view.error,
        }
    }
}

async fn submit_job(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<SubmitResponse>)> {
    let mut upload: Option<Upload> = None;
    let mut declared_type: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| "upload".to_string());
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(multipart_error)?;
                upload = Some(Upload {
                    filename,
                    content_type,
                    data,
                });
            }
            Some("contentType") => {
                let value = field.text().await.map_err(multipart_error)?;
                let value = value.trim();
                if !value.is_empty() {
                    declared_type = Some(value.to_string());
                }
            }
            other => debug!(field = ?other, "Ignoring multipart field"),
        }
    }

    let upload = upload.ok_or_else(|| AppError::Validation("multipart field 'file' is required".to_string()))?;
    info!(filename = %upload.filename, bytes = upload.data.len(), "Import upload received");

    if upload.data.is_empty() {
        return Err(AppError::Validation("uploaded file is empty".to_string()));
    }
    let max = state.config.pipeline.max_upload_bytes;
    if upload.data.len() > max {
        return Err(AppError::Validation(format!("uploaded file exceeds {max} bytes")));
    }

    // An explicit contentType field wins over the part's own header
    let content_type = declared_type.or(upload.content_type);
    let document = Document::from_bytes(upload.filename, content_type, upload.data);
    let job_id = state.import.submit(document).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id,
            status: "queued",
        }),
    ))
}

async fn job_status(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<JobStatusResponse>> {
    let id = parse_job_id(&id)?;
    let view = state.import.status(id).await?;
    Ok(Json(view.into()))
}

async fn job_result(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<JobResultResponse>> {
    let id = parse_job_id(&id)?;
    let response = match state.import.result(id).await? {
        JobOutcome::Completed(result) => JobResultResponse::completed(result),
        JobOutcome::Failed(message) => JobResultResponse::failed(message),
    };
    Ok(Json(response))
}

async fn cancel_job(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<JobStatusResponse>> {
    let id = parse_job_id(&id)?;
    let view = state.import.cancel(id).await?;
    Ok(Json(view.into()))
}
