//! API Routes
//!
//! - `/api/import/jobs` - Document upload, job status, results and cancellation
//! - `/api/health` - Queue counters, usable providers and recent failures

pub mod health;
pub mod import;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::json;
use tracing::{info, warn};

use crate::models::AppState;
use crate::types::AppError;

/// Seconds a client should wait before resubmitting to a full queue
pub const RETRY_AFTER_SECS: &str = "5";

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    Router::new()
        .merge(import::router(state.clone()))
        .merge(health::router(state))
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Extraction(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::NotReady(_) => StatusCode::CONFLICT,
            AppError::QueueFull { .. } | AppError::NoProviders => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Provider { .. } | AppError::ProvidersExhausted { .. } => StatusCode::BAD_GATEWAY,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Cancelled
            | AppError::Transformation(_)
            | AppError::Config(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!(category = self.category(), error = %self, "Request failed");
        }

        let body = json!({
            "success": false,
            "error": { "message": self.user_message() }
        });
        let mut response = (status, Json(body)).into_response();
        if matches!(self, AppError::QueueFull { .. }) {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::Validation("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::NotReady("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::QueueFull { capacity: 1 }.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Internal("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_queue_full_sets_retry_after() {
        let response = AppError::QueueFull { capacity: 4 }.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], RETRY_AFTER_SECS);
    }
}
