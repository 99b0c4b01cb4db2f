use axum::{extract::State, response::Json as ResponseJson, routing::get, Json, Router};

use crate::models::{AppState, HealthResponse};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> ResponseJson<HealthResponse> {
    let providers = state.import.providers();
    let response = HealthResponse {
        // Jobs can still be queued without providers, but none will succeed
        status: if providers.is_empty() { "degraded" } else { "ok" }.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        queue: state.import.counts().await,
        providers,
        recent_errors: state.import.recent_errors().await,
    };

    Json(response)
}
