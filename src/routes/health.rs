use axum::{Json, extract::State, http::StatusCode};

use crate::{message::HealthResponse, state::SharedState};

/// Reports upstream reachability and the installed models. An unreachable
/// upstream is a 503 with a `degraded` body, never a handler failure.
pub async fn health_handler(State(state): State<SharedState>) -> (StatusCode, Json<HealthResponse>) {
    match state.ollama.list_models().await {
        Ok(models) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                models,
                error: None,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, host = state.ollama.base_url(), "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded".to_string(),
                    models: Vec::new(),
                    error: Some(format!("Ollama server is unavailable: {e}")),
                }),
            )
        }
    }
}
