// src/routes/mod.rs
pub mod chat;
pub mod health;

use crate::state::SharedState;
use axum::{
    Json, Router,
    routing::{get, post},
};
use chat::chat_handler;
use health::health_handler;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

pub fn create_router() -> Router<SharedState> {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/chat", post(chat_handler))
        .layer(TraceLayer::new_for_http())
}

async fn root_handler() -> Json<Value> {
    Json(json!({ "message": "Ollama relay is running." }))
}
