use axum::{
    Json,
    body::Body,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::header,
    response::{IntoResponse, Response},
};
use futures_util::TryStreamExt;
use uuid::Uuid;

use crate::{
    error::AppError,
    message::{ChatQuery, ChatRequest, ChatResponse},
    services::ollama_client::OllamaClient,
    state::SharedState,
};

/// `POST /chat` buffered by default, `POST /chat?stream=true` for chunked text.
pub async fn chat_handler(
    State(state): State<SharedState>,
    query: Result<Query<ChatQuery>, QueryRejection>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Query(query) = query.map_err(|e| AppError::Validation(e.body_text()))?;
    let Json(payload) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    let max_tokens = validate(&payload, state.config.max_tokens_limit)?;

    let ollama = match payload.model.as_deref().map(str::trim) {
        Some(model) if !model.is_empty() => state.ollama.with_model(model),
        _ => state.ollama.clone(),
    };

    let request_id = Uuid::new_v4();
    tracing::info!(
        %request_id,
        model = ollama.model(),
        messages = payload.messages.len(),
        stream = query.stream,
        "relaying chat request"
    );

    if query.stream {
        stream_reply(&ollama, &payload, max_tokens, request_id).await
    } else {
        let response = ollama
            .chat(&payload.messages, payload.temperature, max_tokens)
            .await?;
        tracing::info!(%request_id, chars = response.len(), "chat reply complete");
        Ok(Json(ChatResponse { response }).into_response())
    }
}

/// Forwards fragments as they arrive. A mid-stream upstream failure becomes a
/// body error, so hyper aborts the chunked response instead of terminating it cleanly.
async fn stream_reply(
    ollama: &OllamaClient,
    payload: &ChatRequest,
    max_tokens: u32,
    request_id: Uuid,
) -> Result<Response, AppError> {
    let fragments = ollama
        .chat_stream(&payload.messages, payload.temperature, max_tokens)
        .await?;

    let body = fragments.inspect_err(move |e| {
        tracing::error!(%request_id, error = %e, "upstream stream failed, aborting response");
    });

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(body),
    )
        .into_response())
}

/// Checks request bounds before anything is sent upstream; returns `max_tokens` as sent to Ollama.
pub fn validate(req: &ChatRequest, max_tokens_limit: u32) -> Result<u32, AppError> {
    if req.messages.is_empty() {
        return Err(AppError::Validation("messages must not be empty".to_string()));
    }

    if !(0.0..=1.0).contains(&req.temperature) {
        return Err(AppError::Validation(format!(
            "temperature must be between 0 and 1, got {}",
            req.temperature
        )));
    }

    match u32::try_from(req.max_tokens) {
        Ok(n) if n > 0 && n <= max_tokens_limit => Ok(n),
        _ => Err(AppError::Validation(format!(
            "max_tokens must be between 1 and {max_tokens_limit}, got {}",
            req.max_tokens
        ))),
    }
}
