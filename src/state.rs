// src/state.rs
use std::sync::Arc;

use crate::config::RelayConfig;
use crate::error::ClientError;
use crate::services::ollama_client::OllamaClient;

pub type SharedState = Arc<AppState>;

/// Per-process relay state. Read-only after startup; requests share nothing mutable.
pub struct AppState {
    pub ollama: OllamaClient,
    pub config: RelayConfig,
}

impl AppState {
    pub fn new(config: RelayConfig) -> Result<Self, ClientError> {
        let ollama = OllamaClient::with_timeout(
            &config.ollama_host,
            &config.default_model,
            config.chat_timeout,
        )?
        .with_health_timeout(config.health_timeout);
        Ok(Self { ollama, config })
    }

    pub fn shared(self) -> SharedState {
        Arc::new(self)
    }
}
