// src/services/mod.rs
pub mod chat_session;
pub mod conversation;
pub mod ndjson;
pub mod ollama_client;
pub mod relay_client;
