//! Chat relay between a terminal client and a local Ollama server.
//!
//! The relay (`routes`) proxies `/chat` to Ollama's `/api/chat`, either as one
//! JSON reply or as a chunked text stream, and reports upstream health. The
//! client side (`services::chat_session`) keeps the conversation and re-sends
//! it on every turn, since the upstream keeps no state between requests.

pub mod config;
pub mod error;
pub mod message;
pub mod routes;
pub mod services;
pub mod state;

use tracing_subscriber::EnvFilter;

/// Install the `fmt` subscriber, honouring `RUST_LOG` when set.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
