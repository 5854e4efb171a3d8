// src/config.rs
use std::{net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{Context, Result};

use crate::services::ollama_client::{
    DEFAULT_CHAT_TIMEOUT, DEFAULT_HEALTH_TIMEOUT, DEFAULT_MODEL, DEFAULT_OLLAMA_URL,
};

pub const DEFAULT_RELAY_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_MAX_TOKENS_LIMIT: u32 = 8192;

/// Immutable relay settings, read once at startup.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub ollama_host: String,
    pub default_model: String,
    pub bind_addr: SocketAddr,
    pub chat_timeout: Duration,
    pub health_timeout: Duration,
    pub max_tokens_limit: u32,
}

impl RelayConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr: SocketAddr = parse_var(&get, "RELAY_ADDR", DEFAULT_RELAY_ADDR)?;
        let chat_timeout_secs: u64 =
            parse_var(&get, "CHAT_TIMEOUT_SECS", &DEFAULT_CHAT_TIMEOUT.as_secs().to_string())?;
        let health_timeout_secs: u64 = parse_var(
            &get,
            "HEALTH_TIMEOUT_SECS",
            &DEFAULT_HEALTH_TIMEOUT.as_secs().to_string(),
        )?;
        let max_tokens_limit: u32 =
            parse_var(&get, "MAX_TOKENS_LIMIT", &DEFAULT_MAX_TOKENS_LIMIT.to_string())?;

        anyhow::ensure!(chat_timeout_secs > 0, "CHAT_TIMEOUT_SECS must be positive");
        anyhow::ensure!(health_timeout_secs > 0, "HEALTH_TIMEOUT_SECS must be positive");
        anyhow::ensure!(max_tokens_limit > 0, "MAX_TOKENS_LIMIT must be positive");

        Ok(Self {
            ollama_host: get("OLLAMA_HOST").unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            default_model: get("OLLAMA_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            bind_addr,
            chat_timeout: Duration::from_secs(chat_timeout_secs),
            health_timeout: Duration::from_secs(health_timeout_secs),
            max_tokens_limit,
        })
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            ollama_host: DEFAULT_OLLAMA_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            chat_timeout: DEFAULT_CHAT_TIMEOUT,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
            max_tokens_limit: DEFAULT_MAX_TOKENS_LIMIT,
        }
    }
}

fn parse_var<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = get(key).unwrap_or_else(|| default.to_string());
    raw.trim()
        .parse()
        .with_context(|| format!("invalid value for {key}: {raw:?}"))
}
