//! HTTP client for the relay, used by the interactive chat CLI.

use std::time::Duration;

use futures_util::{StreamExt, stream};
use reqwest::{Client, Response};
use serde_json::Value;

use super::ollama_client::FragmentStream;
use crate::{
    error::ClientError,
    message::{ChatRequest, ChatResponse, HealthResponse},
};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const CHAT_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of a health poll. Failures are folded into `ready: false`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Readiness {
    pub ready: bool,
    pub models: Vec<String>,
    pub detail: Option<String>,
}

#[derive(Clone, Debug)]
pub struct RelayClient {
    client: Client,
    base_url: String,
}

impl RelayClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ClientError::UpstreamError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Readiness {
        let response = match self
            .client
            .get(format!("{}/health", self.base_url))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(error = %e, "relay health check failed");
                return Readiness {
                    detail: Some(format!("cannot reach relay at {}: {e}", self.base_url)),
                    ..Readiness::default()
                };
            }
        };

        let status = response.status();
        match response.json::<HealthResponse>().await {
            Ok(body) if status.is_success() => Readiness {
                ready: body.status == "healthy",
                models: body.models,
                detail: body.error,
            },
            Ok(body) => Readiness {
                detail: Some(body.error.unwrap_or_else(|| format!("relay returned {status}"))),
                ..Readiness::default()
            },
            Err(e) => Readiness {
                detail: Some(format!("unreadable health response ({status}): {e}")),
                ..Readiness::default()
            },
        }
    }

    /// Buffered variant of `/chat`.
    pub async fn chat(&self, request: &ChatRequest) -> Result<String, ClientError> {
        let response = self
            .client
            .post(format!("{}/chat", self.base_url))
            .timeout(CHAT_TIMEOUT)
            .json(request)
            .send()
            .await
            .map_err(|e| ClientError::from_send(e, Some(CHAT_TIMEOUT)))?;

        if !response.status().is_success() {
            return Err(relay_error(response).await);
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ClientError::UpstreamError(format!("malformed relay response: {e}")))?;
        Ok(body.response)
    }

    /// Streaming variant of `/chat`. Consumers should stop at the first `Err`.
    pub async fn chat_stream(&self, request: &ChatRequest) -> Result<FragmentStream, ClientError> {
        let response = self
            .client
            .post(format!("{}/chat?stream=true", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(|e| ClientError::from_send(e, None))?;

        if !response.status().is_success() {
            return Err(relay_error(response).await);
        }

        let body = Box::pin(response.bytes_stream());
        let fragments = stream::unfold(
            (body, Utf8Buffer::default(), false),
            |(mut body, mut utf8, finished)| async move {
                if finished {
                    return None;
                }
                loop {
                    match body.next().await {
                        Some(Ok(bytes)) => {
                            let text = utf8.push(&bytes);
                            if !text.is_empty() {
                                return Some((Ok(text), (body, utf8, false)));
                            }
                        }
                        Some(Err(e)) => {
                            let err = ClientError::StreamTransport(e.to_string());
                            return Some((Err(err), (body, utf8, true)));
                        }
                        None => {
                            let tail = utf8.finish();
                            if tail.is_empty() {
                                return None;
                            }
                            tracing::debug!("relay stream ended inside a UTF-8 sequence");
                            return Some((Ok(tail), (body, utf8, true)));
                        }
                    }
                }
            },
        );

        Ok(fragments.boxed())
    }
}

/// Rebuild the relay's error from its `{"error":{"kind","message"}}` body so
/// callers can tell a rejected request from a failing upstream.
async fn relay_error(response: Response) -> ClientError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let body = serde_json::from_str::<Value>(&text).ok();
    let kind = body
        .as_ref()
        .and_then(|v| v["error"]["kind"].as_str())
        .unwrap_or_default()
        .to_string();
    let message = body
        .as_ref()
        .and_then(|v| v["error"]["message"].as_str())
        .map(str::to_string)
        .unwrap_or(text);
    let detail = format!("HTTP {status}: {message}");

    match kind.as_str() {
        "validation_error" => ClientError::Rejected(detail),
        "upstream_unavailable" => ClientError::UpstreamUnavailable(detail),
        _ => ClientError::UpstreamError(detail),
    }
}

/// Holds back an incomplete trailing UTF-8 sequence until the next chunk completes it.
#[derive(Debug, Default)]
struct Utf8Buffer {
    pending: Vec<u8>,
}

impl Utf8Buffer {
    fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => self.pending.len(),
        };
        let out = String::from_utf8_lossy(&self.pending[..valid]).into_owned();
        self.pending.drain(..valid);
        out
    }

    /// Whatever is still held back once the body ends, decoded lossily.
    fn finish(&mut self) -> String {
        let out = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        out
    }
}
