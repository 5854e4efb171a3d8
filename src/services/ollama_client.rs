//! Ollama API client used by the relay.
//!
//! Talks to `GET /api/tags` and `POST /api/chat`, either buffered
//! (`stream=false`, bounded by a timeout) or streaming (`stream=true`,
//! newline-delimited JSON decoded incrementally, no overall timeout).

use std::{collections::VecDeque, pin::Pin, time::Duration};

use futures_util::{Stream, StreamExt, stream};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};

use super::ndjson::{LineDecoder, StreamEvent};
use crate::{error::ClientError, message::Message};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "tinyllama:latest";

/// Bounded wait for the buffered chat call.
pub const DEFAULT_CHAT_TIMEOUT: Duration = Duration::from_secs(60);

/// Bounded wait for the model inventory behind `/health`.
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Ordered, finite sequence of content fragments from one upstream response.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ClientError>> + Send>>;

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    chat_timeout: Duration,
    health_timeout: Duration,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, model, DEFAULT_CHAT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: &str,
        model: &str,
        chat_timeout: Duration,
    ) -> Result<Self, ClientError> {
        // No client-wide timeout: it would also cut off long-running streams.
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ClientError::UpstreamError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            chat_timeout,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
        })
    }

    pub fn with_health_timeout(mut self, health_timeout: Duration) -> Self {
        self.health_timeout = health_timeout;
        self
    }

    /// Same connection pool, different target model.
    pub fn with_model(&self, model: impl Into<String>) -> Self {
        Self { model: model.into(), ..self.clone() }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn chat_timeout(&self) -> Duration {
        self.chat_timeout
    }

    pub fn health_timeout(&self) -> Duration {
        self.health_timeout
    }

    /// Names of the models installed upstream, in inventory order.
    /// An upstream that stalls past the health timeout counts as unavailable.
    pub async fn list_models(&self) -> Result<Vec<String>, ClientError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .timeout(self.health_timeout)
            .send()
            .await
            .map_err(|e| ClientError::UpstreamUnavailable(format!("failed to list models: {e}")))?;

        if !response.status().is_success() {
            let detail = error_detail(response).await;
            return Err(ClientError::UpstreamUnavailable(format!(
                "failed to list models: {detail}"
            )));
        }

        let tags: TagsResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::UpstreamUnavailable(format!("failed to list models: {e}"))
            } else {
                ClientError::UpstreamError(format!("malformed model list: {e}"))
            }
        })?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Buffered chat: returns the whole assistant reply at once.
    pub async fn chat(
        &self,
        messages: &[Message],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, ClientError> {
        let timeout = self.chat_timeout;
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .timeout(timeout)
            .json(&self.chat_body(messages, temperature, max_tokens, false))
            .send()
            .await
            .map_err(|e| ClientError::from_send(e, Some(timeout)))?;

        if !response.status().is_success() {
            return Err(ClientError::UpstreamError(error_detail(response).await));
        }

        let chunk: OllamaChatChunk = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::Timeout(timeout)
            } else {
                ClientError::UpstreamError(format!("malformed chat response: {e}"))
            }
        })?;

        if let Some(err) = chunk.error {
            return Err(ClientError::UpstreamError(err));
        }

        Ok(chunk.message.and_then(|m| m.content).unwrap_or_default())
    }

    /// Streaming chat. Fails up front only if the request cannot be started;
    /// later failures arrive as the final `Err` item of the stream.
    pub async fn chat_stream(
        &self,
        messages: &[Message],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<FragmentStream, ClientError> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&self.chat_body(messages, temperature, max_tokens, true))
            .send()
            .await
            .map_err(|e| ClientError::from_send(e, None))?;

        if !response.status().is_success() {
            return Err(ClientError::UpstreamError(error_detail(response).await));
        }

        Ok(decode_fragments(response))
    }

    fn chat_body<'a>(
        &'a self,
        messages: &'a [Message],
        temperature: f32,
        max_tokens: u32,
        stream: bool,
    ) -> OllamaChatRequest<'a> {
        OllamaChatRequest {
            model: &self.model,
            messages,
            options: ChatOptions { temperature, num_predict: max_tokens },
            stream,
        }
    }
}

struct DecodeState<S> {
    body: S,
    decoder: LineDecoder,
    ready: VecDeque<Result<String, ClientError>>,
    finished: bool,
}

fn decode_fragments(response: Response) -> FragmentStream {
    let state = DecodeState {
        body: Box::pin(response.bytes_stream()),
        decoder: LineDecoder::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.ready.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }

            match st.body.next().await {
                Some(Ok(bytes)) => {
                    for event in st.decoder.push(bytes.as_ref()) {
                        if st.enqueue(event) {
                            break;
                        }
                    }
                }
                Some(Err(e)) => {
                    st.finished = true;
                    st.ready.push_back(Err(ClientError::StreamTransport(e.to_string())));
                }
                None => {
                    st.finished = true;
                    if let Some(event) = st.decoder.finish() {
                        st.enqueue(event);
                    }
                }
            }
        }
    }))
}

impl<S> DecodeState<S> {
    /// Queue one decoded event; returns true once the stream has been failed.
    fn enqueue(&mut self, event: StreamEvent) -> bool {
        match event {
            StreamEvent::Fragment(text) => {
                self.ready.push_back(Ok(text));
                false
            }
            StreamEvent::Failed(err) => {
                self.finished = true;
                self.ready.push_back(Err(ClientError::UpstreamError(err)));
                true
            }
        }
    }
}

async fn error_detail(response: Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|b| b.error)
        .unwrap_or(text);
    if message.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {message}")
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    options: ChatOptions,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

/// One `/api/chat` object: the whole buffered reply, or one streamed line.
#[derive(Debug, Deserialize)]
pub(crate) struct OllamaChatChunk {
    #[serde(default)]
    pub message: Option<ChunkMessage>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChunkMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}
