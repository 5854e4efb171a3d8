//! One interactive chat session: settings, history and the relay it talks to.

use futures_util::StreamExt;

use super::{
    conversation::Conversation,
    relay_client::{Readiness, RelayClient},
};
use crate::{
    error::ClientError,
    message::{ChatRequest, Message},
};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

#[derive(Clone, Debug)]
pub struct Settings {
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: i64,
    /// `None` lets the relay use its default model.
    pub model: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            temperature: 0.7,
            max_tokens: 512,
            model: None,
        }
    }
}

pub struct ChatSession {
    relay: RelayClient,
    conversation: Conversation,
    settings: Settings,
    readiness: Readiness,
}

impl ChatSession {
    pub fn new(relay: RelayClient, settings: Settings) -> Self {
        Self {
            relay,
            conversation: Conversation::new(),
            settings,
            readiness: Readiness::default(),
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn is_ready(&self) -> bool {
        self.readiness.ready
    }

    pub fn models(&self) -> &[String] {
        &self.readiness.models
    }

    /// Poll `/health`. When the chosen model is unset or no longer offered,
    /// fall back to the first one the relay reports.
    pub async fn refresh(&mut self) -> &Readiness {
        self.readiness = self.relay.health().await;

        let known = self
            .settings
            .model
            .as_ref()
            .is_some_and(|m| self.readiness.models.contains(m));
        if self.readiness.ready && !known {
            self.settings.model = self.readiness.models.first().cloned();
        }

        &self.readiness
    }

    /// Pick one of the models from the last health poll.
    pub fn select_model(&mut self, name: &str) -> bool {
        if self.readiness.models.iter().any(|m| m == name) {
            self.settings.model = Some(name.to_string());
            true
        } else {
            false
        }
    }

    pub fn request_for(&self, prompt: &str) -> ChatRequest {
        ChatRequest {
            messages: self.outgoing(prompt),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            model: self.settings.model.clone(),
        }
    }

    fn outgoing(&self, prompt: &str) -> Vec<Message> {
        self.conversation.outgoing(&self.settings.system_prompt, prompt)
    }

    /// Stream one turn through the relay. `on_fragment` receives each fragment
    /// and the reply so far. History changes only if the stream completes.
    pub async fn send_turn<F>(&mut self, prompt: &str, mut on_fragment: F) -> Result<String, ClientError>
    where
        F: FnMut(&str, &str),
    {
        let request = self.request_for(prompt);
        let mut fragments = self.relay.chat_stream(&request).await?;

        let mut reply = String::new();
        while let Some(fragment) = fragments.next().await {
            let fragment = fragment?;
            reply.push_str(&fragment);
            on_fragment(&fragment, &reply);
        }

        self.conversation.record_turn(prompt, reply.clone());
        Ok(reply)
    }

    pub fn reset(&mut self) {
        self.conversation.reset();
    }
}
