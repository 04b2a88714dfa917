//! LLM chat provider client.
//!
//! Streams token-level chunks over SSE, the same parsing shape as an
//! OpenAI-compatible `/chat/completions` endpoint: buffer response bytes,
//! split on blank lines, strip the `data: ` prefix, stop at `[DONE]`.

use crate::error::ProxyError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

/// One turn of chat history, role plus plain text.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl ChatTurn {
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: Role::System, text: text.into() }
    }
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into() }
    }
    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, text: text.into() }
    }
}

/// Streams a chat completion, invoking `on_token` for every text chunk.
///
/// `on_token` returns `false` to request early termination (a generation was
/// cancelled); the implementation must stop reading the upstream stream as
/// soon as that happens rather than draining it to completion.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn stream_chat(
        &self,
        model: &str,
        history: &[ChatTurn],
        on_token: &mut (dyn FnMut(&str) -> bool + Send),
    ) -> Result<()>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct StreamResponse {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: Delta,
}

#[derive(Deserialize)]
struct Delta {
    content: Option<String>,
}

/// HTTP client for an OpenAI-compatible chat completions endpoint.
pub struct HttpLlmGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpLlmGateway {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl LlmGateway for HttpLlmGateway {
    async fn stream_chat(
        &self,
        model: &str,
        history: &[ChatTurn],
        on_token: &mut (dyn FnMut(&str) -> bool + Send),
    ) -> Result<()> {
        use futures_util::StreamExt;

        let messages: Vec<WireMessage> = history
            .iter()
            .map(|t| WireMessage { role: t.role.as_str(), content: &t.text })
            .collect();

        let request = ChatRequest { model, messages, stream: true };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .context("failed to send streaming request to LLM provider")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProxyError::LlmProviderError(format!("{status}: {body}")).into());
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        'outer: while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ProxyError::LlmProviderError(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = buffer.find("\n\n") {
                let event = buffer[..pos].to_string();
                buffer.drain(..pos + 2);

                for line in event.lines() {
                    let Some(data) = line.strip_prefix("data: ") else { continue };
                    if data == "[DONE]" {
                        continue;
                    }
                    if let Ok(resp) = serde_json::from_str::<StreamResponse>(data) {
                        if let Some(content) = resp.choices.first().and_then(|c| c.delta.content.as_deref()) {
                            if !on_token(content) {
                                break 'outer;
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

/// Scripted gateway for tests: yields a fixed token sequence, optionally
/// pausing between tokens so a test can observe (and cancel) a generation
/// while it is still in flight.
pub struct FakeLlmGateway {
    tokens: Mutex<VecDeque<String>>,
    delay: Option<std::time::Duration>,
}

impl FakeLlmGateway {
    pub fn new(tokens: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { tokens: Mutex::new(tokens.into_iter().map(Into::into).collect()), delay: None }
    }

    pub fn with_delay(
        tokens: impl IntoIterator<Item = impl Into<String>>,
        delay: std::time::Duration,
    ) -> Self {
        Self { tokens: Mutex::new(tokens.into_iter().map(Into::into).collect()), delay: Some(delay) }
    }
}

#[async_trait]
impl LlmGateway for FakeLlmGateway {
    async fn stream_chat(
        &self,
        _model: &str,
        _history: &[ChatTurn],
        on_token: &mut (dyn FnMut(&str) -> bool + Send),
    ) -> Result<()> {
        let mut tokens = self.tokens.lock().unwrap().clone();
        while let Some(token) = tokens.pop_front() {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if !on_token(&token) {
                return Ok(());
            }
        }
        Ok(())
    }
}
