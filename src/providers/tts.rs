//! Text-to-speech provider: synthesizes a short text span to PCM audio.
//!
//! Negotiates `model=aura-class, encoding=linear16, sample_rate=24000` and
//! returns raw PCM bytes for the caller to base64-encode onto the client
//! channel.

use crate::error::ProxyError;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;

#[async_trait]
pub trait TtsGateway: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
}

pub struct HttpTtsGateway {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpTtsGateway {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, model: &str) -> Self {
        let endpoint = format!(
            "{}?model={model}&encoding=linear16&sample_rate=24000",
            endpoint.into(),
        );
        Self { client: reqwest::Client::new(), endpoint, api_key: api_key.into() }
    }
}

#[async_trait]
impl TtsGateway for HttpTtsGateway {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        if text.trim().is_empty() {
            bail!("cannot synthesize empty text");
        }

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Token {}", self.api_key))
            .json(&SynthesizeRequest { text })
            .send()
            .await
            .context("failed to send TTS request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProxyError::TtsProviderError(format!("{status}: {body}")).into());
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProxyError::TtsProviderError(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Deterministic gateway for tests: returns a fixed number of silent PCM
/// bytes proportional to the span's length, so tests can assert ordering and
/// cancellation without a real provider.
pub struct FakeTtsGateway;

#[async_trait]
impl TtsGateway for FakeTtsGateway {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        Ok(vec![0u8; text.len() * 2])
    }
}

/// Test gateway that fails synthesis for any span containing `fail_marker`,
/// so a test can pin down exactly which span errors without depending on
/// concurrent-task completion order.
pub struct FlakyTtsGateway {
    fail_marker: String,
}

impl FlakyTtsGateway {
    pub fn new(fail_marker: impl Into<String>) -> Self {
        Self { fail_marker: fail_marker.into() }
    }
}

#[async_trait]
impl TtsGateway for FlakyTtsGateway {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        if text.contains(&self.fail_marker) {
            return Err(ProxyError::TtsProviderError("synthetic failure for test span".into()).into());
        }
        Ok(vec![0u8; text.len() * 2])
    }
}
