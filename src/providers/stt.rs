//! Streaming speech-to-text provider.
//!
//! Negotiates `model=nova-class, language=en-US, smart_format=on,
//! interim_results=on, utterance_end_ms=1000, endpointing=500ms,
//! encoding=linear16, sample_rate=16000` and forwards audio verbatim over a
//! persistent WebSocket, the same `tokio-tungstenite` transport the rest of
//! this crate uses for its own client-facing socket.

use crate::error::ProxyError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message as WsMessage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SttEvent {
    Interim(String),
    Final(String),
}

/// A live recognition connection: forward audio in, read events out.
#[async_trait]
pub trait SttSession: Send {
    async fn send_audio(&mut self, pcm: &[u8]) -> Result<()>;
    /// Returns `None` once the provider closes the stream.
    async fn next_event(&mut self) -> Result<Option<SttEvent>>;
}

/// Opens recognition sessions against the STT provider.
#[async_trait]
pub trait SttGateway: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn SttSession>>;
}

#[derive(Debug, Deserialize)]
struct ProviderFrame {
    #[serde(default)]
    is_final: bool,
    channel: Option<ProviderChannel>,
}

#[derive(Debug, Deserialize)]
struct ProviderChannel {
    alternatives: Vec<ProviderAlternative>,
}

#[derive(Debug, Deserialize)]
struct ProviderAlternative {
    transcript: String,
}

pub struct WsSttGateway {
    endpoint: String,
    api_key: String,
}

impl WsSttGateway {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, model: &str) -> Self {
        let endpoint = format!(
            "{}?model={model}&language=en-US&smart_format=true&interim_results=true\
             &utterance_end_ms=1000&endpointing=500&encoding=linear16&sample_rate=16000",
            endpoint.into(),
        );
        Self { endpoint, api_key: api_key.into() }
    }
}

#[async_trait]
impl SttGateway for WsSttGateway {
    async fn connect(&self) -> Result<Box<dyn SttSession>> {
        let request = tokio_tungstenite::tungstenite::http::Request::builder()
            .uri(&self.endpoint)
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Host", "stt-provider")
            .header("Sec-WebSocket-Version", "13")
            .header("Sec-WebSocket-Key", tokio_tungstenite::tungstenite::handshake::client::generate_key())
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .body(())
            .context("building STT connection request")?;

        let (stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| ProxyError::SttProviderError(e.to_string()))?;

        Ok(Box::new(WsSttSession { stream }))
    }
}

struct WsSttSession {
    stream: tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
}

#[async_trait]
impl SttSession for WsSttSession {
    async fn send_audio(&mut self, pcm: &[u8]) -> Result<()> {
        self.stream
            .send(WsMessage::Binary(pcm.to_vec().into()))
            .await
            .map_err(|e| ProxyError::SttProviderError(e.to_string()))?;
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<SttEvent>> {
        loop {
            let Some(msg) = self.stream.next().await else { return Ok(None) };
            let msg = msg.map_err(|e| ProxyError::SttProviderError(e.to_string()))?;
            let text = match msg {
                WsMessage::Text(t) => t,
                WsMessage::Close(_) => return Ok(None),
                _ => continue,
            };
            let Ok(frame) = serde_json::from_str::<ProviderFrame>(&text) else { continue };
            let Some(transcript) = frame
                .channel
                .and_then(|c| c.alternatives.into_iter().next())
                .map(|a| a.transcript)
            else {
                continue;
            };
            if transcript.is_empty() {
                continue;
            }
            return Ok(Some(if frame.is_final {
                SttEvent::Final(transcript)
            } else {
                SttEvent::Interim(transcript)
            }));
        }
    }
}

/// Scripted gateway for tests: a fixed queue of events, audio input ignored.
pub struct FakeSttGateway {
    events: Mutex<VecDeque<SttEvent>>,
}

impl FakeSttGateway {
    pub fn new(events: impl IntoIterator<Item = SttEvent>) -> Self {
        Self { events: Mutex::new(events.into_iter().collect()) }
    }
}

#[async_trait]
impl SttGateway for FakeSttGateway {
    async fn connect(&self) -> Result<Box<dyn SttSession>> {
        let events = self.events.lock().await.clone();
        Ok(Box::new(FakeSttSession { events }))
    }
}

struct FakeSttSession {
    events: VecDeque<SttEvent>,
}

#[async_trait]
impl SttSession for FakeSttSession {
    async fn send_audio(&mut self, _pcm: &[u8]) -> Result<()> {
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<SttEvent>> {
        Ok(self.events.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_session_replays_scripted_events_in_order() {
        let gateway = FakeSttGateway::new([
            SttEvent::Interim("hel".into()),
            SttEvent::Final("hello".into()),
        ]);
        let mut session = gateway.connect().await.unwrap();
        assert_eq!(session.next_event().await.unwrap(), Some(SttEvent::Interim("hel".into())));
        assert_eq!(session.next_event().await.unwrap(), Some(SttEvent::Final("hello".into())));
        assert_eq!(session.next_event().await.unwrap(), None);
    }
}
