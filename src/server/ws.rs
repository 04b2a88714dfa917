//! Client channel: the browser-facing WebSocket.
//!
//! Binary frames are raw PCM forwarded to the STT gateway; text frames are
//! JSON control messages. A single writer task drains a bounded mpsc channel
//! so outbound frames stay totally ordered no matter which task produced
//! them (client reader, STT reader, or a generation pipeline).

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::ProxyError;
use crate::providers::{SttEvent, SttGateway};
use crate::server::ServerState;
use crate::session::{SessionSupervisor, SupervisorEvent};

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "interrupt_signal")]
    Interrupt,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "transcript")]
    Transcript { text: String, #[serde(rename = "isFinal")] is_final: bool, sender: String },
    #[serde(rename = "audio")]
    Audio { data: String },
    #[serde(rename = "response_complete")]
    ResponseComplete,
    #[serde(rename = "error")]
    Error { message: String },
    #[serde(rename = "status")]
    Status { state: String },
}

/// An outbound frame, tagged only for readability at the call site — the
/// producer already chose `send().await` (blocking, for frames that must
/// never be dropped) or `try_send()` (best-effort, dropped under
/// backpressure) before wrapping the message.
pub struct OutboundFrame(pub ServerMessage);

impl OutboundFrame {
    pub fn critical(message: ServerMessage) -> Self {
        Self(message)
    }
    pub fn best_effort(message: ServerMessage) -> Self {
        Self(message)
    }
}

const OUTBOUND_QUEUE_CAPACITY: usize = 64;
const STT_BACKOFF_START: Duration = Duration::from_millis(250);
const STT_BACKOFF_CAP: Duration = Duration::from_secs(4);
const STT_MAX_ATTEMPTS: u32 = 5;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> Response {
    ws.on_upgrade(|socket| handle_session(socket, state))
}

async fn handle_session(ws: WebSocket, state: ServerState) {
    info!("voice session connected");
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (client_tx, mut client_rx) = mpsc::channel::<OutboundFrame>(OUTBOUND_QUEUE_CAPACITY);
    let writer_task = tokio::spawn(async move {
        while let Some(frame) = client_rx.recv().await {
            let text = match serde_json::to_string(&frame.0) {
                Ok(t) => t,
                Err(e) => {
                    warn!("failed to serialize outbound frame: {}", e);
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                debug!("{}", ProxyError::ClientGone);
                break;
            }
        }
    });

    let (event_tx, event_rx) = mpsc::channel::<SupervisorEvent>(256);
    let (audio_tx, audio_rx) = mpsc::channel::<Vec<u8>>(256);

    tokio::spawn(spawn_stt_reader(state.stt_gateway.clone(), audio_rx, event_tx.clone()));

    let supervisor = SessionSupervisor::new(
        state.config.llm_model.clone(),
        state.llm_gateway.clone(),
        state.tts_gateway.clone(),
        client_tx.clone(),
        event_tx.clone(),
        state.config.provider_timeout,
        state.config.quiet_duration(),
    );
    let supervisor_task = tokio::spawn(supervisor.drive(event_rx));

    while let Some(Ok(msg)) = ws_rx.next().await {
        match msg {
            Message::Binary(data) => {
                if audio_tx.send(data.into()).await.is_err() {
                    break;
                }
            }
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Interrupt) => {
                    if event_tx.send(SupervisorEvent::Interrupt).await.is_err() {
                        break;
                    }
                }
                Err(e) => debug!("{}", ProxyError::ProtocolError(e.to_string())),
            },
            Message::Close(_) => {
                info!("voice session disconnected");
                break;
            }
            _ => {}
        }
    }

    drop(audio_tx);
    drop(event_tx);
    let _ = supervisor_task.await;
    writer_task.abort();
}

/// Owns the STT provider connection: forwards client audio in, turns
/// recognition events into [`SupervisorEvent`]s out, and reconnects with
/// capped exponential backoff on connection loss.
async fn spawn_stt_reader(
    gateway: Arc<dyn SttGateway>,
    mut audio_rx: mpsc::Receiver<Vec<u8>>,
    event_tx: mpsc::Sender<SupervisorEvent>,
) {
    let mut attempt = 0u32;
    let mut backoff = STT_BACKOFF_START;

    loop {
        let mut session = match gateway.connect().await {
            Ok(session) => {
                attempt = 0;
                backoff = STT_BACKOFF_START;
                session
            }
            Err(e) => {
                attempt += 1;
                warn!("STT connection attempt {} failed: {}", attempt, e);
                if attempt >= STT_MAX_ATTEMPTS {
                    let _ = event_tx.send(SupervisorEvent::SttUnavailable).await;
                    return;
                }
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(STT_BACKOFF_CAP);
                continue;
            }
        };

        loop {
            tokio::select! {
                audio = audio_rx.recv() => {
                    match audio {
                        Some(pcm) => {
                            if let Err(e) = session.send_audio(&pcm).await {
                                warn!("STT send error: {}", e);
                                break;
                            }
                        }
                        None => return, // client channel closed, session teardown
                    }
                }
                event = session.next_event() => {
                    match event {
                        Ok(Some(SttEvent::Interim(text))) => {
                            if event_tx.send(SupervisorEvent::SttInterim(text)).await.is_err() {
                                return;
                            }
                        }
                        Ok(Some(SttEvent::Final(text))) => {
                            if event_tx.send(SupervisorEvent::SttFinal(text)).await.is_err() {
                                return;
                            }
                        }
                        Ok(None) => {
                            warn!("STT provider closed the stream");
                            break;
                        }
                        Err(e) => {
                            warn!("STT provider error: {}", e);
                            break;
                        }
                    }
                }
            }
        }
        // fell out of the inner loop due to a connection problem; retry the outer loop
    }
}
