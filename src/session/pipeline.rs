//! Generation pipeline: streams one LLM turn, fans tokens out to TTS, and
//! releases synthesized audio back to the client in LLM-token order.
//!
//! Cancellation is a plain `AtomicU64` compare: every task spawned under
//! generation `G` checks `active_token.load() == G` before it does anything
//! observable (emit a transcript chunk, send synthesized audio). Bumping the
//! atomic is the entire cancellation signal — O(1) and non-blocking for the
//! canceller, per the concurrency model.

use crate::error::ProxyError;
use crate::providers::{LlmGateway, TtsGateway};
use crate::session::chat::ChatTurn;
use crate::server::ws::{OutboundFrame, ServerMessage};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::warn;

/// Maximum span size (chars) before a forced flush, per the bounded
/// aggregation window in the TTS gateway design.
const SPAN_FLUSH_CHARS: usize = 80;
/// Caps how many TTS synthesis calls run concurrently for one generation.
const TTS_CONCURRENCY: usize = 4;

pub struct GenerationOutcome {
    pub token: u64,
    pub full_text: String,
    pub error: Option<String>,
}

#[allow(clippy::too_many_arguments)]
pub fn spawn(
    token: u64,
    active_token: Arc<AtomicU64>,
    llm: Arc<dyn LlmGateway>,
    tts: Arc<dyn TtsGateway>,
    model: String,
    history: Vec<ChatTurn>,
    client_tx: mpsc::Sender<OutboundFrame>,
    outcome_tx: mpsc::Sender<GenerationOutcome>,
    provider_timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        run(token, active_token, llm, tts, model, history, client_tx, outcome_tx, provider_timeout).await;
    })
}

#[allow(clippy::too_many_arguments)]
async fn run(
    token: u64,
    active_token: Arc<AtomicU64>,
    llm: Arc<dyn LlmGateway>,
    tts: Arc<dyn TtsGateway>,
    model: String,
    history: Vec<ChatTurn>,
    client_tx: mpsc::Sender<OutboundFrame>,
    outcome_tx: mpsc::Sender<GenerationOutcome>,
    provider_timeout: Duration,
) {
    let is_current = |t: &Arc<AtomicU64>| t.load(Ordering::Acquire) == token;

    let (span_tx, span_rx) = mpsc::channel::<(u64, Vec<u8>)>(32);
    let drain_handle = spawn_reorder_drain(token, active_token.clone(), client_tx.clone(), span_rx);

    let semaphore = Arc::new(Semaphore::new(TTS_CONCURRENCY));
    let mut aggregator = SpanAggregator::new();
    let mut next_seq: u64 = 0;
    let mut full_text = String::new();

    let mut spawn_span = |seq: u64, text: String| {
        spawn_tts_span(seq, text, token, active_token.clone(), tts.clone(), semaphore.clone(), span_tx.clone());
    };

    let stream_result = tokio::time::timeout(
        provider_timeout,
        llm.stream_chat(&model, &history, &mut |chunk: &str| {
            if !is_current(&active_token) {
                return false;
            }
            full_text.push_str(chunk);
            let client_tx = client_tx.clone();
            let frame = ServerMessage::Transcript { text: chunk.to_string(), is_final: false, sender: "ai".into() };
            let _ = client_tx.try_send(OutboundFrame::best_effort(frame));
            for span in aggregator.push(chunk) {
                let seq = next_seq;
                next_seq += 1;
                spawn_span(seq, span);
            }
            true
        }),
    )
    .await;

    if let Some(span) = aggregator.flush() {
        spawn_span(next_seq, span);
    }
    drop(span_tx);
    let _ = drain_handle.await;

    if !is_current(&active_token) {
        return;
    }

    match stream_result {
        Ok(Ok(())) => {
            let _ = client_tx.send(OutboundFrame::critical(ServerMessage::ResponseComplete)).await;
            let _ = outcome_tx.send(GenerationOutcome { token, full_text, error: None }).await;
        }
        Ok(Err(e)) => {
            let err = ProxyError::LlmProviderError(e.to_string());
            warn!("{}", err);
            let _ = client_tx
                .send(OutboundFrame::critical(ServerMessage::Error { message: err.to_string() }))
                .await;
            let _ = outcome_tx.send(GenerationOutcome { token, full_text, error: Some(err.to_string()) }).await;
        }
        Err(_) => {
            let err = ProxyError::Timeout(provider_timeout);
            warn!("{}", err);
            let _ = client_tx
                .send(OutboundFrame::critical(ServerMessage::Error { message: err.to_string() }))
                .await;
            let _ = outcome_tx.send(GenerationOutcome { token, full_text, error: Some(err.to_string()) }).await;
        }
    }
}

fn spawn_reorder_drain(
    token: u64,
    active_token: Arc<AtomicU64>,
    client_tx: mpsc::Sender<OutboundFrame>,
    mut span_rx: mpsc::Receiver<(u64, Vec<u8>)>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut pending: BTreeMap<u64, Vec<u8>> = BTreeMap::new();
        let mut next_to_emit: u64 = 0;
        while let Some((seq, audio)) = span_rx.recv().await {
            pending.insert(seq, audio);
            while let Some(audio) = pending.remove(&next_to_emit) {
                next_to_emit += 1;
                if audio.is_empty() || active_token.load(Ordering::Acquire) != token {
                    continue;
                }
                use base64::Engine;
                let data = base64::engine::general_purpose::STANDARD.encode(&audio);
                let _ = client_tx.try_send(OutboundFrame::best_effort(ServerMessage::Audio { data }));
            }
        }
    })
}

fn spawn_tts_span(
    seq: u64,
    text: String,
    token: u64,
    active_token: Arc<AtomicU64>,
    tts: Arc<dyn TtsGateway>,
    semaphore: Arc<Semaphore>,
    span_tx: mpsc::Sender<(u64, Vec<u8>)>,
) {
    tokio::spawn(async move {
        let Ok(_permit) = semaphore.acquire_owned().await else { return };
        if active_token.load(Ordering::Acquire) != token {
            let _ = span_tx.send((seq, Vec::new())).await;
            return;
        }
        let audio = match tts.synthesize(&text).await {
            Ok(audio) if active_token.load(Ordering::Acquire) == token => audio,
            Ok(_) => Vec::new(),
            Err(e) => {
                warn!("{}", ProxyError::TtsProviderError(e.to_string()));
                Vec::new()
            }
        };
        let _ = span_tx.send((seq, audio)).await;
    });
}

/// Aggregates streamed tokens into spans for synthesis, flushing on sentence
/// punctuation or once a span grows past [`SPAN_FLUSH_CHARS`].
struct SpanAggregator {
    buf: String,
}

impl SpanAggregator {
    fn new() -> Self {
        Self { buf: String::new() }
    }

    fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buf.push_str(chunk);
        let mut spans = Vec::new();
        while let Some(idx) = self.buf.find(['.', '!', '?']) {
            let rest = self.buf.split_off(idx + 1);
            let span = std::mem::replace(&mut self.buf, rest);
            let span = span.trim().to_string();
            if !span.is_empty() {
                spans.push(span);
            }
        }
        if self.buf.len() > SPAN_FLUSH_CHARS {
            let span = std::mem::take(&mut self.buf).trim().to_string();
            if !span.is_empty() {
                spans.push(span);
            }
        }
        spans
    }

    fn flush(&mut self) -> Option<String> {
        let span = std::mem::take(&mut self.buf);
        let span = span.trim();
        if span.is_empty() {
            None
        } else {
            Some(span.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregator_flushes_on_sentence_punctuation() {
        let mut agg = SpanAggregator::new();
        let mut spans = agg.push("Hello there.");
        spans.extend(agg.push(" How are you"));
        assert_eq!(spans, vec!["Hello there."]);
        assert_eq!(agg.flush(), Some("How are you".to_string()));
    }

    #[test]
    fn aggregator_force_flushes_past_size_bound() {
        let mut agg = SpanAggregator::new();
        let long = "a".repeat(SPAN_FLUSH_CHARS + 1);
        let spans = agg.push(&long);
        assert_eq!(spans.len(), 1);
        assert_eq!(agg.flush(), None);
    }

    #[test]
    fn empty_flush_yields_nothing() {
        let mut agg = SpanAggregator::new();
        assert_eq!(agg.flush(), None);
    }
}
