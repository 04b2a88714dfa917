//! Session supervisor: owns the generation token, the utterance buffer, and
//! chat history, and reacts to the single event stream fed by the client
//! reader, the STT reader, and the generation pipeline's outcome.

use crate::providers::{LlmGateway, TtsGateway};
use crate::server::ws::{OutboundFrame, ServerMessage};
use crate::session::buffer::UtteranceBuffer;
use crate::session::chat::ChatHistory;
use crate::session::pipeline::{self, GenerationOutcome};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Events the supervisor reacts to. All three producers (the client reader
/// task, the STT reader task, and a generation's outcome bridge) share one
/// channel so there is a single, totally ordered point of decision-making.
pub enum SupervisorEvent {
    Interrupt,
    SttFinal(String),
    SttInterim(String),
    SttUnavailable,
    QuietTimerFired(u64),
    GenerationOutcome(GenerationOutcome),
}

pub struct SessionSupervisor {
    model: String,
    client_tx: mpsc::Sender<OutboundFrame>,
    self_tx: mpsc::Sender<SupervisorEvent>,
    llm: Arc<dyn LlmGateway>,
    tts: Arc<dyn TtsGateway>,
    provider_timeout: Duration,
    quiet_duration: Duration,

    buffer: UtteranceBuffer,
    history: ChatHistory,
    active_token: Arc<AtomicU64>,
    quiet_epoch: u64,
    quiet_timer_handle: Option<JoinHandle<()>>,
    pipeline_handle: Option<JoinHandle<()>>,
    pending_user_text: Option<String>,
}

impl SessionSupervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model: String,
        llm: Arc<dyn LlmGateway>,
        tts: Arc<dyn TtsGateway>,
        client_tx: mpsc::Sender<OutboundFrame>,
        self_tx: mpsc::Sender<SupervisorEvent>,
        provider_timeout: Duration,
        quiet_duration: Duration,
    ) -> Self {
        Self {
            model,
            client_tx,
            self_tx,
            llm,
            tts,
            provider_timeout,
            quiet_duration,
            buffer: UtteranceBuffer::new(),
            history: ChatHistory::new(),
            active_token: Arc::new(AtomicU64::new(0)),
            quiet_epoch: 0,
            quiet_timer_handle: None,
            pipeline_handle: None,
            pending_user_text: None,
        }
    }

    /// Drives the session until the event channel closes (client disconnected).
    pub async fn drive(mut self, mut events: mpsc::Receiver<SupervisorEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        self.cancel_active_generation();
        self.cancel_quiet_timer();
    }

    async fn handle(&mut self, event: SupervisorEvent) {
        match event {
            SupervisorEvent::Interrupt => {
                info!("interrupt received");
                self.cancel_active_generation();
                self.buffer.interrupt();
                self.cancel_quiet_timer();
                let _ = self
                    .client_tx
                    .send(OutboundFrame::critical(ServerMessage::Status { state: "listening".into() }))
                    .await;
            }
            SupervisorEvent::SttInterim(text) => {
                let frame = ServerMessage::Transcript { text, is_final: false, sender: "user".into() };
                let _ = self.client_tx.try_send(OutboundFrame::best_effort(frame));
            }
            SupervisorEvent::SttFinal(text) => {
                let frame = ServerMessage::Transcript { text: text.clone(), is_final: true, sender: "user".into() };
                let _ = self.client_tx.send(OutboundFrame::critical(frame)).await;

                self.cancel_quiet_timer();
                let outcome = self.buffer.on_final(&text);
                if outcome.cancel_active_generation {
                    self.cancel_active_generation();
                }
                if outcome.rearm_timer {
                    self.arm_quiet_timer();
                }
            }
            SupervisorEvent::SttUnavailable => {
                warn!("STT provider unavailable after retries; continuing without STT");
                let _ = self
                    .client_tx
                    .send(OutboundFrame::critical(ServerMessage::Error {
                        message: "speech recognition unavailable".into(),
                    }))
                    .await;
            }
            SupervisorEvent::QuietTimerFired(epoch) => {
                if epoch != self.quiet_epoch {
                    return; // stale timer; a newer one has since been armed or cancelled
                }
                if let Some(text) = self.buffer.on_quiet_timer_fired() {
                    self.start_generation(text);
                }
            }
            SupervisorEvent::GenerationOutcome(outcome) => {
                if outcome.token != self.active_token.load(Ordering::Acquire) {
                    return; // superseded by a newer generation
                }
                self.buffer.generation_settled();
                if outcome.error.is_none() {
                    if let Some(user_text) = self.pending_user_text.take() {
                        self.history.commit_turn(&user_text, &outcome.full_text);
                    }
                }
                self.pipeline_handle = None;
            }
        }
    }

    fn cancel_active_generation(&mut self) {
        self.active_token.fetch_add(1, Ordering::AcqRel);
        if let Some(handle) = self.pipeline_handle.take() {
            handle.abort();
        }
        self.pending_user_text = None;
    }

    fn cancel_quiet_timer(&mut self) {
        self.quiet_epoch = self.quiet_epoch.wrapping_add(1);
        if let Some(handle) = self.quiet_timer_handle.take() {
            handle.abort();
        }
    }

    fn arm_quiet_timer(&mut self) {
        self.cancel_quiet_timer();
        let epoch = self.quiet_epoch;
        let delay = self.quiet_duration;
        let event_tx = self.self_tx.clone();
        self.quiet_timer_handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = event_tx.send(SupervisorEvent::QuietTimerFired(epoch)).await;
        }));
    }

    fn start_generation(&mut self, text: String) {
        let token = self.active_token.fetch_add(1, Ordering::AcqRel) + 1;
        let history = self.history.snapshot_with_user_turn(&text);
        self.pending_user_text = Some(text);

        let (outcome_tx, mut outcome_rx) = mpsc::channel(1);
        let handle = pipeline::spawn(
            token,
            self.active_token.clone(),
            self.llm.clone(),
            self.tts.clone(),
            self.model.clone(),
            history,
            self.client_tx.clone(),
            outcome_tx,
            self.provider_timeout,
        );
        self.pipeline_handle = Some(handle);

        // Bridge the pipeline's one-shot outcome back onto the shared event loop.
        let bridge_tx = self.self_tx.clone();
        tokio::spawn(async move {
            if let Some(outcome) = outcome_rx.recv().await {
                let _ = bridge_tx.send(SupervisorEvent::GenerationOutcome(outcome)).await;
            }
        });
    }
}
