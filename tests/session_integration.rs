use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use voice_agent_proxy::providers::{FakeLlmGateway, FakeTtsGateway, FlakyTtsGateway};
use voice_agent_proxy::server::ws::ServerMessage;
use voice_agent_proxy::session::{SessionSupervisor, SupervisorEvent};

fn spawn_supervisor(
    tokens: Vec<&str>,
    quiet_ms: u64,
) -> (mpsc::Sender<SupervisorEvent>, mpsc::Receiver<voice_agent_proxy::server::ws::OutboundFrame>, tokio::task::JoinHandle<()>) {
    let (client_tx, client_rx) = mpsc::channel(64);
    let (event_tx, event_rx) = mpsc::channel(64);

    let llm = Arc::new(FakeLlmGateway::new(tokens));
    let tts = Arc::new(FakeTtsGateway);

    let supervisor = SessionSupervisor::new(
        "test-model".to_string(),
        llm,
        tts,
        client_tx,
        event_tx.clone(),
        Duration::from_secs(5),
        Duration::from_millis(quiet_ms),
    );

    let handle = tokio::spawn(supervisor.drive(event_rx));
    (event_tx, client_rx, handle)
}

#[tokio::test]
async fn final_transcript_triggers_generation_after_quiet_window() {
    let (event_tx, mut client_rx, handle) = spawn_supervisor(vec!["Hello", " there"], 20);

    event_tx.send(SupervisorEvent::SttFinal("hi there".to_string())).await.unwrap();

    let mut saw_response_complete = false;
    let mut saw_audio = false;
    for _ in 0..50 {
        match tokio::time::timeout(Duration::from_millis(200), client_rx.recv()).await {
            Ok(Some(frame)) => match frame.0 {
                ServerMessage::ResponseComplete => {
                    saw_response_complete = true;
                    break;
                }
                ServerMessage::Audio { .. } => saw_audio = true,
                _ => {}
            },
            _ => break,
        }
    }

    assert!(saw_response_complete, "expected a response_complete frame");
    assert!(saw_audio, "expected at least one synthesized audio frame");

    drop(event_tx);
    let _ = handle.await;
}

#[tokio::test]
async fn interrupt_before_quiet_window_suppresses_generation() {
    let (event_tx, mut client_rx, handle) = spawn_supervisor(vec!["should not be spoken"], 100);

    event_tx.send(SupervisorEvent::SttFinal("never mind".to_string())).await.unwrap();
    event_tx.send(SupervisorEvent::Interrupt).await.unwrap();

    let mut saw_response_complete = false;
    loop {
        match tokio::time::timeout(Duration::from_millis(300), client_rx.recv()).await {
            Ok(Some(frame)) => {
                if matches!(frame.0, ServerMessage::ResponseComplete) {
                    saw_response_complete = true;
                }
            }
            _ => break,
        }
    }

    assert!(!saw_response_complete, "interrupt should have cancelled the pending generation");

    drop(event_tx);
    let _ = handle.await;
}

/// A final transcript that arrives while a generation is already streaming
/// must cancel it and merge into exactly one follow-up generation — never
/// zero (the merge is lost) and never two (the cancelled one still completes).
#[tokio::test]
async fn final_during_generation_cancels_and_produces_one_merged_response() {
    let (client_tx, mut client_rx) = mpsc::channel(64);
    let (event_tx, event_rx) = mpsc::channel(64);

    // 80ms between tokens gives plenty of room to observe the Generating
    // state and send a second final before the first token is even emitted.
    let llm = Arc::new(FakeLlmGateway::with_delay(
        vec!["answer-one ", "answer-two ", "answer-three"],
        Duration::from_millis(80),
    ));
    let tts = Arc::new(FakeTtsGateway);

    let supervisor = SessionSupervisor::new(
        "test-model".to_string(),
        llm,
        tts,
        client_tx,
        event_tx.clone(),
        Duration::from_secs(5),
        Duration::from_millis(20),
    );
    let handle = tokio::spawn(supervisor.drive(event_rx));

    event_tx.send(SupervisorEvent::SttFinal("first thought".to_string())).await.unwrap();
    // Quiet timer fires at ~20ms and the first generation starts streaming,
    // but its first token won't land until ~100ms. Interrupt it mid-flight.
    tokio::time::sleep(Duration::from_millis(40)).await;
    event_tx.send(SupervisorEvent::SttFinal("actually more".to_string())).await.unwrap();

    let mut response_complete_count = 0;
    loop {
        match tokio::time::timeout(Duration::from_millis(400), client_rx.recv()).await {
            Ok(Some(frame)) => {
                if matches!(frame.0, ServerMessage::ResponseComplete) {
                    response_complete_count += 1;
                }
            }
            _ => break,
        }
    }

    assert_eq!(response_complete_count, 1, "exactly one merged generation should complete");

    drop(event_tx);
    let _ = handle.await;
}

/// A TTS failure on one span must not abort the generation: the other spans
/// still synthesize, the failed span's audio is simply omitted, and
/// response_complete still fires.
#[tokio::test]
async fn tts_failure_on_one_span_does_not_abort_the_generation() {
    let (client_tx, mut client_rx) = mpsc::channel(64);
    let (event_tx, event_rx) = mpsc::channel(64);

    let llm = Arc::new(FakeLlmGateway::new(["This has a BOOM in it.", " This one is fine."]));
    let tts = Arc::new(FlakyTtsGateway::new("BOOM"));

    let supervisor = SessionSupervisor::new(
        "test-model".to_string(),
        llm,
        tts,
        client_tx,
        event_tx.clone(),
        Duration::from_secs(5),
        Duration::from_millis(15),
    );
    let handle = tokio::spawn(supervisor.drive(event_rx));

    event_tx.send(SupervisorEvent::SttFinal("tell me something".to_string())).await.unwrap();

    let mut audio_frames = 0;
    let mut saw_response_complete = false;
    loop {
        match tokio::time::timeout(Duration::from_millis(300), client_rx.recv()).await {
            Ok(Some(frame)) => match frame.0 {
                ServerMessage::Audio { .. } => audio_frames += 1,
                ServerMessage::ResponseComplete => {
                    saw_response_complete = true;
                    break;
                }
                _ => {}
            },
            _ => break,
        }
    }

    assert!(saw_response_complete, "a failed TTS span must not abort the generation");
    assert_eq!(audio_frames, 1, "only the span without the injected failure should produce audio");

    drop(event_tx);
    let _ = handle.await;
}
