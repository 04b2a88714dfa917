//! External collaborators: STT, LLM, and TTS providers.
//!
//! Each is an async trait so the session layer can be driven by either a real
//! HTTP/WebSocket client or a scripted fake in tests.

pub mod llm;
pub mod stt;
pub mod tts;

pub use llm::{FakeLlmGateway, HttpLlmGateway, LlmGateway};
pub use stt::{FakeSttGateway, SttEvent, SttGateway, SttSession, WsSttGateway};
pub use tts::{FakeTtsGateway, FlakyTtsGateway, HttpTtsGateway, TtsGateway};
