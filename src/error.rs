//! Typed error kinds for the voice proxy.
//!
//! Most call sites use `anyhow::Result` with `.context(...)`; this enum exists
//! for the few places that need to match on *which* kind of failure occurred
//! (provider dispatch, session teardown) rather than just log-and-propagate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("client disconnected")]
    ClientGone,

    #[error("STT provider error: {0}")]
    SttProviderError(String),

    #[error("LLM provider error: {0}")]
    LlmProviderError(String),

    #[error("TTS provider error: {0}")]
    TtsProviderError(String),

    #[error("provider call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),
}
