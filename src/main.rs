//! Voice Agent Proxy
//!
//! Real-time STT/LLM/TTS orchestration behind a single client WebSocket.

use voice_agent_proxy::server;

#[tokio::main]
async fn main() {
    // Install Rustls crypto provider for HTTPS support.
    // This is required for Rustls 0.23+.
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install Rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    if let Err(e) = server::start().await {
        tracing::error!("fatal error: {}", e);
        std::process::exit(1);
    }
}
