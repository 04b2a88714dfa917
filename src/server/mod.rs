//! Web server bootstrap: wires the configured providers into shared state
//! and serves the voice WebSocket route.

pub mod ws;

use crate::config::Config;
use crate::providers::{HttpLlmGateway, HttpTtsGateway, LlmGateway, SttGateway, TtsGateway, WsSttGateway};
use anyhow::Result;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

const STT_ENDPOINT: &str = "wss://stt.provider.example/v1/listen";
const LLM_ENDPOINT: &str = "https://llm.provider.example/v1";
const TTS_ENDPOINT: &str = "https://tts.provider.example/v1/speak";

/// Shared server state, cloned into every connection handler.
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub llm_gateway: Arc<dyn LlmGateway>,
    pub stt_gateway: Arc<dyn SttGateway>,
    pub tts_gateway: Arc<dyn TtsGateway>,
}

/// Starts the voice proxy HTTP/WebSocket server.
pub async fn start() -> Result<()> {
    let config = Config::from_env()?;

    let llm_gateway: Arc<dyn LlmGateway> = Arc::new(HttpLlmGateway::new(LLM_ENDPOINT, config.llm_api_key.clone()));
    let stt_gateway: Arc<dyn SttGateway> =
        Arc::new(WsSttGateway::new(STT_ENDPOINT, config.stt_api_key.clone(), &config.stt_model));
    let tts_gateway: Arc<dyn TtsGateway> =
        Arc::new(HttpTtsGateway::new(TTS_ENDPOINT, config.tts_api_key.clone(), &config.tts_model));

    let addr: SocketAddr = format!("{}:{}", config.listen_addr, config.listen_port).parse()?;

    let state = ServerState { config: Arc::new(config), llm_gateway, stt_gateway, tts_gateway };

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let app = Router::new()
        .route("/voice", get(ws::ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;

    Ok(())
}
