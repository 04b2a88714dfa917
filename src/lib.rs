//! Voice Agent Proxy
//!
//! A real-time, full-duplex proxy that sits between a browser and three
//! external collaborators — a streaming speech-to-text provider, a
//! streaming chat LLM, and a text-to-speech provider — and coordinates them
//! under a single client WebSocket connection.
//!
//! The interesting part is the barge-in and regret layer: [`session::buffer`]
//! debounces finalized transcripts with a quiet timer and merges them into
//! the utterance that is about to be (or is being) generated from, while
//! [`session::pipeline`] cancels and replaces an in-flight generation the
//! moment the user keeps talking.
//!
//! # Example
//!
//! ```ignore
//! use voice_agent_proxy::server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     server::start().await
//! }
//! ```

pub mod config;
pub mod error;
pub mod providers;
pub mod server;
pub mod session;

pub use config::Config;
pub use error::ProxyError;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
