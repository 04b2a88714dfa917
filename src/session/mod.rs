//! Per-connection session state: the utterance buffer, generation pipeline,
//! chat history, and the supervisor that ties them together.

pub mod buffer;
pub mod chat;
pub mod pipeline;
pub mod supervisor;

pub use chat::ChatHistory;
pub use supervisor::{SessionSupervisor, SupervisorEvent};
