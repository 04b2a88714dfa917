//! Chat history: the ordered `(role, text)` turns passed to the LLM gateway.

pub use crate::providers::llm::ChatTurn;

const SYSTEM_PREAMBLE: &str = "You are a concise voice assistant. Keep answers short.";
const SYSTEM_ACK: &str = "Understood. I will be brief.";

#[derive(Debug, Default)]
pub struct ChatHistory {
    turns: Vec<ChatTurn>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self { turns: vec![ChatTurn::user(SYSTEM_PREAMBLE), ChatTurn::assistant(SYSTEM_ACK)] }
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn snapshot_with_user_turn(&self, text: &str) -> Vec<ChatTurn> {
        let mut turns = self.turns.clone();
        turns.push(ChatTurn::user(text));
        turns
    }

    /// Appends the committed user/assistant pair for a generation that
    /// completed without cancellation.
    pub fn commit_turn(&mut self, user_text: &str, assistant_text: &str) {
        self.turns.push(ChatTurn::user(user_text));
        self.turns.push(ChatTurn::assistant(assistant_text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_history_seeds_system_preamble() {
        let history = ChatHistory::new();
        assert_eq!(history.turns().len(), 2);
    }

    #[test]
    fn commit_turn_appends_both_sides() {
        let mut history = ChatHistory::new();
        history.commit_turn("hi", "hello");
        assert_eq!(history.turns().len(), 4);
    }
}
