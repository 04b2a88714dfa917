//! Utterance buffer: the merge-on-regret debounce strategy.
//!
//! Pure state transitions only — no timers or I/O — so the regret/merge
//! logic can be unit tested without mocking tokio time. The supervisor owns
//! the actual quiet-timer task and calls into this type on every STT final
//! and on timer fire.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenState {
    Idle,
    Buffering,
    Generating,
}

#[derive(Debug, Default)]
pub struct UtteranceBuffer {
    pending_text: String,
    last_committed_text: String,
    state: GenState,
}

impl Default for GenState {
    fn default() -> Self {
        GenState::Idle
    }
}

/// What the supervisor should do after handing a final transcript to the buffer.
pub struct FinalOutcome {
    /// True if an in-flight generation must be cancelled (bump the token).
    pub cancel_active_generation: bool,
    /// True if a new quiet-timer should be armed.
    pub rearm_timer: bool,
}

impl UtteranceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> GenState {
        self.state
    }

    /// A new STT final arrived. Implements the regret/merge rule: if a
    /// generation is in flight, cancel it and merge with the text that
    /// started it; otherwise append to the pending buffer.
    pub fn on_final(&mut self, transcript: &str) -> FinalOutcome {
        let transcript = transcript.trim();
        if transcript.is_empty() {
            return FinalOutcome { cancel_active_generation: false, rearm_timer: false };
        }

        let was_generating = self.state == GenState::Generating;
        if was_generating {
            self.pending_text = format!("{} {}", self.last_committed_text, transcript);
        } else if self.pending_text.is_empty() {
            self.pending_text = transcript.to_string();
        } else {
            self.pending_text = format!("{} {}", self.pending_text, transcript);
        }
        self.state = GenState::Buffering;

        FinalOutcome { cancel_active_generation: was_generating, rearm_timer: true }
    }

    /// The quiet timer fired. Returns the committed text to generate from, or
    /// `None` if there was nothing pending (timer fired on an empty buffer).
    pub fn on_quiet_timer_fired(&mut self) -> Option<String> {
        let text = self.pending_text.trim().to_string();
        self.pending_text.clear();
        if text.is_empty() {
            self.state = GenState::Idle;
            return None;
        }
        self.last_committed_text = text.clone();
        self.state = GenState::Generating;
        Some(text)
    }

    /// Client sent an explicit interrupt: clear everything and go idle.
    pub fn interrupt(&mut self) {
        self.pending_text.clear();
        self.state = GenState::Idle;
    }

    /// The in-flight generation finished (naturally or with an error) and no
    /// newer generation has been started since.
    pub fn generation_settled(&mut self) {
        if self.state == GenState::Generating {
            self.state = GenState::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_final_buffers_and_requests_timer() {
        let mut buf = UtteranceBuffer::new();
        let outcome = buf.on_final("hello there");
        assert!(!outcome.cancel_active_generation);
        assert!(outcome.rearm_timer);
        assert_eq!(buf.state(), GenState::Buffering);
    }

    #[test]
    fn consecutive_finals_accumulate_before_timer_fires() {
        let mut buf = UtteranceBuffer::new();
        buf.on_final("hello");
        buf.on_final("world");
        let text = buf.on_quiet_timer_fired().unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn empty_transcript_is_discarded() {
        let mut buf = UtteranceBuffer::new();
        let outcome = buf.on_final("   ");
        assert!(!outcome.rearm_timer);
        assert_eq!(buf.state(), GenState::Idle);
    }

    #[test]
    fn final_during_generation_cancels_and_merges_with_last_committed() {
        let mut buf = UtteranceBuffer::new();
        buf.on_final("what's the weather");
        buf.on_quiet_timer_fired(); // -> Generating, last_committed = "what's the weather"

        let outcome = buf.on_final("in paris");
        assert!(outcome.cancel_active_generation);
        assert_eq!(buf.state(), GenState::Buffering);

        let merged = buf.on_quiet_timer_fired().unwrap();
        assert_eq!(merged, "what's the weather in paris");
    }

    #[test]
    fn interrupt_clears_buffer_and_goes_idle() {
        let mut buf = UtteranceBuffer::new();
        buf.on_final("never mind this");
        buf.interrupt();
        assert_eq!(buf.state(), GenState::Idle);
        assert_eq!(buf.on_quiet_timer_fired(), None);
    }

    #[test]
    fn quiet_timer_on_empty_buffer_is_a_noop() {
        let mut buf = UtteranceBuffer::new();
        assert_eq!(buf.on_quiet_timer_fired(), None);
        assert_eq!(buf.state(), GenState::Idle);
    }

    #[test]
    fn generation_settled_returns_to_idle_only_from_generating() {
        let mut buf = UtteranceBuffer::new();
        buf.on_final("hi");
        buf.on_quiet_timer_fired();
        assert_eq!(buf.state(), GenState::Generating);
        buf.generation_settled();
        assert_eq!(buf.state(), GenState::Idle);
    }
}
