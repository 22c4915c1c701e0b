//! Message log for the active session and the turn state machine guarding it.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Where the conversation is within a user turn.
///
/// `Idle -> AwaitingResponse` on submit, then either `-> Idle` when a
/// single-shot reply lands or `-> Streaming -> Idle` for streamed replies.
/// Failures and cancellation return straight to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Idle,
    AwaitingResponse,
    Streaming,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::AwaitingResponse => "awaiting a response",
            Self::Streaming => "streaming",
        })
    }
}

#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    state: TurnState,
    latency: Option<Duration>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all history, the latency metric and any open turn.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.state = TurnState::Idle;
        self.latency = None;
    }

    /// Append a user message. Whitespace-only text is ignored.
    ///
    /// Returns whether a message was appended.
    pub fn append_user(&mut self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        self.messages.push(Message::user(text));
        true
    }

    pub fn begin_turn(&mut self) -> Result<()> {
        if self.state != TurnState::Idle {
            return Err(Error::TurnInProgress(self.state));
        }
        self.state = TurnState::AwaitingResponse;
        Ok(())
    }

    /// Push the empty assistant message that stream fragments are merged into.
    pub fn open_assistant_turn(&mut self) -> Result<()> {
        if self.state != TurnState::AwaitingResponse {
            return Err(Error::invalid_state(self.state, "open an assistant turn"));
        }
        self.messages.push(Message::assistant(String::new()));
        self.state = TurnState::Streaming;
        Ok(())
    }

    /// Append a complete assistant reply in one step and close the turn.
    pub fn complete_assistant_turn(&mut self, text: impl Into<String>) -> Result<()> {
        if self.state != TurnState::AwaitingResponse {
            return Err(Error::invalid_state(
                self.state,
                "complete an assistant turn",
            ));
        }
        self.messages.push(Message::assistant(text));
        self.state = TurnState::Idle;
        Ok(())
    }

    /// Close a streamed turn. A stream that delivered nothing never opened a
    /// message, so `AwaitingResponse` is accepted too.
    pub fn finish_stream(&mut self) -> Result<()> {
        match self.state {
            TurnState::Streaming | TurnState::AwaitingResponse => {
                self.state = TurnState::Idle;
                Ok(())
            }
            TurnState::Idle => Err(Error::invalid_state(self.state, "finish a stream")),
        }
    }

    /// Abandon the current turn. Text merged so far stays in the log.
    pub fn abort_turn(&mut self) {
        self.state = TurnState::Idle;
    }

    pub fn open_message_mut(&mut self) -> Result<&mut Message> {
        if self.state != TurnState::Streaming {
            return Err(Error::invalid_state(self.state, "write to the open message"));
        }
        self.messages
            .last_mut()
            .filter(|m| m.role == Role::Assistant)
            .ok_or_else(|| Error::invalid_state(TurnState::Streaming, "find the open message"))
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == TurnState::Idle
    }

    pub fn latency(&self) -> Option<Duration> {
        self.latency
    }

    pub fn set_latency(&mut self, latency: Duration) {
        self.latency = Some(latency);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_user_text_is_ignored() {
        let mut conv = Conversation::new();
        for text in ["", " ", "\t\n", "   \r\n  "] {
            assert!(!conv.append_user(text));
        }
        assert_eq!(conv.len(), 0);

        assert!(conv.append_user("  hi  "));
        assert_eq!(conv.messages(), &[Message::user("hi")]);
    }

    #[test]
    fn streamed_turn_lifecycle() {
        let mut conv = Conversation::new();
        conv.append_user("hello");
        conv.begin_turn().unwrap();
        assert_eq!(conv.state(), TurnState::AwaitingResponse);

        conv.open_assistant_turn().unwrap();
        assert_eq!(conv.state(), TurnState::Streaming);
        conv.open_message_mut().unwrap().content.push_str("hey");

        // Only one open assistant message at a time.
        assert!(matches!(
            conv.open_assistant_turn(),
            Err(Error::InvalidTurnState { .. })
        ));
        assert!(conv.complete_assistant_turn("nope").is_err());

        conv.finish_stream().unwrap();
        assert!(conv.is_idle());
        assert_eq!(conv.last(), Some(&Message::assistant("hey")));
        assert!(conv.open_message_mut().is_err());
    }

    #[test]
    fn single_shot_turn_lifecycle() {
        let mut conv = Conversation::new();
        conv.append_user("hello");
        assert!(conv.complete_assistant_turn("early").is_err());

        conv.begin_turn().unwrap();
        conv.complete_assistant_turn("hi there").unwrap();
        assert!(conv.is_idle());
        assert_eq!(conv.len(), 2);
    }

    #[test]
    fn begin_turn_rejects_overlap() {
        let mut conv = Conversation::new();
        conv.begin_turn().unwrap();
        let err = conv.begin_turn().unwrap_err();
        assert!(matches!(err, Error::TurnInProgress(TurnState::AwaitingResponse)));
    }

    #[test]
    fn abort_keeps_partial_text() {
        let mut conv = Conversation::new();
        conv.append_user("tell me a story");
        conv.begin_turn().unwrap();
        conv.open_assistant_turn().unwrap();
        conv.open_message_mut().unwrap().content.push_str("Once upon");
        conv.abort_turn();

        assert!(conv.is_idle());
        assert_eq!(conv.last().unwrap().content, "Once upon");
        conv.begin_turn().unwrap();
    }

    #[test]
    fn empty_stream_finishes_without_message() {
        let mut conv = Conversation::new();
        conv.append_user("hello");
        conv.begin_turn().unwrap();
        conv.finish_stream().unwrap();
        assert_eq!(conv.len(), 1);
        assert!(conv.finish_stream().is_err());
    }

    #[test]
    fn reset_clears_everything() {
        let mut conv = Conversation::new();
        conv.append_user("a");
        conv.begin_turn().unwrap();
        conv.open_assistant_turn().unwrap();
        conv.set_latency(Duration::from_millis(120));

        conv.reset();
        assert!(conv.is_empty());
        assert!(conv.is_idle());
        assert_eq!(conv.latency(), None);
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::assistant("x")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"x"}"#);
    }
}
