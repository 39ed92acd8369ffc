//! Common types shared by every inference engine
//!
//! This module defines chat messages, token usage accounting, and the
//! completion and stream chunk structures returned by engines.

use crate::error::Result;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions prepended by the server
    System,
    /// End user
    User,
    /// Model reply
    Assistant,
}

impl Role {
    /// Wire name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Message {
    /// Role of the message sender
    pub role: Role,
    /// Text content of the message
    pub content: String,
}

impl Message {
    /// Creates a new user message
    ///
    /// # Examples
    ///
    /// ```
    /// use lexai::engines::{Message, Role};
    ///
    /// let msg = Message::user("전세 계약 해지 방법은?");
    /// assert_eq!(msg.role, Role::User);
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Creates a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Token usage reported by an engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of tokens in the prompt
    pub prompt_tokens: usize,
    /// Number of tokens in the completion
    pub completion_tokens: usize,
    /// Total tokens used (prompt + completion)
    pub total_tokens: usize,
}

impl TokenUsage {
    /// Create a new TokenUsage instance
    ///
    /// # Arguments
    ///
    /// * `prompt_tokens` - Number of prompt tokens
    /// * `completion_tokens` - Number of completion tokens
    ///
    /// # Examples
    ///
    /// ```
    /// use lexai::engines::TokenUsage;
    ///
    /// let usage = TokenUsage::new(100, 50);
    /// assert_eq!(usage.total_tokens, 150);
    /// ```
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        let total_tokens = prompt_tokens + completion_tokens;
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }
}

/// Result of a non-streaming generation, before thinking is stripped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    /// Raw generated text (may still contain `<think>` spans)
    pub text: String,
    /// Reasoning text reported separately by the engine
    pub thinking: Option<String>,
    /// Token usage, when the engine reports it
    pub usage: Option<TokenUsage>,
}

/// A single event decoded from an engine's streaming response
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
    /// A fragment of generated text
    Content(String),
    /// A fragment of reasoning text reported out of band
    Thinking(String),
    /// Final token counts
    Usage(TokenUsage),
}

/// Stream of raw engine events
pub type RawStream = Pin<Box<dyn Stream<Item = Result<RawEvent>> + Send>>;

/// Stream of user-facing chunks
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// One step of a streamed reply
///
/// `text` is the cumulative visible reply so far; `delta` is what changed
/// since the previous chunk. Exactly one chunk per stream has
/// `finished = true`, and only that chunk carries `usage`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamChunk {
    /// Newly visible text
    pub delta: String,
    /// Visible text so far
    pub text: String,
    /// Whether this is the last chunk
    pub finished: bool,
    /// Token usage, set on the final chunk
    pub usage: Option<TokenUsage>,
    /// Hidden reasoning text collected so far
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
}

/// Final reply from a non-streaming generation, thinking already removed
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Visible, whitespace-trimmed reply
    pub text: String,
    /// Hidden reasoning text, if any
    pub thinking: Option<String>,
    /// Token usage, when the engine reports it
    pub usage: Option<TokenUsage>,
}

/// Assemble the prompt sent to an engine
///
/// The system prompt comes first (skipped when blank), then the prior
/// history in order, then the new user message.
pub fn build_messages(system_prompt: &str, history: &[Message], user_message: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    if !system_prompt.trim().is_empty() {
        messages.push(Message::system(system_prompt));
    }
    messages.extend(history.iter().cloned());
    messages.push(Message::user(user_message));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_roles_serialize_lowercase() {
        let json = serde_json::to_string(&Message::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }

    #[test]
    fn test_message_rejects_unknown_role() {
        let result = serde_json::from_str::<Message>(r#"{"role":"tool","content":"x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_message_rejects_unknown_fields() {
        let result =
            serde_json::from_str::<Message>(r#"{"role":"user","content":"x","name":"bob"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage::new(12, 30);
        assert_eq!(usage.total_tokens, 42);
    }

    #[test]
    fn test_build_messages_order() {
        let history = vec![Message::user("첫 질문"), Message::assistant("첫 답변")];
        let messages = build_messages("You are Lexi.", &history, "두 번째 질문");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0], Message::system("You are Lexi."));
        assert_eq!(messages[1], history[0]);
        assert_eq!(messages[2], history[1]);
        assert_eq!(messages[3], Message::user("두 번째 질문"));
    }

    #[test]
    fn test_build_messages_skips_blank_system_prompt() {
        let messages = build_messages("   ", &[], "hello");
        assert_eq!(messages, vec![Message::user("hello")]);
    }

    #[test]
    fn test_stream_chunk_omits_missing_thinking() {
        let chunk = StreamChunk {
            delta: "a".to_string(),
            text: "a".to_string(),
            finished: false,
            usage: None,
            thinking: None,
        };
        let value = serde_json::to_value(&chunk).unwrap();
        assert!(value.get("thinking").is_none());
        assert!(value["usage"].is_null());
    }
}
