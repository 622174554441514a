//! Chat messages exchanged with a language model.
//!
//! This is the wire-level shape consumed by [`crate::core::language_models::ChatModel`].
//! Conversation turns stored on the state use [`crate::state::TurnRecord`]
//! instead, which carries role metadata for every agent in the workflow.

use serde::{Deserialize, Serialize};

/// A single chat message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "content", rename_all = "snake_case")]
pub enum Message {
    /// Instructions that frame the model's behavior.
    System(String),
    /// Input authored by the user (or by the calling node on their behalf).
    Human(String),
    /// Output produced by the model.
    Ai(String),
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::System(content.into())
    }

    /// Create a human message.
    pub fn human(content: impl Into<String>) -> Self {
        Self::Human(content.into())
    }

    /// Create an AI message.
    pub fn ai(content: impl Into<String>) -> Self {
        Self::Ai(content.into())
    }

    /// The textual content of the message.
    #[must_use]
    pub fn content(&self) -> &str {
        match self {
            Self::System(c) | Self::Human(c) | Self::Ai(c) => c,
        }
    }

    /// The conventional role string for the message.
    #[must_use]
    pub fn role(&self) -> &'static str {
        match self {
            Self::System(_) => "system",
            Self::Human(_) => "human",
            Self::Ai(_) => "ai",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_and_accessors() {
        let msg = Message::human("What is a derivative?");
        assert_eq!(msg.role(), "human");
        assert_eq!(msg.content(), "What is a derivative?");

        assert_eq!(Message::system("be rigorous").role(), "system");
        assert_eq!(Message::ai("a rate of change").role(), "ai");
    }

    #[test]
    fn test_serde_round_trip() {
        let msg = Message::ai("42");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"role\":\"ai\""));
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
