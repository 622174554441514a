// Allow unwrap in testing utilities - test code should panic on errors
#![allow(clippy::unwrap_used)]

//! # MathFlow Testing Utilities
//!
//! Scripted doubles for the two external collaborators of the tutoring
//! core:
//!
//! - **`ScriptedChatModel`**: replays a queue of canned replies and records
//!   every prompt it receives
//! - **`FailingChatModel`**: always errors, driving the schema-default path
//! - **`StaticRetriever`** / **`FailingRetriever`**: fixed or failing
//!   passage sources
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mathflow_testing::{ScriptedChatModel, StaticRetriever};
//!
//! let model = ScriptedChatModel::new([
//!     r#"{"next_agent": "math_expert", "reasoning": "explain", "confidence": 0.9}"#,
//! ]);
//! let retriever = StaticRetriever::new([("Pythagorean theorem text", 0.92)]);
//! ```

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use mathflow::core::error::{Error, Result};
use mathflow::core::language_models::{CallOptions, ChatModel, ChatResult};
use mathflow::core::messages::Message;
use mathflow::core::retrievers::{Retriever, ScoredPassage};

/// A chat model that replays canned replies in order.
///
/// Every prompt is recorded for later inspection. When the script runs out
/// the model either repeats its final reply (see
/// [`ScriptedChatModel::repeating`] / [`ScriptedChatModel::with_repeat_last`])
/// or returns a transport error, which downstream envelopes degrade to the
/// schema default.
pub struct ScriptedChatModel {
    replies: Mutex<VecDeque<String>>,
    last_reply: Mutex<Option<String>>,
    repeat_last: bool,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedChatModel {
    /// Create a model that plays `replies` once, then errors.
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            last_reply: Mutex::new(None),
            repeat_last: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Create a model that returns `reply` forever.
    pub fn repeating(reply: impl Into<String>) -> Self {
        let reply = reply.into();
        Self {
            replies: Mutex::new(VecDeque::from([reply])),
            last_reply: Mutex::new(None),
            repeat_last: true,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// After the script is exhausted, keep repeating the final reply
    /// instead of erroring.
    #[must_use]
    pub fn with_repeat_last(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    /// Every prompt the model has received, in call order.
    pub fn recorded_prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Number of scripted replies not yet consumed.
    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }

    /// Total number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn _generate(&self, messages: &[Message], _options: &CallOptions) -> Result<ChatResult> {
        let prompt = messages
            .iter()
            .map(Message::content)
            .collect::<Vec<_>>()
            .join("\n");
        self.prompts.lock().unwrap().push(prompt);

        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(reply) => {
                *self.last_reply.lock().unwrap() = Some(reply.clone());
                Ok(ChatResult::from_text(reply))
            }
            None => {
                if self.repeat_last {
                    if let Some(last) = self.last_reply.lock().unwrap().clone() {
                        return Ok(ChatResult::from_text(last));
                    }
                }
                Err(Error::LanguageModel("script exhausted".to_string()))
            }
        }
    }

    fn llm_type(&self) -> &str {
        "scripted"
    }
}

/// A chat model whose every call fails at the transport level.
#[derive(Default)]
pub struct FailingChatModel {
    calls: Mutex<usize>,
}

impl FailingChatModel {
    /// Create a failing model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls attempted.
    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ChatModel for FailingChatModel {
    async fn _generate(
        &self,
        _messages: &[Message],
        _options: &CallOptions,
    ) -> Result<ChatResult> {
        *self.calls.lock().unwrap() += 1;
        Err(Error::LanguageModel("simulated outage".to_string()))
    }

    fn llm_type(&self) -> &str {
        "failing"
    }
}

/// A retriever that returns a fixed passage list for every query.
#[derive(Default)]
pub struct StaticRetriever {
    passages: Vec<ScoredPassage>,
}

impl StaticRetriever {
    /// Create from `(content, score)` pairs.
    pub fn new<I, S>(passages: I) -> Self
    where
        I: IntoIterator<Item = (S, f32)>,
        S: Into<String>,
    {
        Self {
            passages: passages
                .into_iter()
                .map(|(content, score)| ScoredPassage::new(content, score))
                .collect(),
        }
    }

    /// A retriever that finds nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn _retrieve(&self, _query: &str, top_k: usize) -> Result<Vec<ScoredPassage>> {
        Ok(self.passages.iter().take(top_k).cloned().collect())
    }
}

/// A retriever whose every call fails.
#[derive(Default)]
pub struct FailingRetriever;

impl FailingRetriever {
    /// Create a failing retriever.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Retriever for FailingRetriever {
    async fn _retrieve(&self, _query: &str, _top_k: usize) -> Result<Vec<ScoredPassage>> {
        Err(Error::Retriever("vector store unreachable".to_string()))
    }
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{FailingChatModel, FailingRetriever, ScriptedChatModel, StaticRetriever};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_model_plays_in_order() {
        let model = ScriptedChatModel::new(["one", "two"]);
        let options = CallOptions::default();
        let first = model.invoke_text("a", &options).await.unwrap();
        let second = model.invoke_text("b", &options).await.unwrap();
        assert_eq!(first, "one");
        assert_eq!(second, "two");
        assert!(model.invoke_text("c", &options).await.is_err());
        assert_eq!(model.call_count(), 3);
    }

    #[tokio::test]
    async fn test_scripted_model_records_prompts() {
        let model = ScriptedChatModel::new(["reply"]);
        let _ = model.invoke_text("what is a set?", &CallOptions::default()).await;
        let prompts = model.recorded_prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("what is a set?"));
    }

    #[tokio::test]
    async fn test_repeating_model_never_exhausts() {
        let model = ScriptedChatModel::repeating("always me");
        let options = CallOptions::default();
        for _ in 0..5 {
            assert_eq!(model.invoke_text("x", &options).await.unwrap(), "always me");
        }
    }

    #[tokio::test]
    async fn test_failing_model_counts_calls() {
        let model = FailingChatModel::new();
        let options = CallOptions::default();
        assert!(model.invoke_text("x", &options).await.is_err());
        assert!(model.invoke_text("y", &options).await.is_err());
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn test_static_retriever_returns_fixture() {
        let retriever = StaticRetriever::new([("doc a", 0.9), ("doc b", 0.7)]);
        let passages = retriever._retrieve("anything", 3).await.unwrap();
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].content, "doc a");
    }

    #[tokio::test]
    async fn test_failing_retriever_errors() {
        let retriever = FailingRetriever::new();
        assert!(retriever._retrieve("q", 3).await.is_err());
    }
}
