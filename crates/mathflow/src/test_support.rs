//! In-crate test doubles for unit tests.
//!
//! Integration tests and downstream crates use `mathflow-testing` instead;
//! unit tests cannot, because that crate depends on this one.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::error::{Error, Result};
use crate::core::language_models::{CallOptions, ChatModel, ChatResult};
use crate::core::messages::Message;
use crate::core::retrievers::{Retriever, ScoredPassage};

/// Replays canned replies in order, recording every prompt.
pub struct ScriptedChatModel {
    replies: Mutex<VecDeque<String>>,
    last_reply: Mutex<Option<String>>,
    repeat_last: bool,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedChatModel {
    /// Play `replies` once, then error.
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

    /// Return `reply` forever.
    pub fn repeating(reply: impl Into<String>) -> Self {
        let mut model = Self::new([reply.into()]);
        model.repeat_last = true;
        model
    }

    /// Keep repeating the final reply once the script is exhausted.
    #[must_use]
    pub fn with_repeat_last(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    /// Every prompt received, in call order.
    pub fn recorded_prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
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

/// Every call fails at the transport level.
#[derive(Default)]
pub struct FailingChatModel;

impl FailingChatModel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChatModel for FailingChatModel {
    async fn _generate(
        &self,
        _messages: &[Message],
        _options: &CallOptions,
    ) -> Result<ChatResult> {
        Err(Error::LanguageModel("simulated outage".to_string()))
    }

    fn llm_type(&self) -> &str {
        "failing"
    }
}

/// Fixed passage list for every query.
#[derive(Default)]
pub struct StaticRetriever {
    passages: Vec<ScoredPassage>,
}

impl StaticRetriever {
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

/// Every call fails.
#[derive(Default)]
pub struct FailingRetriever;

impl FailingRetriever {
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
