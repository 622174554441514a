//! Language model abstractions.
//!
//! Providers implement [`ChatModel::_generate`]; callers go through the
//! provided [`ChatModel::generate`] wrapper, which owns the per-call timeout.
//! A timed-out call is reported as [`crate::core::error::Error::LanguageModel`]
//! and is indistinguishable downstream from a malformed reply - the
//! structured envelope in [`structured`] degrades both the same way.

pub mod structured;

use std::time::Duration;

use async_trait::async_trait;

use crate::core::error::{Error, Result};
use crate::core::messages::Message;

/// Sampling and budget options for a single model call.
#[derive(Clone, Debug)]
pub struct CallOptions {
    /// Sampling temperature in `[0.0, 1.0]`.
    pub temperature: f32,
    /// Hard cap on generated tokens.
    pub max_tokens: u32,
    /// Per-call wall-clock budget. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1000,
            timeout: None,
        }
    }
}

impl CallOptions {
    /// Override the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Override the token cap.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set a per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// One candidate completion.
#[derive(Clone, Debug)]
pub struct ChatGeneration {
    /// The generated message.
    pub message: Message,
}

impl ChatGeneration {
    /// Create a generation from a message.
    #[must_use]
    pub fn new(message: Message) -> Self {
        Self { message }
    }

    /// Text content of the generation.
    #[must_use]
    pub fn text(&self) -> &str {
        self.message.content()
    }
}

/// Result of a chat call.
#[derive(Clone, Debug)]
pub struct ChatResult {
    /// Candidate generations, best first.
    pub generations: Vec<ChatGeneration>,
}

impl ChatResult {
    /// Build a result holding a single generation.
    #[must_use]
    pub fn new(generation: ChatGeneration) -> Self {
        Self {
            generations: vec![generation],
        }
    }

    /// Build a result from a plain AI reply.
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(ChatGeneration::new(Message::ai(text)))
    }

    /// Text of the first generation, if any.
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        self.generations.first().map(ChatGeneration::text)
    }
}

/// A chat-completion language model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Provider-specific generation. Implementations should not apply their
    /// own timeout; [`ChatModel::generate`] handles it.
    async fn _generate(&self, messages: &[Message], options: &CallOptions) -> Result<ChatResult>;

    /// Short identifier for logging (`"scripted"`, `"openai"`, ...).
    fn llm_type(&self) -> &str;

    /// Generate a completion, enforcing `options.timeout` when set.
    async fn generate(&self, messages: &[Message], options: &CallOptions) -> Result<ChatResult> {
        match options.timeout {
            Some(limit) => tokio::time::timeout(limit, self._generate(messages, options))
                .await
                .map_err(|_| {
                    Error::LanguageModel(format!("call timed out after {}ms", limit.as_millis()))
                })?,
            None => self._generate(messages, options).await,
        }
    }

    /// Convenience: send a single human message and return the raw text.
    async fn invoke_text(&self, prompt: &str, options: &CallOptions) -> Result<String> {
        let result = self.generate(&[Message::human(prompt)], options).await?;
        result
            .first_text()
            .map(str::to_string)
            .ok_or_else(|| Error::LanguageModel("no generation returned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowModel;

    #[async_trait]
    impl ChatModel for SlowModel {
        async fn _generate(
            &self,
            _messages: &[Message],
            _options: &CallOptions,
        ) -> Result<ChatResult> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ChatResult::from_text("too late"))
        }

        fn llm_type(&self) -> &str {
            "slow"
        }
    }

    struct UpperModel;

    #[async_trait]
    impl ChatModel for UpperModel {
        async fn _generate(
            &self,
            messages: &[Message],
            _options: &CallOptions,
        ) -> Result<ChatResult> {
            let text = messages
                .iter()
                .map(|m| m.content().to_uppercase())
                .collect::<Vec<_>>()
                .join(" ");
            Ok(ChatResult::from_text(text))
        }

        fn llm_type(&self) -> &str {
            "upper"
        }
    }

    #[tokio::test]
    async fn test_timeout_maps_to_language_model_error() {
        let options = CallOptions::default().with_timeout(Duration::from_millis(10));
        let err = SlowModel
            .generate(&[Message::human("hi")], &options)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LanguageModel(_)));
    }

    #[tokio::test]
    async fn test_invoke_text_returns_first_generation() {
        let text = UpperModel
            .invoke_text("hello", &CallOptions::default())
            .await
            .unwrap();
        assert_eq!(text, "HELLO");
    }

    #[test]
    fn test_call_options_defaults() {
        let options = CallOptions::default();
        assert!((options.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(options.max_tokens, 1000);
        assert!(options.timeout.is_none());
    }
}
