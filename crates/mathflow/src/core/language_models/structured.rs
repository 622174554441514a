//! Structured output envelope.
//!
//! Every agent that needs a typed reply goes through
//! [`StructuredChatModel<T>`]: the output schema is rendered into format
//! instructions appended to the prompt, the model is called once, and the
//! reply is parsed in three tiers:
//!
//! 1. the whole reply (after code-fence stripping) as JSON,
//! 2. the first balanced brace-delimited substring,
//! 3. the schema default, marked as a soft error via [`ParseTier::Default`].
//!
//! Transport errors and timeouts land in tier 3 as well. The envelope never
//! panics and never returns an `Err` - degraded typed values are the error
//! channel, and callers substitute their own deterministic fallback content
//! when they see [`ParseTier::Default`].

use std::marker::PhantomData;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::error::{Error, Result};
use crate::core::language_models::{CallOptions, ChatModel};
use crate::core::messages::Message;

/// Render the JSON schema for `T`.
pub fn json_schema<T: JsonSchema>() -> Result<Value> {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(&schema)
        .map_err(|e| Error::OutputParsing(format!("failed to render schema: {e}")))
}

/// Render the format-instruction block appended to structured prompts.
#[must_use]
pub fn format_instructions(schema: &Value) -> String {
    let schema_json =
        serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    format!(
        "Your response must be valid JSON that conforms to this schema:\n\n\
         ```json\n{schema_json}\n```\n\n\
         Respond with ONLY the JSON object, no additional text or explanation."
    )
}

/// Strip a leading markdown code fence (```json ... ``` or ``` ... ```).
///
/// Returns the fenced content when a fence is found, the trimmed input
/// otherwise.
#[must_use]
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```") {
        let after_ticks = &trimmed[start + 3..];
        // Skip an optional language identifier line (e.g. "json")
        let content_start = after_ticks.find('\n').map(|i| i + 1).unwrap_or(0);
        let content = &after_ticks[content_start..];
        if let Some(end) = content.find("```") {
            return content[..end].trim();
        }
        return content.trim();
    }
    trimmed
}

/// Extract the first balanced brace-delimited substring.
///
/// The scanner starts at the first `{`, tracks brace depth, and accounts for
/// string literals and escape sequences so braces inside strings do not
/// unbalance the count. Returns the minimal balanced substring, or `None`
/// when no balanced object exists.
#[must_use]
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// How a structured reply was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseTier {
    /// The reply was structurally conformant as-is.
    Direct,
    /// The value was recovered from a brace-delimited substring.
    Extracted,
    /// Parsing failed entirely; the schema default was substituted.
    Default,
}

impl ParseTier {
    /// Whether the caller should treat the value as degraded.
    #[must_use]
    pub fn is_degraded(self) -> bool {
        matches!(self, Self::Default)
    }
}

/// A typed reply together with the tier that produced it.
#[derive(Clone, Debug)]
pub struct StructuredReply<T> {
    /// The parsed (or defaulted) value.
    pub value: T,
    /// Parse tier the value came from.
    pub tier: ParseTier,
}

impl<T> StructuredReply<T> {
    /// Whether the value is the schema default rather than model output.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.tier.is_degraded()
    }
}

/// A [`ChatModel`] wrapper that steers the model toward a schema and parses
/// replies into `T`.
pub struct StructuredChatModel<T> {
    model: Arc<dyn ChatModel>,
    schema: Value,
    instructions: String,
    options: CallOptions,
    _output: PhantomData<fn() -> T>,
}

impl<T> StructuredChatModel<T>
where
    T: DeserializeOwned + JsonSchema + Default + Send + Sync,
{
    /// Wrap a model with the schema for `T`.
    pub fn new(model: Arc<dyn ChatModel>) -> Result<Self> {
        let schema = json_schema::<T>()?;
        let instructions = format_instructions(&schema);
        Ok(Self {
            model,
            schema,
            instructions,
            options: CallOptions::default(),
            _output: PhantomData,
        })
    }

    /// Override the call options used for every invocation.
    #[must_use]
    pub fn with_options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    /// The JSON schema steering the model.
    #[must_use]
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Call the model once and parse the reply.
    pub async fn invoke(&self, prompt: &str) -> StructuredReply<T> {
        let full_prompt = format!("{prompt}\n\n{}", self.instructions);
        let messages = [Message::human(full_prompt)];
        match self.model.generate(&messages, &self.options).await {
            Ok(result) => {
                let text = result.first_text().unwrap_or_default();
                self.parse_reply(text)
            }
            Err(e) => {
                warn!(model = self.model.llm_type(), error = %e, "model call failed, using schema default");
                StructuredReply {
                    value: T::default(),
                    tier: ParseTier::Default,
                }
            }
        }
    }

    /// Parse a raw reply through the three tiers.
    pub fn parse_reply(&self, reply: &str) -> StructuredReply<T> {
        let stripped = strip_code_fences(reply);

        if let Ok(value) = serde_json::from_str::<T>(stripped) {
            return StructuredReply {
                value,
                tier: ParseTier::Direct,
            };
        }

        if let Some(candidate) = extract_json(stripped) {
            if let Ok(value) = serde_json::from_str::<T>(candidate) {
                debug!("recovered structured reply from brace-delimited substring");
                return StructuredReply {
                    value,
                    tier: ParseTier::Extracted,
                };
            }
        }

        warn!(
            reply_len = reply.len(),
            "reply did not conform to schema, using schema default"
        );
        StructuredReply {
            value: T::default(),
            tier: ParseTier::Default,
        }
    }
}
