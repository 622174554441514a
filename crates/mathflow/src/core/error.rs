//! Error types shared across the tutoring core.
//!
//! Nodes inside the workflow never surface these errors to the caller of
//! [`crate::pipeline::TutorPipeline::run`]; they degrade in place and record
//! a state tag instead. The variants below exist for the seams where a
//! `Result` is the honest signature: graph assembly, template formatting,
//! model transports, and the structured-output parser.

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the tutoring core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The graph was assembled inconsistently (unknown edge target, missing
    /// entry point, duplicate node id).
    #[error("graph configuration error: {0}")]
    GraphConfig(String),

    /// A node function returned an error the engine could not absorb.
    #[error("node '{node}' failed: {message}")]
    NodeExecution {
        /// Id of the failing node.
        node: String,
        /// Human-readable failure description.
        message: String,
    },

    /// The engine step backstop fired. The supervisor hop cap is expected to
    /// terminate every conversation well before this triggers.
    #[error("graph exceeded step limit of {0}")]
    StepLimitExceeded(usize),

    /// Transport-level failure talking to the language model.
    #[error("language model error: {0}")]
    LanguageModel(String),

    /// The model reply could not be coerced into the requested schema.
    #[error("output parsing error: {0}")]
    OutputParsing(String),

    /// The retriever backend failed.
    #[error("retriever error: {0}")]
    Retriever(String),

    /// A prompt template could not be built or formatted.
    #[error("prompt error: {0}")]
    Prompt(String),

    /// Anything that does not fit the variants above.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand used by node closures when adapting foreign errors.
    pub fn node(node: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::NodeExecution {
            node: node.into(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_context() {
        let err = Error::node("retriever", "vector store unreachable");
        assert_eq!(
            err.to_string(),
            "node 'retriever' failed: vector store unreachable"
        );
    }

    #[test]
    fn test_step_limit_message() {
        assert_eq!(
            Error::StepLimitExceeded(64).to_string(),
            "graph exceeded step limit of 64"
        );
    }
}
