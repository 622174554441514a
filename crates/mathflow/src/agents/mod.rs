//! Workflow agents: the supervisor router and the specialists.
//!
//! Each agent exposes an infallible `run(state) -> state`: failures degrade
//! into deterministic fallback content and a state tag, never into an error
//! the graph has to absorb.

pub mod evaluator;
pub mod exam_creator;
pub mod math_expert;
pub mod planning;
pub mod schemas;
pub mod supervisor;

use crate::core::retrievers::ScoredPassage;
use crate::state::TurnRecord;

/// Routing keys shared by the supervisor, the graph topology, and tests.
pub mod routing {
    /// Route to the math explainer.
    pub const MATH_EXPERT: &str = "math_expert";
    /// Route to the exam creator.
    pub const EXAM_CREATOR: &str = "exam_creator";
    /// Route to the study planner.
    pub const PLANNING: &str = "planning";
    /// Route to the evaluator.
    pub const EVALUATOR: &str = "evaluator";
    /// Terminate and compose the final response.
    pub const FINISH: &str = "FINISH";

    /// Every key the supervisor may emit.
    pub const ALLOWED: [&str; 5] = [MATH_EXPERT, EXAM_CREATOR, PLANNING, EVALUATOR, FINISH];
}

/// Render retrieved passages for a prompt, best first.
#[must_use]
pub(crate) fn render_context(passages: &[ScoredPassage]) -> String {
    if passages.is_empty() {
        return "(no retrieved context)".to_string();
    }
    passages
        .iter()
        .enumerate()
        .map(|(i, p)| format!("[{}] (score {:.2}) {}", i + 1, p.score, p.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render recent turns for a prompt, oldest first.
#[must_use]
pub(crate) fn render_history(turns: &[TurnRecord]) -> String {
    if turns.is_empty() {
        return "(no previous turns)".to_string();
    }
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role, truncate(&t.content, 300)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Truncate to `max` characters on a char boundary, appending an ellipsis.
#[must_use]
pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Role;

    #[test]
    fn test_render_context_empty_and_ordered() {
        assert_eq!(render_context(&[]), "(no retrieved context)");
        let rendered = render_context(&[
            ScoredPassage::new("first", 0.9),
            ScoredPassage::new("second", 0.5),
        ]);
        assert!(rendered.contains("[1] (score 0.90) first"));
        assert!(rendered.contains("[2] (score 0.50) second"));
    }

    #[test]
    fn test_render_history_roles() {
        let turns = vec![
            TurnRecord::new(Role::User, "hi"),
            TurnRecord::new(Role::MathExpert, "an explanation"),
        ];
        let rendered = render_history(&turns);
        assert!(rendered.starts_with("user: hi"));
        assert!(rendered.contains("math_expert: an explanation"));
    }

    #[test]
    fn test_truncate_char_boundary() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefgh", 3), "abc...");
        // Multi-byte characters are not split
        assert_eq!(truncate("ááááá", 2), "áá...");
    }
}
