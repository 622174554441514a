//! Math explainer specialist.
//!
//! Produces a personalized explanation with formulas and related concepts.
//! When the query refers back to the conversation ("exercise 2", "your
//! exam", "the previous explanation"), the prompt is built from the
//! conversational context only and the retrieved passages are ignored for
//! that turn. After answering, the knowledge analyzer updates the learner's
//! profile from the interaction.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::json;
use tracing::{info, warn};

use crate::agents::schemas::{DifficultyLevel, MathExpertReply};
use crate::agents::{render_context, render_history, truncate};
use crate::core::error::Result;
use crate::core::language_models::structured::StructuredChatModel;
use crate::core::language_models::ChatModel;
use crate::core::prompts::PromptTemplate;
use crate::knowledge::analyzer::KnowledgeAnalyzer;
use crate::knowledge::ComprehensionLevel;
use crate::state::{tags, ConversationState, Role, SpecialistId, TurnRecord};

const MATH_EXPERT_PROMPT: &str = "\
You are a mathematics expert with a personalized pedagogical approach.

LEARNER PROFILE:
- Comprehension level: {comprehension_level}
- Topics already mastered: {mastered_topics}
- Known difficulty areas: {struggle_topics}
- Historical errors: {error_history}
- Learning preferences: {preferences}

QUERY CONTEXT:
- Original query: {query}
- Context:
{context}
- Recent conversation:
{recent_history}

PEDAGOGICAL INSTRUCTIONS:
1. Adapt the explanation to the learner's level
2. Connect to prior knowledge (mastered topics)
3. Anticipate confusion based on historical errors
4. Provide relevant formulas and related concepts

REFERENCE HANDLING:
1. If the query refers to something from the previous conversation (such as
   \"exercise 1\" or \"your exam\"), answer ONLY from the conversational
   context above and say what you are referring to
2. Otherwise ground the explanation in the provided context";

/// Anaphora cues: the query talks about something already in the
/// conversation.
const ANAPHORA_PHRASES: [&str; 8] = [
    "previous",
    "earlier",
    "your exam",
    "that exam",
    "the exam you",
    "you created",
    "you generated",
    "the theorem",
];

#[allow(clippy::unwrap_used)]
fn exercise_reference() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // The pattern is a literal; compilation cannot fail at runtime.
    PATTERN.get_or_init(|| Regex::new(r"(?i)\b(exercise|question|problem)\s*#?\s*\d+").unwrap())
}

/// Whether the query refers back to the conversation.
#[must_use]
pub fn is_anaphoric(query: &str) -> bool {
    let lowered = query.to_lowercase();
    ANAPHORA_PHRASES.iter().any(|p| lowered.contains(p))
        || exercise_reference().is_match(query)
}

/// The math explainer agent.
pub struct MathExpert {
    structured: StructuredChatModel<MathExpertReply>,
    analyzer: KnowledgeAnalyzer,
    prompt: PromptTemplate,
}

impl MathExpert {
    /// Create the agent.
    pub fn new(model: Arc<dyn ChatModel>) -> Result<Self> {
        Ok(Self {
            structured: StructuredChatModel::new(Arc::clone(&model))?,
            analyzer: KnowledgeAnalyzer::new(model)?,
            prompt: PromptTemplate::from_template(MATH_EXPERT_PROMPT)?,
        })
    }

    /// Collect prior agent outputs the query might refer to: the last few
    /// exam/explanation turns, whatever routing turns sit between them.
    fn conversational_context(state: &ConversationState) -> String {
        let mut parts = Vec::new();
        for turn in &state.chat_history {
            match turn.role {
                Role::ExamCreator => {
                    let exam_id = turn
                        .metadata
                        .get("exam_id")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown");
                    parts.push(format!(
                        "PREVIOUSLY CREATED EXAM (id {exam_id}):\n{}",
                        turn.content
                    ));
                }
                Role::MathExpert => {
                    parts.push(format!(
                        "PREVIOUS EXPLANATION:\n{}",
                        truncate(&turn.content, 300)
                    ));
                }
                _ => {}
            }
        }
        let keep = parts.len().saturating_sub(3);
        parts.split_off(keep).join("\n\n")
    }

    /// Deterministic reply used when the envelope degrades.
    fn fallback_reply(query: &str, level: ComprehensionLevel) -> MathExpertReply {
        let (explanation, difficulty) = match level {
            ComprehensionLevel::Beginner => (
                format!(
                    "Let's build \"{query}\" up from the basics.\n\n\
                     1. Start with the definitions of each term involved.\n\
                     2. Work through one small numeric example by hand.\n\
                     3. Restate the idea in your own words to check understanding.\n\n\
                     Once these steps feel comfortable, ask for a worked example to go deeper."
                ),
                DifficultyLevel::Basic,
            ),
            ComprehensionLevel::Intermediate => (
                format!(
                    "Here is a structured path through \"{query}\".\n\n\
                     1. Review the formal definition and the conditions under which it applies.\n\
                     2. Work through a standard procedure step by step.\n\
                     3. Try a variation that changes one assumption and see what breaks.\n\n\
                     Ask for a practice exercise when you are ready to test yourself."
                ),
                DifficultyLevel::Intermediate,
            ),
            ComprehensionLevel::Advanced => (
                format!(
                    "An outline for mastering \"{query}\" at depth.\n\n\
                     1. State the result precisely, including all hypotheses.\n\
                     2. Sketch the proof strategy and identify the key lemma.\n\
                     3. Explore edge cases where the hypotheses fail.\n\n\
                     Ask for a proof walkthrough if any step needs support."
                ),
                DifficultyLevel::Advanced,
            ),
        };
        MathExpertReply {
            explanation,
            formulas: Vec::new(),
            difficulty,
            related_concepts: Vec::new(),
        }
    }

    /// Canonical markdown render of a reply.
    fn render_reply(reply: &MathExpertReply) -> String {
        let mut out = reply.explanation.clone();
        let formulas: Vec<&str> = reply
            .formulas
            .iter()
            .map(String::as_str)
            .filter(|f| !f.trim().is_empty())
            .collect();
        if !formulas.is_empty() {
            out.push_str("\n\n**Key formulas:**\n");
            for formula in formulas {
                out.push_str(&format!("- {formula}\n"));
            }
        }
        let concepts: Vec<&str> = reply
            .related_concepts
            .iter()
            .map(String::as_str)
            .filter(|c| !c.trim().is_empty())
            .collect();
        if !concepts.is_empty() {
            out.push_str(&format!("\n**Related concepts:** {}", concepts.join(", ")));
        }
        out
    }

    /// Promote the profile from the produced reply.
    fn update_profile(state: &mut ConversationState, reply: &MathExpertReply) {
        if reply.difficulty == DifficultyLevel::Basic {
            for concept in &reply.related_concepts {
                let concept = concept.trim();
                if !concept.is_empty()
                    && !state.student_profile.mastered_topics.iter().any(|t| t == concept)
                {
                    state.student_profile.mastered_topics.push(concept.to_string());
                }
            }
        }
        if reply.difficulty == DifficultyLevel::Advanced
            && state.student_profile.comprehension_level == ComprehensionLevel::Beginner
        {
            state.student_profile.comprehension_level = ComprehensionLevel::Intermediate;
        }
    }

    /// Produce an explanation and update the learner profile.
    pub async fn run(&self, mut state: ConversationState) -> ConversationState {
        info!(query = %state.initial_query, "math expert running");

        let conversational = Self::conversational_context(&state);
        let anaphoric = is_anaphoric(&state.initial_query);
        let use_conversational = anaphoric && !conversational.is_empty();

        let context = if use_conversational {
            // The query points at the conversation; retrieved passages are
            // ignored for this turn.
            conversational
        } else {
            render_context(&state.retrieved_context)
        };

        let profile = &state.student_profile;
        let inputs = HashMap::from([
            (
                "comprehension_level".to_string(),
                profile.comprehension_level.to_string(),
            ),
            ("mastered_topics".to_string(), profile.mastered_topics.join(", ")),
            ("struggle_topics".to_string(), profile.struggle_topics.join(", ")),
            ("error_history".to_string(), profile.error_history.join("; ")),
            ("preferences".to_string(), json!(profile.preferences).to_string()),
            ("query".to_string(), state.initial_query.clone()),
            ("context".to_string(), context),
            (
                "recent_history".to_string(),
                render_history(state.recent_turns(5)),
            ),
        ]);

        let reply = self.structured.invoke(&self.prompt.format(&inputs)).await;
        // Blank explanations degrade like a schema default
        let degraded = reply.is_degraded() || reply.value.explanation.trim().is_empty();
        let reply = if degraded {
            warn!("math expert envelope degraded, using fallback template");
            Self::fallback_reply(&state.initial_query, profile.comprehension_level)
        } else {
            reply.value
        };

        let rendered = Self::render_reply(&reply);
        state.responses.set(SpecialistId::MathExpert, rendered.clone());
        state.control.current_state_tag = tags::done(SpecialistId::MathExpert.as_str());

        state.push_turn(
            TurnRecord::new(Role::MathExpert, rendered).with_metadata(json!({
                "formulas": reply.formulas,
                "difficulty": reply.difficulty,
                "related_concepts": reply.related_concepts,
                "used_conversational_context": use_conversational,
                "degraded": degraded,
            })),
        );

        Self::update_profile(&mut state, &reply);
        self.analyzer.update_from_interaction(&mut state).await;

        info!(difficulty = %reply.difficulty, "math expert finished");
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FailingChatModel, ScriptedChatModel};

    #[test]
    fn test_anaphora_detection() {
        assert!(is_anaphoric("Explain exercise 2 of your exam"));
        assert!(is_anaphoric("what about question 3?"));
        assert!(is_anaphoric("go back to the previous explanation"));
        assert!(is_anaphoric("prove the theorem again"));
        assert!(!is_anaphoric("Explain the chain rule"));
    }

    #[test]
    fn test_render_reply_sections() {
        let reply = MathExpertReply {
            explanation: "The square of the hypotenuse...".to_string(),
            formulas: vec!["a^2 + b^2 = c^2".to_string(), "  ".to_string()],
            difficulty: DifficultyLevel::Basic,
            related_concepts: vec!["right triangles".to_string()],
        };
        let rendered = MathExpert::render_reply(&reply);
        assert!(rendered.starts_with("The square of the hypotenuse"));
        assert!(rendered.contains("**Key formulas:**"));
        assert!(rendered.contains("- a^2 + b^2 = c^2"));
        assert!(rendered.contains("**Related concepts:** right triangles"));
        // Blank formulas are dropped
        assert_eq!(rendered.matches("- ").count(), 1);
    }

    #[test]
    fn test_render_reply_plain_when_no_extras() {
        let reply = MathExpertReply {
            explanation: "Just words.".to_string(),
            ..MathExpertReply::default()
        };
        assert_eq!(MathExpert::render_reply(&reply), "Just words.");
    }

    #[test]
    fn test_fallback_keyed_by_level() {
        let beginner = MathExpert::fallback_reply("limits", ComprehensionLevel::Beginner);
        let advanced = MathExpert::fallback_reply("limits", ComprehensionLevel::Advanced);
        assert!(beginner.explanation.contains("limits"));
        assert_ne!(beginner.explanation, advanced.explanation);
        assert_eq!(beginner.difficulty, DifficultyLevel::Basic);
        assert_eq!(advanced.difficulty, DifficultyLevel::Advanced);
    }

    #[tokio::test]
    async fn test_run_produces_response_and_turn() {
        let model = ScriptedChatModel::new([
            // Explanation reply, then knowledge analysis reply
            r#"{"explanation": "A limit describes approach behavior.",
                "formulas": ["lim_{x->a} f(x)"], "difficulty": "intermediate",
                "related_concepts": ["continuity"]}"#,
            r#"{"areas_analyzed": ["limits_continuity"], "knowledge_updates": {},
                "overall_assessment": "ok", "recommendations": []}"#,
        ]);
        let agent = MathExpert::new(Arc::new(model)).unwrap();
        let state = agent.run(ConversationState::new("Explain limits")).await;

        let response = state.responses.get(SpecialistId::MathExpert).unwrap();
        assert!(response.contains("approach behavior"));
        assert!(response.contains("lim_{x->a} f(x)"));
        assert_eq!(state.control.current_state_tag, "math_expert_done");
        let turn = state
            .chat_history
            .iter()
            .find(|t| t.role == Role::MathExpert)
            .unwrap();
        assert_eq!(turn.metadata["difficulty"], json!("intermediate"));
        assert_eq!(turn.metadata["degraded"], json!(false));
    }

    #[tokio::test]
    async fn test_run_degraded_uses_fallback() {
        let agent = MathExpert::new(Arc::new(FailingChatModel::new())).unwrap();
        let state = agent
            .run(ConversationState::new("Explain the chain rule"))
            .await;
        let response = state.responses.get(SpecialistId::MathExpert).unwrap();
        assert!(response.contains("Explain the chain rule"));
        assert_eq!(state.control.current_state_tag, "math_expert_done");
        let turn = state
            .chat_history
            .iter()
            .find(|t| t.role == Role::MathExpert)
            .unwrap();
        assert_eq!(turn.metadata["degraded"], json!(true));
    }

    #[tokio::test]
    async fn test_anaphoric_run_quotes_prior_exam_and_ignores_retrieval() {
        let model = Arc::new(
            ScriptedChatModel::new([
                r#"{"explanation": "Exercise 2 asks you to factor the quadratic.",
                    "formulas": [], "difficulty": "basic", "related_concepts": []}"#,
            ])
            .with_repeat_last(),
        );
        let agent = MathExpert::new(Arc::clone(&model) as Arc<dyn ChatModel>).unwrap();

        let mut state = ConversationState::new("Explain exercise 2 of your exam");
        state.retrieved_context = vec![crate::core::retrievers::ScoredPassage::new(
            "UNRELATED RETRIEVED PASSAGE",
            0.99,
        )];
        state.push_turn(
            TurnRecord::new(Role::ExamCreator, "# Quadratics Quiz\n**2.** Factor x^2-5x+6")
                .with_metadata(json!({"exam_id": "exam-1234"})),
        );

        let state = agent.run(state).await;
        assert!(state.responses.get(SpecialistId::MathExpert).is_some());

        let prompts = model.recorded_prompts();
        let first_prompt = &prompts[0];
        assert!(first_prompt.contains("exam-1234"));
        assert!(first_prompt.contains("Factor x^2-5x+6"));
        assert!(!first_prompt.contains("UNRELATED RETRIEVED PASSAGE"));
    }

    #[tokio::test]
    async fn test_profile_promotion_on_basic_reply() {
        let model = ScriptedChatModel::new([
            r#"{"explanation": "Addition combines quantities.", "formulas": [],
                "difficulty": "basic", "related_concepts": ["counting", "number line"]}"#,
        ]);
        let agent = MathExpert::new(Arc::new(model)).unwrap();
        let state = agent.run(ConversationState::new("Explain addition")).await;
        assert!(state
            .student_profile
            .mastered_topics
            .contains(&"counting".to_string()));
        assert!(state
            .student_profile
            .mastered_topics
            .contains(&"number line".to_string()));
    }
}
