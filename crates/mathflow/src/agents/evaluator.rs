//! Quality evaluator.
//!
//! Picks the response to score under a strict precedence (a fresh exam
//! first, then a plan, then a fresh explanation, then whatever is left
//! unevaluated), scores it along five axes, and records the verdict in the
//! control flags and the history. Plans are scored but never receive
//! improvement suggestions.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use crate::agents::schemas::{OverallQuality, ResponseEvaluation};
use crate::agents::render_context;
use crate::core::error::Result;
use crate::core::language_models::structured::StructuredChatModel;
use crate::core::language_models::ChatModel;
use crate::core::prompts::PromptTemplate;
use crate::state::{tags, ConversationState, ResponseQuality, Role, SpecialistId, TurnRecord};

const EVALUATOR_PROMPT: &str = "\
You are an expert evaluator of mathematical education and response quality.

RESPONSE TO EVALUATE:
Original query: {query}
Generated response:
{response}
Context used:
{context}

LEARNER PROFILE:
- Comprehension level: {comprehension_level}
- Mastered topics: {mastered_topics}
- Difficulty areas: {struggle_topics}

EVALUATION CRITERIA:
1. Mathematical correctness: is the response mathematically right?
2. Pedagogical clarity: is it understandable at the learner's level?
3. Completeness: does it fully answer the query?
4. Relevance: does it fit the query and the context?
5. Adaptation: is it tailored to the learner profile?

INSTRUCTIONS:
- Score each criterion objectively in [0, 1]
- If the response is a study plan, do not propose improvements
- Decide whether the response is sufficient or needs more work
- Flag whether more context or information is needed";

/// The evaluator agent.
pub struct Evaluator {
    structured: StructuredChatModel<ResponseEvaluation>,
    prompt: PromptTemplate,
}

impl Evaluator {
    /// Create the agent.
    pub fn new(model: Arc<dyn ChatModel>) -> Result<Self> {
        Ok(Self {
            structured: StructuredChatModel::new(model)?,
            prompt: PromptTemplate::from_template(EVALUATOR_PROMPT)?,
        })
    }

    /// Choose the response to evaluate.
    ///
    /// Precedence: a fresh exam (state tag starts with `exam_creator`),
    /// then any plan, then a fresh explanation (tag starts with
    /// `math_expert`), then whatever exists and has not been evaluated.
    #[must_use]
    pub fn select_target(state: &ConversationState) -> Option<(String, SpecialistId)> {
        let tag = state.control.current_state_tag.as_str();

        if tag.starts_with("exam_creator") {
            if let Some(exam) = state.responses.get(SpecialistId::ExamCreator) {
                return Some((exam.to_string(), SpecialistId::ExamCreator));
            }
        }

        if let Some(plan) = state.responses.get(SpecialistId::Planning) {
            return Some((plan.to_string(), SpecialistId::Planning));
        }

        if tag.starts_with("math_expert") {
            if let Some(explanation) = state.responses.get(SpecialistId::MathExpert) {
                return Some((explanation.to_string(), SpecialistId::MathExpert));
            }
        }

        if !matches!(tag, tags::MATH_EXPERT_EVALUATED | tags::EVALUATOR_DONE) {
            if let Some(explanation) = state.responses.get(SpecialistId::MathExpert) {
                return Some((explanation.to_string(), SpecialistId::MathExpert));
            }
        }

        if !matches!(tag, tags::EXAM_CREATOR_EVALUATED | tags::EVALUATOR_DONE) {
            if let Some(exam) = state.responses.get(SpecialistId::ExamCreator) {
                return Some((exam.to_string(), SpecialistId::ExamCreator));
            }
        }

        None
    }

    /// Neutral-positive evaluation used when the envelope degrades.
    fn fallback_evaluation() -> ResponseEvaluation {
        ResponseEvaluation {
            is_sufficient: true,
            correctness_score: 0.7,
            clarity_score: 0.7,
            completeness_score: 0.7,
            relevance_score: 0.7,
            adaptation_score: 0.7,
            needs_more_context: false,
            improvement_suggestions: vec!["Response generated successfully".to_string()],
            overall_quality: OverallQuality::Acceptable,
        }
    }

    /// Evaluate the selected response and record the verdict.
    pub async fn run(&self, mut state: ConversationState) -> ConversationState {
        let Some((response, target)) = Self::select_target(&state) else {
            warn!("no response available to evaluate");
            state.control.current_state_tag = tags::EVALUATOR_NO_CONTENT.to_string();
            return state;
        };
        info!(target = %target, "evaluator running");

        let profile = &state.student_profile;
        let inputs = HashMap::from([
            ("query".to_string(), state.initial_query.clone()),
            ("response".to_string(), response),
            (
                "context".to_string(),
                render_context(&state.retrieved_context),
            ),
            (
                "comprehension_level".to_string(),
                profile.comprehension_level.to_string(),
            ),
            ("mastered_topics".to_string(), profile.mastered_topics.join(", ")),
            ("struggle_topics".to_string(), profile.struggle_topics.join(", ")),
        ]);

        let reply = self.structured.invoke(&self.prompt.format(&inputs)).await;
        let mut evaluation = if reply.is_degraded() {
            warn!("evaluator envelope degraded, using neutral evaluation");
            Self::fallback_evaluation()
        } else {
            reply.value
        };
        evaluation.clamp_scores();

        // Plans are scored but never get improvement suggestions
        if target == SpecialistId::Planning {
            evaluation.improvement_suggestions.clear();
        }

        state.control.needs_external_search = evaluation.needs_more_context;
        state.control.response_quality = Some(if evaluation.is_sufficient {
            ResponseQuality::Sufficient
        } else {
            ResponseQuality::Insufficient
        });

        state.push_turn(
            TurnRecord::new(
                Role::Evaluator,
                format!("Evaluation complete: {}", evaluation.overall_quality.as_str()),
            )
            .with_metadata(json!({
                "evaluation": {
                    "target": target,
                    "is_sufficient": evaluation.is_sufficient,
                    "overall_quality": evaluation.overall_quality,
                    "scores": {
                        "correctness": evaluation.correctness_score,
                        "clarity": evaluation.clarity_score,
                        "completeness": evaluation.completeness_score,
                        "relevance": evaluation.relevance_score,
                        "adaptation": evaluation.adaptation_score,
                    },
                    "suggestions": evaluation.improvement_suggestions,
                    "needs_more_context": evaluation.needs_more_context,
                },
            })),
        );

        state.control.current_state_tag = match target {
            SpecialistId::ExamCreator => tags::EXAM_CREATOR_EVALUATED.to_string(),
            SpecialistId::MathExpert => tags::MATH_EXPERT_EVALUATED.to_string(),
            SpecialistId::Planning => tags::EVALUATOR_DONE.to_string(),
        };

        info!(
            quality = evaluation.overall_quality.as_str(),
            sufficient = evaluation.is_sufficient,
            "evaluator finished"
        );
        state
    }
}
