//! Supervisor: decides which agent runs next.
//!
//! LM-first with a deterministic rule engine behind it. The model sees the
//! BDI context, the learner profile, the recent history, the current state
//! tag, and which responses already exist; its decision is validated against
//! the allowed routing set. A degraded envelope or an invalid choice falls
//! back to the rule engine, so routing is always deterministic under
//! failure.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use crate::agents::routing;
use crate::agents::schemas::SupervisorDecision;
use crate::agents::{render_context, render_history};
use crate::core::error::Result;
use crate::core::language_models::structured::StructuredChatModel;
use crate::core::language_models::ChatModel;
use crate::core::prompts::PromptTemplate;
use crate::state::{tags, ConversationState, Role, SpecialistId, TurnRecord};

/// Exam-intent keywords, whole-word matched after normalization.
pub const EXAM_KEYWORDS: [&str; 10] = [
    "exam", "quiz", "test", "evaluation", "questions", "practice", "exercises", "create",
    "generate", "make an",
];

/// Math-explanation keywords, whole-word matched after normalization.
pub const MATH_KEYWORDS: [&str; 10] = [
    "explain", "what is", "how", "theorem", "formula", "concept", "definition", "solve",
    "prove", "solution",
];

const SUPERVISOR_PROMPT: &str = "\
You are a supervising math tutor with a BDI architecture.

CURRENT BDI CONTEXT:
- Beliefs about the learner: {beliefs}
- Learning goals: {desires}
- Current action plan: {intentions}

LEARNER STATE:
- Level: {comprehension_level}
- Mastered topics: {mastered_topics}
- Difficulty areas: {struggle_topics}
- Recurring errors: {error_history}

CONVERSATION CONTEXT:
- Initial query: {query}
- Recent interactions:
{recent_interactions}
- Retrieved context:
{retrieved_context}

PIPELINE STATE:
- Current state tag: {state_tag}
- math_expert response exists: {has_math_response}
- exam_creator response exists: {has_exam_response}
- planning response exists: {has_planning_response}
- Needs external search: {needs_external_search}

AVAILABLE AGENTS:
- math_expert: deep, rigorous math explanations
- exam_creator: exams, quizzes, evaluations, practice questions
- planning: personalized study plans from the learner's knowledge profile
- evaluator: assess the quality of a generated response
- FINISH: the query is fully resolved and ready to deliver

DECISION RULES:
1. If the query asks to create an exam/quiz/practice and no exam exists, use exam_creator
2. If the query asks for a study plan or schedule, use planning
3. A generated response must always be evaluated exactly once before FINISH
4. If the last response was evaluated, use FINISH
5. If nothing applies, use math_expert

Analyze the query and the pipeline state, then pick the single most
appropriate next agent.";

/// Normalize for keyword matching: lowercase, punctuation to spaces,
/// collapsed whitespace, padded with one space on both ends.
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push(' ');
    let mut last_space = true;
    for c in text.chars() {
        if c.is_alphanumeric() {
            for lower in c.to_lowercase() {
                out.push(lower);
            }
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    if !last_space {
        out.push(' ');
    }
    out
}

/// Whole-word match of any keyword (single- or multi-word) in the query.
#[must_use]
pub fn matches_any_keyword(query: &str, keywords: &[&str]) -> bool {
    let haystack = normalize(query);
    keywords
        .iter()
        .any(|kw| haystack.contains(&format!(" {kw} ")))
}

/// Deterministic routing rules, used as the LM fallback.
///
/// The rules are ordered; the first match wins:
/// 1. exam keywords and no exam response yet -> `exam_creator`
/// 2. math keywords and neither a math nor an exam response -> `math_expert`
/// 3. exam response exists and not yet evaluated -> `evaluator`
/// 4. math response exists and not yet evaluated -> `evaluator`
/// 5. an evaluation tag is set -> `FINISH`
/// 6. any response exists -> `FINISH`
/// 7. default -> `math_expert`
#[must_use]
pub fn rule_based_decision(state: &ConversationState) -> SupervisorDecision {
    let query = &state.initial_query;
    let tag = state.control.current_state_tag.as_str();
    let has_exam = state.responses.get(SpecialistId::ExamCreator).is_some();
    let has_math = state.responses.get(SpecialistId::MathExpert).is_some();

    if matches_any_keyword(query, &EXAM_KEYWORDS) && !has_exam {
        return SupervisorDecision::new(
            routing::EXAM_CREATOR,
            "The query asks for an exam or evaluation",
            0.9,
        );
    }

    if matches_any_keyword(query, &MATH_KEYWORDS) && !has_math && !has_exam {
        return SupervisorDecision::new(
            routing::MATH_EXPERT,
            "The query asks for a math explanation and none exists yet",
            0.9,
        );
    }

    if has_exam && !matches!(tag, tags::EVALUATOR_DONE | tags::EXAM_CREATOR_EVALUATED) {
        return SupervisorDecision::new(
            routing::EVALUATOR,
            "An exam response exists and needs its single evaluation",
            0.8,
        );
    }

    if has_math && !matches!(tag, tags::EVALUATOR_DONE | tags::MATH_EXPERT_EVALUATED) {
        return SupervisorDecision::new(
            routing::EVALUATOR,
            "A math response exists and needs its single evaluation",
            0.8,
        );
    }

    if matches!(
        tag,
        tags::EVALUATOR_DONE | tags::MATH_EXPERT_EVALUATED | tags::EXAM_CREATOR_EVALUATED
    ) {
        return SupervisorDecision::new(
            routing::FINISH,
            "The response has been evaluated, the process is complete",
            0.9,
        );
    }

    if state.responses.any() {
        return SupervisorDecision::new(
            routing::FINISH,
            "A response is already available",
            0.9,
        );
    }

    SupervisorDecision::new(
        routing::MATH_EXPERT,
        "No responses available, defaulting to the math explainer",
        0.7,
    )
}

/// The supervisor agent.
pub struct Supervisor {
    structured: StructuredChatModel<SupervisorDecision>,
    prompt: PromptTemplate,
    max_steps: u32,
}

impl Supervisor {
    /// Create a supervisor with the given hop cap.
    pub fn new(model: Arc<dyn ChatModel>, max_steps: u32) -> Result<Self> {
        Ok(Self {
            structured: StructuredChatModel::new(model)?,
            prompt: PromptTemplate::from_template(SUPERVISOR_PROMPT)?,
            max_steps,
        })
    }

    /// Decide the next agent for the current state.
    pub async fn decide(&self, state: &ConversationState) -> SupervisorDecision {
        let (beliefs, desires, intentions) = match &state.bdi {
            Some(bdi) => (
                json!(bdi.beliefs).to_string(),
                json!(bdi.desires).to_string(),
                json!(bdi.intentions).to_string(),
            ),
            None => ("{}".to_string(), "[]".to_string(), "{}".to_string()),
        };
        let profile = &state.student_profile;

        let inputs = HashMap::from([
            ("beliefs".to_string(), beliefs),
            ("desires".to_string(), desires),
            ("intentions".to_string(), intentions),
            (
                "comprehension_level".to_string(),
                profile.comprehension_level.to_string(),
            ),
            ("mastered_topics".to_string(), profile.mastered_topics.join(", ")),
            ("struggle_topics".to_string(), profile.struggle_topics.join(", ")),
            ("error_history".to_string(), profile.error_history.join("; ")),
            ("query".to_string(), state.initial_query.clone()),
            (
                "recent_interactions".to_string(),
                render_history(state.recent_turns(3)),
            ),
            (
                "retrieved_context".to_string(),
                render_context(&state.retrieved_context),
            ),
            (
                "state_tag".to_string(),
                state.control.current_state_tag.clone(),
            ),
            (
                "has_math_response".to_string(),
                state.responses.math_expert.is_some().to_string(),
            ),
            (
                "has_exam_response".to_string(),
                state.responses.exam_creator.is_some().to_string(),
            ),
            (
                "has_planning_response".to_string(),
                state.responses.planning.is_some().to_string(),
            ),
            (
                "needs_external_search".to_string(),
                state.control.needs_external_search.to_string(),
            ),
        ]);

        let reply = self.structured.invoke(&self.prompt.format(&inputs)).await;
        if reply.is_degraded() {
            warn!("supervisor envelope degraded, falling back to rule engine");
            return rule_based_decision(state);
        }

        let mut decision = reply.value;
        if !routing::ALLOWED.contains(&decision.next_agent.as_str()) {
            warn!(choice = %decision.next_agent, "invalid routing choice, falling back to rule engine");
            return rule_based_decision(state);
        }
        decision.confidence = decision.confidence.clamp(0.0, 1.0);
        decision
    }

    /// Run one supervisor hop: decide, update BDI and control, record the
    /// routing turn. Forces `FINISH` once the hop cap is reached.
    pub async fn run(&self, mut state: ConversationState) -> ConversationState {
        let decision = if state.control.supervisor_hops >= self.max_steps {
            warn!(
                hops = state.control.supervisor_hops,
                cap = self.max_steps,
                "supervisor hop cap reached, forcing FINISH"
            );
            state.control.step_cap_reached = true;
            SupervisorDecision::new(
                routing::FINISH,
                "Step cap reached; delivering the best available response",
                1.0,
            )
        } else {
            self.decide(&state).await
        };

        info!(
            next = %decision.next_agent,
            confidence = decision.confidence,
            "supervisor decision"
        );

        let bdi = state.bdi_mut();
        bdi.beliefs
            .insert("last_decision".to_string(), json!(decision.next_agent));
        bdi.beliefs
            .insert("decision_confidence".to_string(), json!(decision.confidence));
        bdi.beliefs
            .insert("reasoning".to_string(), json!(decision.reasoning));
        bdi.intentions
            .insert("current_action".to_string(), json!(decision.next_agent));
        bdi.intentions.insert(
            "expected_outcome".to_string(),
            json!(format!("Run {}", decision.next_agent)),
        );

        state.push_turn(
            TurnRecord::new(Role::Supervisor, format!("Routing to {}", decision.next_agent))
                .with_metadata(json!({
                    "reasoning": decision.reasoning,
                    "confidence": decision.confidence,
                })),
        );

        state.control.current_state_tag = tags::supervisor_chose(&decision.next_agent);
        state.control.next_agent = Some(decision.next_agent);
        state.control.supervisor_hops += 1;
        state
    }
}
