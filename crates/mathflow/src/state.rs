//! Conversation state threaded through the workflow graph.
//!
//! One [`ConversationState`] is created at request entry, mutated only by
//! node functions, and dropped when the request returns. Every field is a
//! plain serde record, so the whole state serializes to JSON for callers
//! that persist conversations externally.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::retrievers::ScoredPassage;
use crate::knowledge::{ComprehensionLevel, KnowledgeProfile};

/// State tags recording the last significant event of a conversation.
///
/// Tags for agent completion/errors are composed with [`tags::done`] and
/// [`tags::error`]; the constants below cover the fixed ones.
pub mod tags {
    /// Initial tag of a fresh conversation.
    pub const START: &str = "start";
    /// Retrieval succeeded.
    pub const RETRIEVER_DONE: &str = "retriever_done";
    /// Retrieval failed; placeholder context substituted.
    pub const RETRIEVER_DEGRADED: &str = "retriever_degraded";
    /// Evaluator scored a math explanation.
    pub const MATH_EXPERT_EVALUATED: &str = "math_expert_evaluated";
    /// Evaluator scored an exam.
    pub const EXAM_CREATOR_EVALUATED: &str = "exam_creator_evaluated";
    /// Evaluator finished without a specialist-specific tag.
    pub const EVALUATOR_DONE: &str = "evaluator_done";
    /// Evaluator ran but found nothing to score.
    pub const EVALUATOR_NO_CONTENT: &str = "evaluator_no_content";
    /// The finalizer sealed the conversation.
    pub const FINISH: &str = "FINISH";

    /// `<agent>_done`
    #[must_use]
    pub fn done(agent: &str) -> String {
        format!("{agent}_done")
    }

    /// `supervisor_chose_<agent>`
    #[must_use]
    pub fn supervisor_chose(agent: &str) -> String {
        format!("supervisor_chose_{agent}")
    }
}

/// Author of a conversation turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Supervisor,
    MathExpert,
    ExamCreator,
    Planning,
    Evaluator,
    Retriever,
}

impl Role {
    /// Stable snake_case label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Supervisor => "supervisor",
            Self::MathExpert => "math_expert",
            Self::ExamCreator => "exam_creator",
            Self::Planning => "planning",
            Self::Evaluator => "evaluator",
            Self::Retriever => "retriever",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Specialists that produce user-facing artifacts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialistId {
    MathExpert,
    ExamCreator,
    Planning,
}

impl SpecialistId {
    /// Stable snake_case label (matches routing keys and tags).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MathExpert => "math_expert",
            Self::ExamCreator => "exam_creator",
            Self::Planning => "planning",
        }
    }
}

impl fmt::Display for SpecialistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn in the conversation history.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TurnRecord {
    /// Who authored the turn.
    pub role: Role,
    /// Rendered content shown to (or received from) the user.
    pub content: String,
    /// Structured side channel: scores, difficulty, exam ids, timestamps.
    #[serde(default)]
    pub metadata: Value,
    /// When the turn was recorded.
    pub timestamp: DateTime<Utc>,
}

impl TurnRecord {
    /// Create a turn with empty metadata.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            metadata: Value::Null,
            timestamp: Utc::now(),
        }
    }

    /// Attach a metadata blob.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Pedagogical profile of the learner.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StudentProfile {
    /// Coarse level used to pick difficulty and exam shape.
    pub comprehension_level: ComprehensionLevel,
    /// Per-area mastery scores.
    pub knowledge: KnowledgeProfile,
    /// Topic names the learner has mastered (derived from strong areas plus
    /// promotions recorded by the math expert).
    pub mastered_topics: Vec<String>,
    /// Topic names the learner struggles with (derived from weak areas).
    pub struggle_topics: Vec<String>,
    /// Free-form learning preferences.
    pub preferences: BTreeMap<String, String>,
    /// Recent error descriptions, newest last, bounded.
    pub error_history: Vec<String>,
}

/// Bound on `error_history`.
const ERROR_HISTORY_LIMIT: usize = 20;

impl StudentProfile {
    /// Re-derive the topic lists and comprehension level from the knowledge
    /// profile. Promoted topics already present are kept.
    pub fn sync_derived_fields(&mut self) {
        for area in self.knowledge.strong_areas(7.0) {
            let name = area.id.display_name().to_string();
            if !self.mastered_topics.contains(&name) {
                self.mastered_topics.push(name);
            }
        }
        self.struggle_topics = self
            .knowledge
            .weak_areas(4.0)
            .iter()
            .map(|a| a.id.display_name().to_string())
            .collect();
        self.comprehension_level = self.knowledge.comprehension_level();
    }

    /// Record an error description, keeping the history bounded.
    pub fn push_error(&mut self, description: impl Into<String>) {
        let description = description.into();
        if self.error_history.last() == Some(&description) {
            return;
        }
        self.error_history.push(description);
        if self.error_history.len() > ERROR_HISTORY_LIMIT {
            let excess = self.error_history.len() - ERROR_HISTORY_LIMIT;
            self.error_history.drain(..excess);
        }
    }
}

/// Beliefs / desires / intentions record the supervisor reasons over.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BdiState {
    /// Beliefs about the learner and the conversation.
    pub beliefs: BTreeMap<String, Value>,
    /// Learning goals.
    pub desires: Vec<String>,
    /// Current action plan.
    pub intentions: BTreeMap<String, Value>,
}

/// Evaluator verdict on the scored response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseQuality {
    Sufficient,
    Insufficient,
}

/// Routing flags and bookkeeping owned by the supervisor and finalizer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ControlState {
    /// Routing key the supervisor chose last.
    pub next_agent: Option<String>,
    /// Last significant event (see [`tags`]).
    pub current_state_tag: String,
    /// The evaluator asked for more context than retrieval provided.
    pub needs_external_search: bool,
    /// Evaluator verdict, when one exists.
    pub response_quality: Option<ResponseQuality>,
    /// The composed final answer, set by the finalizer.
    pub final_response: Option<String>,
    /// Number of completed supervisor visits.
    pub supervisor_hops: u32,
    /// The supervisor hop cap fired; the final response may be incomplete.
    pub step_cap_reached: bool,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            next_agent: None,
            current_state_tag: tags::START.to_string(),
            needs_external_search: false,
            response_quality: None,
            final_response: None,
            supervisor_hops: 0,
            step_cap_reached: false,
        }
    }
}

/// Latest textual output of each specialist.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResponseSet {
    pub math_expert: Option<String>,
    pub exam_creator: Option<String>,
    pub planning: Option<String>,
}

impl ResponseSet {
    /// Response for a specialist, if any.
    #[must_use]
    pub fn get(&self, id: SpecialistId) -> Option<&str> {
        match id {
            SpecialistId::MathExpert => self.math_expert.as_deref(),
            SpecialistId::ExamCreator => self.exam_creator.as_deref(),
            SpecialistId::Planning => self.planning.as_deref(),
        }
    }

    /// Store a specialist's response.
    pub fn set(&mut self, id: SpecialistId, response: impl Into<String>) {
        let slot = match id {
            SpecialistId::MathExpert => &mut self.math_expert,
            SpecialistId::ExamCreator => &mut self.exam_creator,
            SpecialistId::Planning => &mut self.planning,
        };
        *slot = Some(response.into());
    }

    /// Whether any specialist has answered.
    #[must_use]
    pub fn any(&self) -> bool {
        self.math_expert.is_some() || self.exam_creator.is_some() || self.planning.is_some()
    }
}

/// Full state of one conversation request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationState {
    /// The user query that opened the request. Immutable after creation.
    pub initial_query: String,
    /// Ordered conversation turns, oldest first.
    pub chat_history: Vec<TurnRecord>,
    /// Passages from the retriever, score descending.
    pub retrieved_context: Vec<ScoredPassage>,
    /// The learner profile.
    pub student_profile: StudentProfile,
    /// BDI record, lazily created by the supervisor.
    pub bdi: Option<BdiState>,
    /// Latest specialist outputs.
    pub responses: ResponseSet,
    /// Routing flags.
    pub control: ControlState,
}

impl ConversationState {
    /// Create a fresh state for a query.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            initial_query: query.into(),
            chat_history: Vec::new(),
            retrieved_context: Vec::new(),
            student_profile: StudentProfile::default(),
            bdi: None,
            responses: ResponseSet::default(),
            control: ControlState::default(),
        }
    }

    /// Append a turn to the history.
    pub fn push_turn(&mut self, turn: TurnRecord) {
        self.chat_history.push(turn);
    }

    /// The last `n` turns, oldest first.
    #[must_use]
    pub fn recent_turns(&self, n: usize) -> &[TurnRecord] {
        let start = self.chat_history.len().saturating_sub(n);
        &self.chat_history[start..]
    }

    /// The BDI record, created on first access.
    pub fn bdi_mut(&mut self) -> &mut BdiState {
        self.bdi.get_or_insert_with(BdiState::default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_defaults() {
        let state = ConversationState::new("what is a limit?");
        assert_eq!(state.initial_query, "what is a limit?");
        assert_eq!(state.control.current_state_tag, tags::START);
        assert!(state.chat_history.is_empty());
        assert!(!state.responses.any());
        assert!(state.bdi.is_none());
    }

    #[test]
    fn test_recent_turns_window() {
        let mut state = ConversationState::new("q");
        for i in 0..8 {
            state.push_turn(TurnRecord::new(Role::User, format!("turn {i}")));
        }
        let tail = state.recent_turns(5);
        assert_eq!(tail.len(), 5);
        assert_eq!(tail[0].content, "turn 3");
        assert_eq!(tail[4].content, "turn 7");

        // Window larger than history returns everything
        assert_eq!(state.recent_turns(100).len(), 8);
    }

    #[test]
    fn test_response_set_slots() {
        let mut responses = ResponseSet::default();
        assert!(!responses.any());
        responses.set(SpecialistId::ExamCreator, "exam text");
        assert_eq!(responses.get(SpecialistId::ExamCreator), Some("exam text"));
        assert_eq!(responses.get(SpecialistId::MathExpert), None);
        assert!(responses.any());
    }

    #[test]
    fn test_error_history_bounded_and_deduped() {
        let mut profile = StudentProfile::default();
        profile.push_error("conceptual confusion");
        profile.push_error("conceptual confusion");
        assert_eq!(profile.error_history.len(), 1);
        for i in 0..30 {
            profile.push_error(format!("error {i}"));
        }
        assert_eq!(profile.error_history.len(), 20);
        assert_eq!(profile.error_history.last().unwrap(), "error 29");
    }

    #[test]
    fn test_sync_derived_fields() {
        use crate::knowledge::AreaId;
        let mut profile = StudentProfile::default();
        profile.knowledge.area_mut(AreaId::BasicArithmetic).set_score(2.0);
        profile.knowledge.area_mut(AreaId::PlaneGeometry).set_score(9.0);
        profile.sync_derived_fields();
        assert!(profile.mastered_topics.contains(&"Plane Geometry".to_string()));
        assert!(profile.struggle_topics.contains(&"Basic Arithmetic".to_string()));
    }

    #[test]
    fn test_state_serializes_to_json() {
        let mut state = ConversationState::new("serialize me");
        state.push_turn(
            TurnRecord::new(Role::User, "serialize me")
                .with_metadata(serde_json::json!({"is_initial_query": true})),
        );
        state.responses.set(SpecialistId::MathExpert, "an answer");
        let json = serde_json::to_string(&state).unwrap();
        let back: ConversationState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.initial_query, "serialize me");
        assert_eq!(back.responses.get(SpecialistId::MathExpert), Some("an answer"));
        assert_eq!(back.chat_history.len(), 1);
    }

    #[test]
    fn test_tag_helpers() {
        assert_eq!(tags::done("math_expert"), "math_expert_done");
        assert_eq!(tags::supervisor_chose("evaluator"), "supervisor_chose_evaluator");
    }
}
