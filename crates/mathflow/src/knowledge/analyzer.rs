//! LM-assisted knowledge profile updates.
//!
//! After a math explanation the analyzer tags the areas the interaction
//! touched, asks the model for per-area score updates, and applies them
//! atomically: clamp scores, merge topic sets (mastered wins), stamp
//! `last_updated`, then re-derive the comprehension level. When the envelope
//! degrades, a deterministic drift keeps the profile moving: +1 on every
//! touched area, or -1 when the query signals confusion.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::agents::schemas::KnowledgeAnalysis;
use crate::core::language_models::structured::StructuredChatModel;
use crate::core::language_models::ChatModel;
use crate::core::prompts::PromptTemplate;
use crate::core::error::Result;
use crate::knowledge::{identify_areas, AreaId, Confidence};
use crate::state::ConversationState;

/// Confusion phrases scanned in the query, with the error description they
/// record in the learner's error history.
const CONFUSION_PATTERNS: &[(&str, &str)] = &[
    ("don't understand", "General comprehension gap"),
    ("do not understand", "General comprehension gap"),
    ("no entiendo", "General comprehension gap"),
    ("i'm confused", "Conceptual confusion"),
    ("i am confused", "Conceptual confusion"),
    ("can't solve", "Procedural difficulty"),
    ("cannot solve", "Procedural difficulty"),
    ("got it wrong", "Application error"),
];

const ANALYSIS_PROMPT: &str = "\
You are an expert analyzer of mathematical knowledge who assesses a \
learner's mastery of specific areas.

INTERACTION ANALYZED:
Query: {query}
Explanation given: {explanation}
Detected errors: {errors}

KNOWLEDGE AREAS TO ASSESS:
{areas}

CURRENT KNOWLEDGE STATE:
{current_knowledge}

INSTRUCTIONS:
1. Assess the learner's mastery of each listed area on a 0-10 scale
2. Identify specific topics mastered and topics causing difficulty
3. Give evidence and a reason for every score change

SCORING GUIDE (0-10):
- 0-2: does not understand basic concepts
- 3-4: very limited understanding, fundamental errors
- 5-6: basic understanding, some errors
- 7-8: good command, minor errors
- 9-10: excellent command, correct application";

/// Analyzes interactions and updates the learner's knowledge profile.
pub struct KnowledgeAnalyzer {
    structured: StructuredChatModel<KnowledgeAnalysis>,
    prompt: PromptTemplate,
}

impl KnowledgeAnalyzer {
    /// Wrap a model for knowledge analysis.
    pub fn new(model: Arc<dyn ChatModel>) -> Result<Self> {
        Ok(Self {
            structured: StructuredChatModel::new(model)?,
            prompt: PromptTemplate::from_template(ANALYSIS_PROMPT)?,
        })
    }

    /// Error descriptions matching the query's confusion phrases.
    #[must_use]
    pub fn extract_errors(query: &str) -> Vec<&'static str> {
        let lowered = query.to_lowercase();
        let mut errors = Vec::new();
        for (pattern, description) in CONFUSION_PATTERNS {
            if lowered.contains(pattern) && !errors.contains(description) {
                errors.push(*description);
            }
        }
        errors
    }

    /// Whether the query signals the learner did not understand.
    #[must_use]
    pub fn signals_confusion(query: &str) -> bool {
        let lowered = query.to_lowercase();
        lowered.contains("don't understand") || lowered.contains("no entiendo")
    }

    /// Update the knowledge profile from the latest interaction. Never
    /// fails; a degraded envelope falls back to the deterministic drift.
    pub async fn update_from_interaction(&self, state: &mut ConversationState) {
        let query = state.initial_query.clone();
        let explanation = state
            .responses
            .math_expert
            .clone()
            .unwrap_or_default();

        let touched = identify_areas(&format!("{query} {explanation}"));
        if touched.is_empty() {
            debug!("no knowledge areas matched, skipping update");
            return;
        }

        let errors = Self::extract_errors(&query);
        for error in &errors {
            state.student_profile.push_error(*error);
        }

        let current_knowledge: serde_json::Value = touched
            .iter()
            .map(|id| {
                let area = state.student_profile.knowledge.area(*id);
                (
                    id.as_str().to_string(),
                    serde_json::json!({
                        "current_score": area.score(),
                        "confidence": area.confidence,
                        "topics_mastered": area.mastered_topics(),
                        "topics_struggling": area.struggle_topics(),
                    }),
                )
            })
            .collect::<serde_json::Map<String, serde_json::Value>>()
            .into();

        let area_list = touched
            .iter()
            .map(|id| id.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        let inputs = HashMap::from([
            ("query".to_string(), query.clone()),
            ("explanation".to_string(), explanation),
            ("errors".to_string(), format!("{errors:?}")),
            ("areas".to_string(), area_list),
            ("current_knowledge".to_string(), current_knowledge.to_string()),
        ]);

        let reply = self.structured.invoke(&self.prompt.format(&inputs)).await;

        if reply.is_degraded() {
            warn!("knowledge analysis degraded, applying deterministic drift");
            let delta = if Self::signals_confusion(&query) { -1.0 } else { 1.0 };
            for id in &touched {
                let area = state.student_profile.knowledge.area_mut(*id);
                let current = area.score();
                area.set_score(current + delta);
            }
        } else {
            Self::apply_analysis(state, &reply.value);
        }

        state.student_profile.sync_derived_fields();
        info!(
            areas = touched.len(),
            level = %state.student_profile.comprehension_level,
            "knowledge profile updated"
        );
    }

    fn apply_analysis(state: &mut ConversationState, analysis: &KnowledgeAnalysis) {
        for (area_id, update) in &analysis.knowledge_updates {
            let Some(id) = AreaId::from_id(area_id) else {
                debug!(area = %area_id, "ignoring update for unknown area");
                continue;
            };
            let area = state.student_profile.knowledge.area_mut(id);
            area.set_score(update.new_score as f32);
            if let Some(confidence) = Confidence::from_label(&update.confidence) {
                area.confidence = confidence;
            }
            for topic in &update.topics_struggling {
                area.record_struggling(topic.clone());
            }
            for topic in &update.topics_mastered {
                area.record_mastered(topic.clone());
            }
        }
    }
}
