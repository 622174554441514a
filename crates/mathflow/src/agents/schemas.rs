//! Structured output schemas for the agents.
//!
//! Every schema derives `JsonSchema` (rendered into format instructions by
//! the envelope) and `Default` (the envelope's tier-3 sentinel). Fields are
//! `#[serde(default)]` throughout so partially-filled model replies parse
//! with missing fields taking their defaults; unknown fields are ignored.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Routing decision produced by the supervisor.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct SupervisorDecision {
    /// One of `math_expert`, `exam_creator`, `planning`, `evaluator`,
    /// `FINISH`.
    #[serde(default)]
    pub next_agent: String,
    /// Why this agent was chosen.
    #[serde(default)]
    pub reasoning: String,
    /// Decision confidence in [0, 1].
    #[serde(default)]
    pub confidence: f64,
}

impl SupervisorDecision {
    /// Build a decision with clamped confidence.
    pub fn new(next_agent: impl Into<String>, reasoning: impl Into<String>, confidence: f64) -> Self {
        Self {
            next_agent: next_agent.into(),
            reasoning: reasoning.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Difficulty of a generated artifact.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyLevel {
    #[default]
    Basic,
    Intermediate,
    Advanced,
}

impl DifficultyLevel {
    /// Stable lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

impl std::fmt::Display for DifficultyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Math explanation reply.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct MathExpertReply {
    /// The explanation itself.
    #[serde(default)]
    pub explanation: String,
    /// Formulas used, LaTeX where applicable.
    #[serde(default)]
    pub formulas: Vec<String>,
    /// Difficulty assessed for this learner.
    #[serde(default)]
    pub difficulty: DifficultyLevel,
    /// Concepts connecting to prior knowledge.
    #[serde(default)]
    pub related_concepts: Vec<String>,
}

/// Generated exam reply.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct ExamReply {
    /// Exam title.
    #[serde(default)]
    pub title: String,
    /// Exam questions, at least one in a valid exam.
    #[serde(default)]
    pub questions: Vec<String>,
    /// Overall difficulty.
    #[serde(default)]
    pub difficulty: DifficultyLevel,
    /// Estimated completion time in minutes.
    #[serde(default)]
    pub estimated_time_minutes: u32,
    /// Topics the exam covers.
    #[serde(default)]
    pub topics_covered: Vec<String>,
}

/// One rendered entry of a study plan.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct PlanEntry {
    /// Topic name.
    #[serde(default)]
    pub topic: String,
    /// Short description of what to work on.
    #[serde(default)]
    pub description: String,
    /// Hours allocated.
    #[serde(default)]
    pub time_allocated: f64,
}

/// Formatted study plan reply.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct PlanningReply {
    /// Plan entries in study order.
    #[serde(default)]
    pub plan: Vec<PlanEntry>,
    /// Fitness score of the underlying plan.
    #[serde(default)]
    pub score: f64,
}

/// Overall quality verdict of an evaluation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OverallQuality {
    #[default]
    Poor,
    Acceptable,
    Good,
    Excellent,
}

impl OverallQuality {
    /// Stable lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Poor => "poor",
            Self::Acceptable => "acceptable",
            Self::Good => "good",
            Self::Excellent => "excellent",
        }
    }
}

/// Quality evaluation of a generated response.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct ResponseEvaluation {
    /// Whether the response is good enough to ship.
    #[serde(default)]
    pub is_sufficient: bool,
    /// Mathematical correctness, [0, 1].
    #[serde(default)]
    pub correctness_score: f64,
    /// Pedagogical clarity, [0, 1].
    #[serde(default)]
    pub clarity_score: f64,
    /// Completeness of the answer, [0, 1].
    #[serde(default)]
    pub completeness_score: f64,
    /// Relevance to the query and context, [0, 1].
    #[serde(default)]
    pub relevance_score: f64,
    /// Adaptation to the learner profile, [0, 1].
    #[serde(default)]
    pub adaptation_score: f64,
    /// Whether more context or information is needed.
    #[serde(default)]
    pub needs_more_context: bool,
    /// Concrete improvement suggestions.
    #[serde(default)]
    pub improvement_suggestions: Vec<String>,
    /// Overall verdict.
    #[serde(default)]
    pub overall_quality: OverallQuality,
}

impl ResponseEvaluation {
    /// Clamp every axis score into [0, 1].
    pub fn clamp_scores(&mut self) {
        self.correctness_score = self.correctness_score.clamp(0.0, 1.0);
        self.clarity_score = self.clarity_score.clamp(0.0, 1.0);
        self.completeness_score = self.completeness_score.clamp(0.0, 1.0);
        self.relevance_score = self.relevance_score.clamp(0.0, 1.0);
        self.adaptation_score = self.adaptation_score.clamp(0.0, 1.0);
    }
}

/// Update for one knowledge area.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct AreaUpdate {
    /// New mastery score on the 0-10 scale.
    #[serde(default)]
    pub new_score: f64,
    /// Confidence label: low / medium / high.
    #[serde(default)]
    pub confidence: String,
    /// Topics now mastered.
    #[serde(default)]
    pub topics_mastered: Vec<String>,
    /// Topics the learner struggles with.
    #[serde(default)]
    pub topics_struggling: Vec<String>,
    /// Evidence supporting the update.
    #[serde(default)]
    pub evidence: String,
    /// Why the score changed.
    #[serde(default)]
    pub change_reason: String,
}

/// Knowledge analysis over one interaction.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct KnowledgeAnalysis {
    /// Area ids the interaction touched.
    #[serde(default)]
    pub areas_analyzed: Vec<String>,
    /// Per-area updates keyed by area id.
    #[serde(default)]
    pub knowledge_updates: BTreeMap<String, AreaUpdate>,
    /// Overall assessment of the learner.
    #[serde(default)]
    pub overall_assessment: String,
    /// Study recommendations.
    #[serde(default)]
    pub recommendations: Vec<String>,
}
