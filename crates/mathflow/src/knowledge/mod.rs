//! Per-learner knowledge profile over a fixed catalog of math areas.
//!
//! The catalog is the static collaborator described in the external
//! interfaces: twenty pre-university areas, each with a display name,
//! default difficulty and exam weight, plus a keyword mapping used to tag
//! which areas a conversation touched. Scores, difficulties, and weights
//! live on a 0-10 scale and are clamped at every write; an area's mastered
//! and struggling topic sets stay disjoint (mastered wins).

pub mod analyzer;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a knowledge area in the catalog.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AreaId {
    BasicArithmetic,
    ElementaryAlgebra,
    LinearEquations,
    EquationSystems,
    QuadraticEquations,
    PlaneGeometry,
    SolidGeometry,
    AnalyticGeometry,
    BasicFunctions,
    QuadraticFunctions,
    ExponentialFunctions,
    LogarithmicFunctions,
    BasicTrigonometry,
    TrigonometricIdentities,
    DescriptiveStatistics,
    BasicProbability,
    LimitsContinuity,
    BasicDerivatives,
    SetTheory,
    MathematicalLogic,
}

impl AreaId {
    /// Every area in catalog order.
    pub const ALL: [AreaId; 20] = [
        AreaId::BasicArithmetic,
        AreaId::ElementaryAlgebra,
        AreaId::LinearEquations,
        AreaId::EquationSystems,
        AreaId::QuadraticEquations,
        AreaId::PlaneGeometry,
        AreaId::SolidGeometry,
        AreaId::AnalyticGeometry,
        AreaId::BasicFunctions,
        AreaId::QuadraticFunctions,
        AreaId::ExponentialFunctions,
        AreaId::LogarithmicFunctions,
        AreaId::BasicTrigonometry,
        AreaId::TrigonometricIdentities,
        AreaId::DescriptiveStatistics,
        AreaId::BasicProbability,
        AreaId::LimitsContinuity,
        AreaId::BasicDerivatives,
        AreaId::SetTheory,
        AreaId::MathematicalLogic,
    ];

    /// Stable snake_case id (the form the LM sees and returns).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BasicArithmetic => "basic_arithmetic",
            Self::ElementaryAlgebra => "elementary_algebra",
            Self::LinearEquations => "linear_equations",
            Self::EquationSystems => "equation_systems",
            Self::QuadraticEquations => "quadratic_equations",
            Self::PlaneGeometry => "plane_geometry",
            Self::SolidGeometry => "solid_geometry",
            Self::AnalyticGeometry => "analytic_geometry",
            Self::BasicFunctions => "basic_functions",
            Self::QuadraticFunctions => "quadratic_functions",
            Self::ExponentialFunctions => "exponential_functions",
            Self::LogarithmicFunctions => "logarithmic_functions",
            Self::BasicTrigonometry => "basic_trigonometry",
            Self::TrigonometricIdentities => "trigonometric_identities",
            Self::DescriptiveStatistics => "descriptive_statistics",
            Self::BasicProbability => "basic_probability",
            Self::LimitsContinuity => "limits_continuity",
            Self::BasicDerivatives => "basic_derivatives",
            Self::SetTheory => "set_theory",
            Self::MathematicalLogic => "mathematical_logic",
        }
    }

    /// Parse a stable id back to an [`AreaId`].
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|a| a.as_str() == id)
    }

    /// Human-readable name.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::BasicArithmetic => "Basic Arithmetic",
            Self::ElementaryAlgebra => "Elementary Algebra",
            Self::LinearEquations => "Linear Equations",
            Self::EquationSystems => "Systems of Equations",
            Self::QuadraticEquations => "Quadratic Equations",
            Self::PlaneGeometry => "Plane Geometry",
            Self::SolidGeometry => "Solid Geometry",
            Self::AnalyticGeometry => "Analytic Geometry",
            Self::BasicFunctions => "Basic Functions",
            Self::QuadraticFunctions => "Quadratic Functions",
            Self::ExponentialFunctions => "Exponential Functions",
            Self::LogarithmicFunctions => "Logarithmic Functions",
            Self::BasicTrigonometry => "Basic Trigonometry",
            Self::TrigonometricIdentities => "Trigonometric Identities",
            Self::DescriptiveStatistics => "Descriptive Statistics",
            Self::BasicProbability => "Basic Probability",
            Self::LimitsContinuity => "Limits and Continuity",
            Self::BasicDerivatives => "Basic Derivatives",
            Self::SetTheory => "Set Theory",
            Self::MathematicalLogic => "Mathematical Logic",
        }
    }

    /// Intrinsic difficulty of the area on the 0-10 scale.
    #[must_use]
    pub fn default_difficulty(self) -> f32 {
        match self {
            Self::BasicArithmetic => 3.0,
            Self::ElementaryAlgebra => 5.0,
            Self::LinearEquations => 2.0,
            Self::EquationSystems => 5.0,
            Self::QuadraticEquations => 7.0,
            Self::PlaneGeometry => 9.0,
            Self::SolidGeometry => 8.0,
            Self::AnalyticGeometry => 9.0,
            Self::BasicFunctions => 2.0,
            Self::QuadraticFunctions => 4.0,
            Self::ExponentialFunctions => 4.0,
            Self::LogarithmicFunctions => 5.0,
            Self::BasicTrigonometry => 6.0,
            Self::TrigonometricIdentities => 5.0,
            Self::DescriptiveStatistics => 4.0,
            Self::BasicProbability => 4.0,
            Self::LimitsContinuity => 9.0,
            Self::BasicDerivatives => 7.0,
            Self::SetTheory => 6.0,
            Self::MathematicalLogic => 8.0,
        }
    }

    /// Default weight of the area in exams, 0-10 scale.
    #[must_use]
    pub fn default_weight(self) -> f32 {
        match self {
            // Calculus topics are marginal in the target exams
            Self::LimitsContinuity | Self::BasicDerivatives => 1.0,
            _ => 5.0,
        }
    }
}

impl fmt::Display for AreaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword phrases that tag an area, matched as lowercase substrings.
pub const AREA_KEYWORDS: &[(&[&str], AreaId)] = &[
    (
        &["addition", "subtraction", "multiplication", "division", "fraction", "decimal", "percentage", "arithmetic"],
        AreaId::BasicArithmetic,
    ),
    (
        &["variable", "algebraic expression", "factoring", "polynomial"],
        AreaId::ElementaryAlgebra,
    ),
    (
        &["linear equation", "solve for x", "isolate the variable"],
        AreaId::LinearEquations,
    ),
    (
        &["system of equations", "substitution method", "elimination method"],
        AreaId::EquationSystems,
    ),
    (
        &["quadratic equation", "quadratic formula", "discriminant", "completing the square"],
        AreaId::QuadraticEquations,
    ),
    (
        &["perimeter", "triangle", "quadrilateral", "circle", "pythagorean theorem", "pythagoras"],
        AreaId::PlaneGeometry,
    ),
    (
        &["volume", "surface area", "prism", "pyramid", "sphere"],
        AreaId::SolidGeometry,
    ),
    (
        &["cartesian plane", "distance between points", "equation of a line", "conic"],
        AreaId::AnalyticGeometry,
    ),
    (
        &["domain", "range", "graph of a function"],
        AreaId::BasicFunctions,
    ),
    (
        &["parabola", "vertex", "quadratic function"],
        AreaId::QuadraticFunctions,
    ),
    (
        &["exponential function", "exponential growth"],
        AreaId::ExponentialFunctions,
    ),
    (
        &["logarithm", "log base"],
        AreaId::LogarithmicFunctions,
    ),
    (
        &["sine", "cosine", "tangent", "trigonometric ratio", "trigonometry"],
        AreaId::BasicTrigonometry,
    ),
    (
        &["trigonometric identity", "trigonometric equation"],
        AreaId::TrigonometricIdentities,
    ),
    (
        &["median", "mode", "standard deviation", "statistics"],
        AreaId::DescriptiveStatistics,
    ),
    (
        &["probability", "sample space", "random event"],
        AreaId::BasicProbability,
    ),
    (&["limit", "continuity"], AreaId::LimitsContinuity),
    (
        &["derivative", "chain rule", "differentiation"],
        AreaId::BasicDerivatives,
    ),
    (
        &["set theory", "union", "intersection", "complement"],
        AreaId::SetTheory,
    ),
    (
        &["proposition", "logical connective", "truth table"],
        AreaId::MathematicalLogic,
    ),
];

/// Tag every area whose keyword list matches the text (case-insensitive
/// substring). Returns areas in catalog order, deduplicated.
#[must_use]
pub fn identify_areas(text: &str) -> Vec<AreaId> {
    let haystack = text.to_lowercase();
    let mut found = BTreeSet::new();
    for (keywords, area) in AREA_KEYWORDS {
        if keywords.iter().any(|kw| haystack.contains(kw)) {
            found.insert(*area);
        }
    }
    found.into_iter().collect()
}

/// Clamp a score/difficulty/weight to the 0-10 scale.
#[must_use]
pub fn clamp_score(value: f32) -> f32 {
    value.clamp(0.0, 10.0)
}

/// Confidence attached to an area assessment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    #[default]
    Medium,
    High,
}

impl Confidence {
    /// Parse a loose label coming back from the LM.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "low" | "baja" => Some(Self::Low),
            "medium" | "med" | "media" => Some(Self::Medium),
            "high" | "alta" => Some(Self::High),
            _ => None,
        }
    }
}

/// Comprehension level derived from the mean area score.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComprehensionLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl ComprehensionLevel {
    /// Stable lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }

    /// Map a mean 0-10 score to a level.
    #[must_use]
    pub fn from_overall_score(score: f32) -> Self {
        if score >= 7.5 {
            Self::Advanced
        } else if score >= 5.5 {
            Self::Intermediate
        } else {
            Self::Beginner
        }
    }
}

impl fmt::Display for ComprehensionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mastery record for one area.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KnowledgeArea {
    /// Catalog id.
    pub id: AreaId,
    /// Mastery score, 0-10.
    score: f32,
    /// Difficulty, 0-10.
    difficulty: f32,
    /// Exam weight, 0-10.
    weight: f32,
    /// Confidence in the current score.
    pub confidence: Confidence,
    /// When the score last changed.
    pub last_updated: DateTime<Utc>,
    mastered_topics: BTreeSet<String>,
    struggle_topics: BTreeSet<String>,
}

impl KnowledgeArea {
    /// Create an area with catalog defaults and a neutral score of 5.
    #[must_use]
    pub fn new(id: AreaId) -> Self {
        Self {
            id,
            score: 5.0,
            difficulty: id.default_difficulty(),
            weight: id.default_weight(),
            confidence: Confidence::default(),
            last_updated: Utc::now(),
            mastered_topics: BTreeSet::new(),
            struggle_topics: BTreeSet::new(),
        }
    }

    /// Current mastery score.
    #[must_use]
    pub fn score(&self) -> f32 {
        self.score
    }

    /// Current difficulty.
    #[must_use]
    pub fn difficulty(&self) -> f32 {
        self.difficulty
    }

    /// Current exam weight.
    #[must_use]
    pub fn weight(&self) -> f32 {
        self.weight
    }

    /// Set the score (clamped) and stamp `last_updated`.
    pub fn set_score(&mut self, score: f32) {
        self.score = clamp_score(score);
        self.last_updated = Utc::now();
    }

    /// Set the difficulty (clamped).
    pub fn set_difficulty(&mut self, difficulty: f32) {
        self.difficulty = clamp_score(difficulty);
    }

    /// Set the exam weight (clamped).
    pub fn set_weight(&mut self, weight: f32) {
        self.weight = clamp_score(weight);
    }

    /// Topics the learner has mastered in this area.
    #[must_use]
    pub fn mastered_topics(&self) -> &BTreeSet<String> {
        &self.mastered_topics
    }

    /// Topics the learner struggles with in this area.
    #[must_use]
    pub fn struggle_topics(&self) -> &BTreeSet<String> {
        &self.struggle_topics
    }

    /// Record a mastered topic. Removes it from the struggling set.
    pub fn record_mastered(&mut self, topic: impl Into<String>) {
        let topic = topic.into();
        if topic.trim().is_empty() {
            return;
        }
        self.struggle_topics.remove(&topic);
        self.mastered_topics.insert(topic);
    }

    /// Record a struggling topic. Mastered topics stay mastered.
    pub fn record_struggling(&mut self, topic: impl Into<String>) {
        let topic = topic.into();
        if topic.trim().is_empty() || self.mastered_topics.contains(&topic) {
            return;
        }
        self.struggle_topics.insert(topic);
    }
}

/// Mastery profile across the whole catalog.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KnowledgeProfile {
    areas: BTreeMap<AreaId, KnowledgeArea>,
}

impl Default for KnowledgeProfile {
    fn default() -> Self {
        Self {
            areas: AreaId::ALL
                .iter()
                .map(|id| (*id, KnowledgeArea::new(*id)))
                .collect(),
        }
    }
}

impl KnowledgeProfile {
    /// Look up an area record.
    #[must_use]
    pub fn area(&self, id: AreaId) -> &KnowledgeArea {
        // Every AreaId is present by construction.
        &self.areas[&id]
    }

    /// Mutable lookup.
    pub fn area_mut(&mut self, id: AreaId) -> &mut KnowledgeArea {
        self.areas.entry(id).or_insert_with(|| KnowledgeArea::new(id))
    }

    /// Iterate all areas in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &KnowledgeArea> {
        self.areas.values()
    }

    /// Mean mastery score across all areas.
    #[must_use]
    pub fn overall_score(&self) -> f32 {
        if self.areas.is_empty() {
            return 5.0;
        }
        let total: f32 = self.areas.values().map(KnowledgeArea::score).sum();
        total / self.areas.len() as f32
    }

    /// Areas at or below the weakness threshold (default 4).
    #[must_use]
    pub fn weak_areas(&self, threshold: f32) -> Vec<&KnowledgeArea> {
        self.areas.values().filter(|a| a.score() <= threshold).collect()
    }

    /// Areas at or above the strength threshold (default 7).
    #[must_use]
    pub fn strong_areas(&self, threshold: f32) -> Vec<&KnowledgeArea> {
        self.areas.values().filter(|a| a.score() >= threshold).collect()
    }

    /// Comprehension level implied by the mean score.
    #[must_use]
    pub fn comprehension_level(&self) -> ComprehensionLevel {
        ComprehensionLevel::from_overall_score(self.overall_score())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_has_twenty_areas() {
        assert_eq!(AreaId::ALL.len(), 20);
        let profile = KnowledgeProfile::default();
        assert_eq!(profile.iter().count(), 20);
    }

    #[test]
    fn test_area_id_round_trip() {
        for id in AreaId::ALL {
            assert_eq!(AreaId::from_id(id.as_str()), Some(id));
        }
        assert_eq!(AreaId::from_id("underwater_basket_weaving"), None);
    }

    #[test]
    fn test_identify_areas_matches_substrings() {
        let areas = identify_areas("Explain the Pythagorean theorem and the sine rule");
        assert!(areas.contains(&AreaId::PlaneGeometry));
        assert!(areas.contains(&AreaId::BasicTrigonometry));
    }

    #[test]
    fn test_identify_areas_empty_for_unrelated_text() {
        assert!(identify_areas("tell me a story about pirates").is_empty());
    }

    #[test]
    fn test_set_score_clamps() {
        let mut area = KnowledgeArea::new(AreaId::BasicArithmetic);
        area.set_score(42.0);
        assert!((area.score() - 10.0).abs() < f32::EPSILON);
        area.set_score(-3.0);
        assert!((area.score() - 0.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_mastered_wins_over_struggling() {
        let mut area = KnowledgeArea::new(AreaId::PlaneGeometry);
        area.record_struggling("pythagorean theorem");
        area.record_mastered("pythagorean theorem");
        assert!(area.mastered_topics().contains("pythagorean theorem"));
        assert!(area.struggle_topics().is_empty());

        // Already mastered: a struggling report is pruned
        area.record_struggling("pythagorean theorem");
        assert!(area.struggle_topics().is_empty());
    }

    #[test]
    fn test_comprehension_thresholds() {
        assert_eq!(ComprehensionLevel::from_overall_score(7.5), ComprehensionLevel::Advanced);
        assert_eq!(ComprehensionLevel::from_overall_score(5.5), ComprehensionLevel::Intermediate);
        assert_eq!(ComprehensionLevel::from_overall_score(5.4), ComprehensionLevel::Beginner);
    }

    #[test]
    fn test_overall_score_default_profile() {
        let profile = KnowledgeProfile::default();
        assert!((profile.overall_score() - 5.0).abs() < 1e-6);
        assert_eq!(profile.comprehension_level(), ComprehensionLevel::Beginner);
    }

    #[test]
    fn test_weak_and_strong_areas() {
        let mut profile = KnowledgeProfile::default();
        profile.area_mut(AreaId::BasicArithmetic).set_score(2.0);
        profile.area_mut(AreaId::SetTheory).set_score(9.0);
        let weak: Vec<_> = profile.weak_areas(4.0).iter().map(|a| a.id).collect();
        let strong: Vec<_> = profile.strong_areas(7.0).iter().map(|a| a.id).collect();
        assert_eq!(weak, [AreaId::BasicArithmetic]);
        assert_eq!(strong, [AreaId::SetTheory]);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Scores, difficulties, and weights stay in [0, 10] under any
            /// sequence of writes.
            #[test]
            fn prop_numeric_fields_clamped(values in proptest::collection::vec(-100.0f32..100.0, 1..20)) {
                let mut area = KnowledgeArea::new(AreaId::ElementaryAlgebra);
                for v in values {
                    area.set_score(v);
                    area.set_difficulty(v);
                    area.set_weight(v);
                    prop_assert!((0.0..=10.0).contains(&area.score()));
                    prop_assert!((0.0..=10.0).contains(&area.difficulty()));
                    prop_assert!((0.0..=10.0).contains(&area.weight()));
                }
            }

            /// Mastered and struggling sets stay disjoint under any
            /// interleaving of reports.
            #[test]
            fn prop_topic_sets_disjoint(
                ops in proptest::collection::vec(("[a-z]{1,6}", proptest::bool::ANY), 0..40)
            ) {
                let mut area = KnowledgeArea::new(AreaId::BasicFunctions);
                for (topic, mastered) in ops {
                    if mastered {
                        area.record_mastered(topic);
                    } else {
                        area.record_struggling(topic);
                    }
                    prop_assert!(area.mastered_topics().is_disjoint(area.struggle_topics()));
                }
            }
        }
    }
}
