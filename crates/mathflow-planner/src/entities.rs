//! Plan optimizer domain entities.
//!
//! Difficulties and exam weights live on a [0, 1] scale here; callers
//! working with 0-10 catalog numbers normalize at the boundary.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// A study topic from the official catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    /// Unique topic name.
    pub name: String,
    /// Importance in the target exam, [0, 1].
    pub exam_weight: f64,
    /// Intrinsic difficulty, [0, 1].
    pub base_difficulty: f64,
}

impl Topic {
    /// Create a topic.
    pub fn new(name: impl Into<String>, exam_weight: f64, base_difficulty: f64) -> Self {
        Self {
            name: name.into(),
            exam_weight,
            base_difficulty,
        }
    }
}

/// The learner the plan is optimized for.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Learner {
    /// Per-topic mastery on the 0-10 scale.
    pub topic_mastery: BTreeMap<String, f64>,
    /// Target exam score.
    pub target_score: f64,
}

/// One block of a study plan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StudyBlock {
    /// The topic studied in this block.
    pub topic: Topic,
    /// Hours allocated. Never below 0.5 after mutation.
    pub time_allocated: f64,
    /// Desired working difficulty, in `[topic.base_difficulty, 1.0]`.
    pub target_difficulty: f64,
}

/// An ordered study plan with pairwise-distinct topics.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StudyPlan {
    /// Blocks in study order.
    pub blocks: Vec<StudyBlock>,
    /// Total hours available until the exam.
    pub available_time: f64,
}

impl StudyPlan {
    /// Create a plan.
    #[must_use]
    pub fn new(blocks: Vec<StudyBlock>, available_time: f64) -> Self {
        Self {
            blocks,
            available_time,
        }
    }

    /// Sum of allocated hours.
    #[must_use]
    pub fn total_time(&self) -> f64 {
        self.blocks.iter().map(|b| b.time_allocated).sum()
    }

    /// Hours allocated to a topic, 0 when absent.
    #[must_use]
    pub fn time_for(&self, topic_name: &str) -> f64 {
        self.blocks
            .iter()
            .filter(|b| b.topic.name == topic_name)
            .map(|b| b.time_allocated)
            .sum()
    }

    /// Whether every block's topic is unique within the plan.
    #[must_use]
    pub fn has_unique_topics(&self) -> bool {
        let mut seen = BTreeSet::new();
        self.blocks.iter().all(|b| seen.insert(b.topic.name.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(name: &str, time: f64) -> StudyBlock {
        StudyBlock {
            topic: Topic::new(name, 0.5, 0.3),
            time_allocated: time,
            target_difficulty: 0.5,
        }
    }

    #[test]
    fn test_total_time_and_lookup() {
        let plan = StudyPlan::new(vec![block("algebra", 2.0), block("geometry", 3.5)], 40.0);
        assert!((plan.total_time() - 5.5).abs() < 1e-9);
        assert!((plan.time_for("geometry") - 3.5).abs() < 1e-9);
        assert!((plan.time_for("calculus") - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_unique_topics_detection() {
        let unique = StudyPlan::new(vec![block("a", 1.0), block("b", 1.0)], 10.0);
        assert!(unique.has_unique_topics());
        let duplicated = StudyPlan::new(vec![block("a", 1.0), block("a", 1.0)], 10.0);
        assert!(!duplicated.has_unique_topics());
    }
}
