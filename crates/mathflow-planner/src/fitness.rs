//! Plan fitness evaluation.

use std::collections::{BTreeMap, BTreeSet};

use crate::entities::{Learner, StudyPlan, Topic};

/// Score a plan against the learner and the official catalog. Higher is
/// better; the weights sum to 0.90:
///
/// ```text
/// fitness = 0.25 * coverage + 0.30 * weakness_focus
///         + 0.15 * efficiency + 0.10 * smoothness
/// ```
///
/// * `coverage` - fraction of catalog topics the plan touches.
/// * `weakness_focus` - time-weighted mean of `1 - 0.1 * mastery` (mastery on
///   the 0-10 scale), so hours on weak topics count for more.
/// * `efficiency` - 1 inside the time budget, `1 / (1 + excess)` beyond it.
/// * `smoothness` - `1 / (1 + sum of difficulty jumps)` between consecutive
///   blocks.
///
/// Blocks whose topic is not in the catalog are ignored.
#[must_use]
pub fn evaluate_plan(
    plan: &StudyPlan,
    learner: &Learner,
    official_topics: &BTreeMap<String, Topic>,
) -> f64 {
    let mut covered: BTreeSet<&str> = BTreeSet::new();
    let mut total_time = 0.0;
    let mut weakness_focus = 0.0;
    let mut difficulty_penalty = 0.0;
    let mut previous_difficulty: Option<f64> = None;

    for block in &plan.blocks {
        let topic_name = block.topic.name.as_str();
        if !official_topics.contains_key(topic_name) {
            continue;
        }

        covered.insert(topic_name);
        total_time += block.time_allocated;

        let mastery = learner.topic_mastery.get(topic_name).copied().unwrap_or(0.0);
        weakness_focus += block.time_allocated * (1.0 - mastery * 0.1);

        if let Some(previous) = previous_difficulty {
            difficulty_penalty += (block.target_difficulty - previous).abs();
        }
        previous_difficulty = Some(block.target_difficulty);
    }

    let required = official_topics.len().max(1);
    let coverage = covered.len() as f64 / required as f64;

    let normalized_focus = weakness_focus / total_time.max(1.0);

    let efficiency = if total_time <= plan.available_time {
        1.0
    } else {
        1.0 / (1.0 + (total_time - plan.available_time))
    };

    let smoothness = 1.0 / (1.0 + difficulty_penalty);

    0.25 * coverage + 0.30 * normalized_focus + 0.15 * efficiency + 0.10 * smoothness
}
