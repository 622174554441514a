//! Study planning specialist.
//!
//! Builds the topic catalog from the learner's knowledge profile (0-10
//! catalog numbers normalized to the optimizer's [0, 1] scales), runs the
//! genetic optimizer, and asks the model to present the winning plan. A
//! degraded envelope renders the plan deterministically instead - the
//! optimizer's output is never lost to a formatting failure.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use mathflow_planner::{
    evaluate_plan, evolve, generate_population, GaConfig, Learner, StudyPlan, Topic,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tracing::{info, warn};

use crate::agents::schemas::{PlanEntry, PlanningReply};
use crate::core::error::Result;
use crate::core::language_models::structured::StructuredChatModel;
use crate::core::language_models::ChatModel;
use crate::core::prompts::PromptTemplate;
use crate::state::{tags, ConversationState, Role, SpecialistId, TurnRecord};

const PLANNING_PROMPT: &str = "\
You work with an expert study-plan generator. Your job is to take the plan
it produced and present it to the learner clearly.

GENERATED PLAN: {plan_data}

PLAN SCORE: {score}

INSTRUCTIONS:
- The plan arrives as 'topic : hours' pairs separated by commas
- The study order of the topics matches the order received
- Give each entry a short, actionable description
- Keep every topic and its allocated hours unchanged";

/// The study planning agent.
pub struct PlanningAgent {
    structured: StructuredChatModel<PlanningReply>,
    prompt: PromptTemplate,
    ga: GaConfig,
    available_time: f64,
    seed: Option<u64>,
}

impl PlanningAgent {
    /// Create the agent.
    pub fn new(
        model: Arc<dyn ChatModel>,
        ga: GaConfig,
        available_time: f64,
        seed: Option<u64>,
    ) -> Result<Self> {
        Ok(Self {
            structured: StructuredChatModel::new(model)?,
            prompt: PromptTemplate::from_template(PLANNING_PROMPT)?,
            ga,
            available_time,
            seed,
        })
    }

    /// Catalog and mastery map derived from the knowledge profile, with
    /// difficulty and weight normalized from 0-10 to [0, 1].
    fn build_catalog(
        state: &ConversationState,
    ) -> (BTreeMap<String, Topic>, BTreeMap<String, f64>) {
        let mut topics = BTreeMap::new();
        let mut mastery = BTreeMap::new();
        for area in state.student_profile.knowledge.iter() {
            let name = area.id.display_name().to_string();
            topics.insert(
                name.clone(),
                Topic::new(
                    name.clone(),
                    f64::from(area.weight()) / 10.0,
                    f64::from(area.difficulty()) / 10.0,
                ),
            );
            mastery.insert(name, f64::from(area.score()));
        }
        (topics, mastery)
    }

    /// Optimize a study plan for the learner.
    fn optimize(&self, state: &ConversationState) -> (StudyPlan, f64) {
        let (topics, topic_mastery) = Self::build_catalog(state);
        let learner = Learner {
            topic_mastery,
            target_score: 100.0,
        };

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut config = self.ga.clone();
        config.min_blocks = 1;
        config.max_blocks = topics.len().max(1);

        let (low, high) = config.population_range;
        let population_size = rng.gen_range(low..=high.max(low));
        let population =
            generate_population(population_size, &topics, self.available_time, &config, &mut rng);
        let outcome = evolve(
            population,
            |p| evaluate_plan(p, &learner, &topics),
            &config,
            &mut rng,
        );
        let score = evaluate_plan(&outcome.best, &learner, &topics);
        (outcome.best, score)
    }

    /// Deterministic reply built straight from the optimized plan.
    fn fallback_reply(best: &StudyPlan, score: f64) -> PlanningReply {
        PlanningReply {
            plan: best
                .blocks
                .iter()
                .map(|block| PlanEntry {
                    topic: block.topic.name.clone(),
                    description: format!(
                        "Study at target difficulty {:.2}",
                        block.target_difficulty
                    ),
                    time_allocated: block.time_allocated,
                })
                .collect(),
            score,
        }
    }

    /// Canonical markdown render of a plan.
    fn render_plan(reply: &PlanningReply) -> String {
        let mut out = String::from("# Personalized Study Plan\n\n");
        out.push_str(&format!("**Plan fitness:** {:.2}\n\n", reply.score));
        for (i, entry) in reply.plan.iter().enumerate() {
            out.push_str(&format!(
                "{}. **{}** - {:.1} h - {}\n",
                i + 1,
                entry.topic,
                entry.time_allocated,
                entry.description
            ));
        }
        out
    }

    /// Optimize, format, and record a study plan.
    pub async fn run(&self, mut state: ConversationState) -> ConversationState {
        info!(query = %state.initial_query, "planning agent running");

        let (best, score) = self.optimize(&state);
        let plan_data = best
            .blocks
            .iter()
            .map(|b| format!("{} : {}", b.topic.name, b.time_allocated))
            .collect::<Vec<_>>()
            .join(" , ");

        let inputs = HashMap::from([
            ("plan_data".to_string(), plan_data),
            ("score".to_string(), format!("{score:.4}")),
        ]);

        let reply = self.structured.invoke(&self.prompt.format(&inputs)).await;
        let degraded = reply.is_degraded() || reply.value.plan.is_empty();
        let reply = if degraded {
            warn!("planning envelope degraded, rendering the optimized plan directly");
            Self::fallback_reply(&best, score)
        } else {
            reply.value
        };

        let rendered = Self::render_plan(&reply);
        state.responses.set(SpecialistId::Planning, rendered.clone());
        state.control.current_state_tag = tags::done(SpecialistId::Planning.as_str());

        state.push_turn(
            TurnRecord::new(Role::Planning, rendered).with_metadata(json!({
                "score": score,
                "num_blocks": best.blocks.len(),
                "total_time_hours": best.total_time(),
                "blocks": best
                    .blocks
                    .iter()
                    .map(|b| json!({
                        "topic": b.topic.name,
                        "time_allocated": b.time_allocated,
                        "target_difficulty": b.target_difficulty,
                    }))
                    .collect::<Vec<_>>(),
                "degraded": degraded,
            })),
        );

        info!(blocks = best.blocks.len(), score, "planning agent finished");
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::AreaId;
    use crate::test_support::{FailingChatModel, ScriptedChatModel};

    fn agent_with(model: Arc<dyn ChatModel>, seed: u64) -> PlanningAgent {
        PlanningAgent::new(model, GaConfig::default(), 40.0, Some(seed)).unwrap()
    }

    #[test]
    fn test_build_catalog_normalizes_scales() {
        let state = ConversationState::new("plan");
        let (topics, mastery) = PlanningAgent::build_catalog(&state);
        assert_eq!(topics.len(), 20);
        let geometry = &topics["Plane Geometry"];
        assert!((geometry.base_difficulty - 0.9).abs() < 1e-6);
        assert!((geometry.exam_weight - 0.5).abs() < 1e-6);
        assert!((mastery["Plane Geometry"] - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_optimize_is_deterministic_under_seed() {
        let agent = agent_with(Arc::new(FailingChatModel::new()), 7);
        let state = ConversationState::new("plan");
        let (plan_a, score_a) = agent.optimize(&state);
        let (plan_b, score_b) = agent.optimize(&state);
        assert_eq!(plan_a, plan_b);
        assert!((score_a - score_b).abs() < 1e-12);
    }

    #[test]
    fn test_optimize_unique_topics_within_budget() {
        let agent = agent_with(Arc::new(FailingChatModel::new()), 13);
        let state = ConversationState::new("plan");
        let (best, score) = agent.optimize(&state);
        assert!(best.has_unique_topics());
        assert!(score.is_finite());
        for block in &best.blocks {
            assert!(block.time_allocated >= 0.5 - 1e-9);
            assert!(block.target_difficulty <= 1.0 + 1e-9);
        }
    }

    #[test]
    fn test_render_plan_lists_entries_in_order() {
        let reply = PlanningReply {
            plan: vec![
                PlanEntry {
                    topic: "Basic Arithmetic".to_string(),
                    description: "Drill fractions".to_string(),
                    time_allocated: 4.0,
                },
                PlanEntry {
                    topic: "Plane Geometry".to_string(),
                    description: "Triangles".to_string(),
                    time_allocated: 2.0,
                },
            ],
            score: 0.61,
        };
        let rendered = PlanningAgent::render_plan(&reply);
        assert!(rendered.starts_with("# Personalized Study Plan"));
        assert!(rendered.contains("**Plan fitness:** 0.61"));
        let arithmetic = rendered.find("1. **Basic Arithmetic** - 4.0 h").unwrap();
        let geometry = rendered.find("2. **Plane Geometry** - 2.0 h").unwrap();
        assert!(arithmetic < geometry);
    }

    #[tokio::test]
    async fn test_run_degraded_renders_optimizer_output() {
        let agent = agent_with(Arc::new(FailingChatModel::new()), 21);
        let state = agent.run(ConversationState::new("Plan my study time")).await;
        let response = state.responses.get(SpecialistId::Planning).unwrap();
        assert!(response.starts_with("# Personalized Study Plan"));
        assert!(response.contains("**Plan fitness:**"));
        assert_eq!(state.control.current_state_tag, "planning_done");

        let turn = state
            .chat_history
            .iter()
            .find(|t| t.role == Role::Planning)
            .unwrap();
        assert_eq!(turn.metadata["degraded"], json!(true));
        assert!(turn.metadata["num_blocks"].as_u64().unwrap() >= 1);
    }

    #[tokio::test]
    async fn test_run_formats_via_model_when_available() {
        let model = ScriptedChatModel::new([
            r#"{"plan": [{"topic": "Basic Arithmetic", "description": "Review fractions daily",
                          "time_allocated": 5.0}],
                "score": 0.55}"#,
        ]);
        let agent = agent_with(Arc::new(model), 3);
        let state = agent.run(ConversationState::new("Plan my study time")).await;
        let response = state.responses.get(SpecialistId::Planning).unwrap();
        assert!(response.contains("Review fractions daily"));
    }

    #[tokio::test]
    async fn test_weak_area_gets_the_most_time() {
        // Knowledge profile with one weak area among otherwise strong ones,
        // under a tight time budget: the optimized plan gives the weak area
        // strictly more time than any strong area.
        let agent = PlanningAgent::new(
            Arc::new(FailingChatModel::new()),
            GaConfig {
                generations: 10,
                ..GaConfig::default()
            },
            8.0,
            Some(42),
        )
        .unwrap();

        let mut state = ConversationState::new("plan");
        for id in AreaId::ALL {
            state.student_profile.knowledge.area_mut(id).set_score(9.0);
        }
        state
            .student_profile
            .knowledge
            .area_mut(AreaId::BasicArithmetic)
            .set_score(2.0);

        let (best, _score) = agent.optimize(&state);
        let weak_time = best.time_for("Basic Arithmetic");
        assert!(weak_time > 0.0, "weak area must be covered");
        for area in AreaId::ALL {
            if area == AreaId::BasicArithmetic {
                continue;
            }
            let strong_time = best.time_for(area.display_name());
            assert!(
                weak_time > strong_time,
                "{} got {strong_time}h vs weak {weak_time}h",
                area.display_name()
            );
        }
    }
}
