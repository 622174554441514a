//! The tutoring pipeline: graph topology and the conversation transport.
//!
//! Fixed topology:
//!
//! ```text
//! entry -> retriever -> supervisor -+-> math_expert ---+
//!                        ^          +-> exam_creator --+-> (back to supervisor)
//!                        |          +-> planning ------+
//!                        |          +-> evaluator -----+
//!                        |          +-> FINISH -> finalizer -> exit
//!                        +--------------------------------+
//! ```
//!
//! Only the supervisor edge is conditional; every specialist returns to the
//! supervisor. The caller sees nothing but the final composed string -
//! failures degrade inside the nodes and are visible only through state tags
//! and history metadata.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mathflow_planner::GaConfig;
use serde_json::json;
use tracing::{error, info};

use crate::agents::evaluator::Evaluator;
use crate::agents::exam_creator::ExamCreator;
use crate::agents::math_expert::MathExpert;
use crate::agents::planning::PlanningAgent;
use crate::agents::routing;
use crate::agents::supervisor::Supervisor;
use crate::core::error::Result;
use crate::core::language_models::ChatModel;
use crate::core::retrievers::{rank_passages, Retriever, ScoredPassage};
use crate::graph::{CompiledGraph, ExecutionConfig, StateGraph, END};
use crate::state::{
    tags, BdiState, ConversationState, Role, SpecialistId, StudentProfile, TurnRecord,
};

/// Emitted when no specialist produced anything usable.
pub const NO_ADEQUATE_RESPONSE: &str =
    "I could not produce an adequate answer to this query.";

/// Appended when the supervisor hop cap cut the conversation short.
pub const INCOMPLETE_NOTE: &str = "_Note: this response may be incomplete._";

/// Pipeline configuration.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Supervisor hop cap per request.
    pub max_steps: u32,
    /// Passages requested from the retriever.
    pub top_k: usize,
    /// Optimizer generations.
    pub ga_generations: usize,
    /// Inclusive range the optimizer population size is drawn from.
    pub ga_population: (usize, usize),
    /// Optimizer mutation rate.
    pub mutation_rate: f64,
    /// Study-time budget handed to the optimizer, in hours.
    pub available_time_hours: f64,
    /// Which specialist's response the finalizer prefers, in order.
    pub finalizer_priority: Vec<SpecialistId>,
    /// Wall-clock budget for a whole request.
    pub deadline: Option<Duration>,
    /// Seed for the optimizer RNG; `None` seeds from entropy.
    pub ga_seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_steps: 12,
            top_k: 3,
            ga_generations: 5,
            ga_population: (50, 100),
            mutation_rate: 0.3,
            available_time_hours: 40.0,
            finalizer_priority: vec![
                SpecialistId::MathExpert,
                SpecialistId::ExamCreator,
                SpecialistId::Planning,
            ],
            deadline: None,
            ga_seed: None,
        }
    }
}

impl PipelineConfig {
    /// Override the supervisor hop cap.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Override the retrieval depth.
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Override the optimizer generation count.
    #[must_use]
    pub fn with_ga_generations(mut self, generations: usize) -> Self {
        self.ga_generations = generations;
        self
    }

    /// Override the optimizer population range.
    #[must_use]
    pub fn with_ga_population(mut self, low: usize, high: usize) -> Self {
        self.ga_population = (low, high);
        self
    }

    /// Override the mutation rate.
    #[must_use]
    pub fn with_mutation_rate(mut self, rate: f64) -> Self {
        self.mutation_rate = rate;
        self
    }

    /// Override the study-time budget.
    #[must_use]
    pub fn with_available_time_hours(mut self, hours: f64) -> Self {
        self.available_time_hours = hours;
        self
    }

    /// Override the finalizer priority order.
    #[must_use]
    pub fn with_finalizer_priority(mut self, priority: Vec<SpecialistId>) -> Self {
        self.finalizer_priority = priority;
        self
    }

    /// Set a wall-clock deadline for each request.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Seed the optimizer RNG (tests).
    #[must_use]
    pub fn with_ga_seed(mut self, seed: u64) -> Self {
        self.ga_seed = Some(seed);
        self
    }
}

/// A conversation request: the query plus whatever the transport layer
/// carried over from earlier requests.
#[derive(Clone, Debug, Default)]
pub struct ConversationRequest {
    /// The user query.
    pub query: String,
    /// Prior conversation turns.
    pub history: Vec<TurnRecord>,
    /// The learner profile.
    pub profile: StudentProfile,
    /// Prior BDI record, if any.
    pub bdi: Option<BdiState>,
}

impl ConversationRequest {
    /// A fresh request with no carried-over state.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Carry over conversation history.
    #[must_use]
    pub fn with_history(mut self, history: Vec<TurnRecord>) -> Self {
        self.history = history;
        self
    }

    /// Carry over a learner profile.
    #[must_use]
    pub fn with_profile(mut self, profile: StudentProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Carry over a BDI record.
    #[must_use]
    pub fn with_bdi(mut self, bdi: BdiState) -> Self {
        self.bdi = Some(bdi);
        self
    }
}

/// Placeholder context substituted when retrieval fails.
fn fallback_passages() -> Vec<ScoredPassage> {
    vec![
        ScoredPassage::new("Fallback mathematics reference 1", 0.5),
        ScoredPassage::new("Fallback mathematics reference 2", 0.4),
    ]
}

/// Compose the final response. Deterministic and idempotent: it recomputes
/// from the responses every time instead of appending to previous output.
fn finalize(mut state: ConversationState, priority: &[SpecialistId]) -> ConversationState {
    let base = priority
        .iter()
        .find_map(|id| state.responses.get(*id))
        .unwrap_or(NO_ADEQUATE_RESPONSE)
        .to_string();

    let final_response = if state.control.step_cap_reached {
        format!("{base}\n\n{INCOMPLETE_NOTE}")
    } else {
        base
    };

    info!(chars = final_response.len(), "finalizing response");
    state.control.final_response = Some(final_response);
    state.control.current_state_tag = tags::FINISH.to_string();
    state.control.needs_external_search = false;
    state
}

/// Graph node ids.
mod nodes {
    pub const RETRIEVER: &str = "retriever";
    pub const SUPERVISOR: &str = "supervisor";
    pub const FINALIZER: &str = "finalizer";
}

/// The conversational tutoring pipeline.
pub struct TutorPipeline {
    graph: CompiledGraph<ConversationState>,
    config: PipelineConfig,
}

impl TutorPipeline {
    /// Assemble the workflow graph around a model and a retriever.
    pub fn new(
        model: Arc<dyn ChatModel>,
        retriever: Arc<dyn Retriever>,
        config: PipelineConfig,
    ) -> Result<Self> {
        let supervisor = Arc::new(Supervisor::new(Arc::clone(&model), config.max_steps)?);
        let math_expert = Arc::new(MathExpert::new(Arc::clone(&model))?);
        let exam_creator = Arc::new(ExamCreator::new(Arc::clone(&model))?);
        let evaluator = Arc::new(Evaluator::new(Arc::clone(&model))?);
        let planning = Arc::new(PlanningAgent::new(
            Arc::clone(&model),
            GaConfig {
                generations: config.ga_generations,
                population_range: config.ga_population,
                mutation_rate: config.mutation_rate,
                ..GaConfig::default()
            },
            config.available_time_hours,
            config.ga_seed,
        )?);

        let mut graph: StateGraph<ConversationState> = StateGraph::new();

        {
            let retriever = Arc::clone(&retriever);
            let top_k = config.top_k;
            graph.add_node_from_fn(nodes::RETRIEVER, move |state| {
                let retriever = Arc::clone(&retriever);
                Box::pin(async move { Ok(retrieve_node(retriever, top_k, state).await) })
            });
        }
        {
            let agent = Arc::clone(&supervisor);
            graph.add_node_from_fn(nodes::SUPERVISOR, move |state| {
                let agent = Arc::clone(&agent);
                Box::pin(async move { Ok(agent.run(state).await) })
            });
        }
        {
            let agent = Arc::clone(&math_expert);
            graph.add_node_from_fn(routing::MATH_EXPERT, move |state| {
                let agent = Arc::clone(&agent);
                Box::pin(async move { Ok(agent.run(state).await) })
            });
        }
        {
            let agent = Arc::clone(&exam_creator);
            graph.add_node_from_fn(routing::EXAM_CREATOR, move |state| {
                let agent = Arc::clone(&agent);
                Box::pin(async move { Ok(agent.run(state).await) })
            });
        }
        {
            let agent = Arc::clone(&planning);
            graph.add_node_from_fn(routing::PLANNING, move |state| {
                let agent = Arc::clone(&agent);
                Box::pin(async move { Ok(agent.run(state).await) })
            });
        }
        {
            let agent = Arc::clone(&evaluator);
            graph.add_node_from_fn(routing::EVALUATOR, move |state| {
                let agent = Arc::clone(&agent);
                Box::pin(async move { Ok(agent.run(state).await) })
            });
        }
        {
            let priority = config.finalizer_priority.clone();
            graph.add_node_from_fn(nodes::FINALIZER, move |state| {
                let priority = priority.clone();
                Box::pin(async move { Ok(finalize(state, &priority)) })
            });
        }

        graph.set_entry_point(nodes::RETRIEVER);
        graph.add_edge(nodes::RETRIEVER, nodes::SUPERVISOR);

        let routes = HashMap::from([
            (routing::MATH_EXPERT.to_string(), routing::MATH_EXPERT.to_string()),
            (routing::EXAM_CREATOR.to_string(), routing::EXAM_CREATOR.to_string()),
            (routing::PLANNING.to_string(), routing::PLANNING.to_string()),
            (routing::EVALUATOR.to_string(), routing::EVALUATOR.to_string()),
            (routing::FINISH.to_string(), nodes::FINALIZER.to_string()),
        ]);
        graph.add_conditional_edges(nodes::SUPERVISOR, supervisor_router, routes);

        graph.add_edge(routing::MATH_EXPERT, nodes::SUPERVISOR);
        graph.add_edge(routing::EXAM_CREATOR, nodes::SUPERVISOR);
        graph.add_edge(routing::PLANNING, nodes::SUPERVISOR);
        graph.add_edge(routing::EVALUATOR, nodes::SUPERVISOR);
        graph.add_edge(nodes::FINALIZER, END);

        Ok(Self {
            graph: graph.compile()?,
            config,
        })
    }

    /// Run one conversation request, threading in carried-over state.
    /// Never fails: every failure path degrades into the final response.
    pub async fn execute(&self, request: ConversationRequest) -> ConversationState {
        info!(query = %request.query, "pipeline starting");

        let mut state = ConversationState::new(request.query.clone());
        state.chat_history = request.history;
        state.student_profile = request.profile;
        state.bdi = request.bdi;

        // Worst case per hop is a supervisor plus a specialist, with the
        // retriever and finalizer on top.
        let step_limit = 2 * self.config.max_steps as usize + 8;
        let mut exec = ExecutionConfig::default().with_step_limit(step_limit);
        if let Some(deadline) = self.config.deadline {
            exec = exec.with_deadline(deadline, nodes::FINALIZER);
        }

        match self.graph.invoke_with_config(state, exec).await {
            Ok(result) => {
                info!(
                    nodes = result.nodes_executed.len(),
                    "pipeline finished"
                );
                result.final_state
            }
            Err(e) => {
                error!(error = %e, "pipeline aborted, composing degraded response");
                let mut degraded = ConversationState::new(request.query);
                degraded.control.final_response = Some(NO_ADEQUATE_RESPONSE.to_string());
                degraded.control.current_state_tag = tags::FINISH.to_string();
                degraded
            }
        }
    }

    /// Run one query and return only the final response string.
    pub async fn run(&self, query: &str) -> String {
        let state = self.execute(ConversationRequest::new(query)).await;
        state
            .control
            .final_response
            .unwrap_or_else(|| NO_ADEQUATE_RESPONSE.to_string())
    }
}

/// Router over the supervisor's decision; unknown keys fall back to the
/// math explainer.
fn supervisor_router(state: &ConversationState) -> String {
    let decision = state
        .control
        .next_agent
        .as_deref()
        .unwrap_or(routing::MATH_EXPERT);
    if routing::ALLOWED.contains(&decision) {
        decision.to_string()
    } else {
        routing::MATH_EXPERT.to_string()
    }
}

/// Retriever node: record the user turn once, fetch and rank passages,
/// substitute placeholders on failure.
async fn retrieve_node(
    retriever: Arc<dyn Retriever>,
    top_k: usize,
    mut state: ConversationState,
) -> ConversationState {
    let query = state.initial_query.clone();

    let already_recorded = state
        .chat_history
        .iter()
        .any(|t| t.role == Role::User && t.content == query);
    if !already_recorded {
        state.push_turn(
            TurnRecord::new(Role::User, query.clone())
                .with_metadata(json!({"is_initial_query": true})),
        );
    }

    match retriever._retrieve(&query, top_k).await {
        Ok(passages) => {
            let ranked = rank_passages(passages, top_k);
            info!(passages = ranked.len(), "retriever done");
            state.retrieved_context = ranked;
            state.control.current_state_tag = tags::RETRIEVER_DONE.to_string();
        }
        Err(e) => {
            error!(error = %e, "retriever failed, substituting placeholder context");
            state.retrieved_context = fallback_passages();
            state.control.current_state_tag = tags::RETRIEVER_DEGRADED.to_string();
        }
    }
    state
}
