//! Genetic study-plan optimizer.
//!
//! Given a topic catalog, a learner's per-topic mastery, and an available
//! time budget, the optimizer evolves [`StudyPlan`]s - ordered sequences of
//! `(topic, time, target difficulty)` blocks with pairwise-distinct topics -
//! toward a fitness that rewards catalog coverage, time on weak topics,
//! staying inside the time budget, and a smooth difficulty progression.
//!
//! The optimizer is fully in-memory and synchronous, and every stochastic
//! entry point takes an explicit `Rng`, so callers (and tests) control
//! determinism by seeding.
//!
//! ```rust,ignore
//! use mathflow_planner::{evolve, generate_population, evaluate_plan, GaConfig};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let mut rng = StdRng::seed_from_u64(7);
//! let config = GaConfig::default();
//! let population = generate_population(60, &topics, 40.0, &config, &mut rng);
//! let outcome = evolve(population, |p| evaluate_plan(p, &learner, &topics), &config, &mut rng);
//! println!("best fitness: {}", outcome.best_fitness_history.last().unwrap());
//! ```

pub mod entities;
pub mod evolution;
pub mod fitness;

pub use entities::{Learner, StudyBlock, StudyPlan, Topic};
pub use evolution::{
    evolve, generate_population, generate_random_plan, mutate, order_crossover,
    tournament_select, EvolutionOutcome, GaConfig,
};
pub use fitness::evaluate_plan;
