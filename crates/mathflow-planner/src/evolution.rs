//! Evolutionary loop: population initialization, structured tournament
//! selection, order crossover, and per-block mutation.
//!
//! Topic uniqueness within a plan is an invariant of every operator:
//! initialization samples distinct topics, order crossover fills from the
//! second parent while skipping topics already in the inherited segment,
//! and mutation never changes a block's topic.

use std::collections::{BTreeMap, BTreeSet};

use rand::seq::{index, SliceRandom};
use rand::Rng;
use tracing::debug;

use crate::entities::{StudyBlock, StudyPlan, Topic};

/// Hyperparameters for the optimizer.
#[derive(Clone, Debug)]
pub struct GaConfig {
    /// Number of generations to evolve.
    pub generations: usize,
    /// Inclusive range the initial population size is drawn from.
    pub population_range: (usize, usize),
    /// Per-mutation probability.
    pub mutation_rate: f64,
    /// Minimum blocks per random plan.
    pub min_blocks: usize,
    /// Maximum blocks per random plan (also capped by the catalog size).
    pub max_blocks: usize,
    /// Minimum hours per block at initialization.
    pub min_time_per_block: f64,
    /// Maximum hours per block at initialization.
    pub max_time_per_block: f64,
    /// Whether the best-ever plan replaces the worst offspring each
    /// generation.
    pub elitism: bool,
}

impl Default for GaConfig {
    fn default() -> Self {
        Self {
            generations: 5,
            population_range: (50, 100),
            mutation_rate: 0.3,
            min_blocks: 5,
            max_blocks: 10,
            min_time_per_block: 1.0,
            max_time_per_block: 5.0,
            elitism: true,
        }
    }
}

/// Floor on block time after mutation, in hours.
const MIN_MUTATED_TIME: f64 = 0.5;
/// Half-width of the time jitter, in hours.
const TIME_SHIFT_RANGE: f64 = 1.0;
/// Half-width of the difficulty jitter.
const DIFFICULTY_SHIFT_RANGE: f64 = 0.1;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Build one random plan: `k` distinct topics in random order, block times
/// drawn from `[min_time_per_block, max_time_per_block]` without exceeding
/// `available_time`, target difficulty uniform in `[base_difficulty, 1.0]`.
pub fn generate_random_plan<R: Rng>(
    official_topics: &BTreeMap<String, Topic>,
    available_time: f64,
    config: &GaConfig,
    rng: &mut R,
) -> StudyPlan {
    if official_topics.is_empty() {
        return StudyPlan::new(Vec::new(), available_time);
    }

    let upper = config.max_blocks.min(official_topics.len()).max(1);
    let lower = config.min_blocks.clamp(1, upper);
    let num_blocks = rng.gen_range(lower..=upper);

    let all_topics: Vec<&Topic> = official_topics.values().collect();
    let mut selected: Vec<&Topic> = all_topics
        .choose_multiple(rng, num_blocks)
        .copied()
        .collect();
    selected.shuffle(rng);

    let mut blocks = Vec::with_capacity(num_blocks);
    let mut total_allocated = 0.0;

    for topic in selected {
        let max_time_this_block =
            config.max_time_per_block.min(available_time - total_allocated);
        if max_time_this_block < config.min_time_per_block {
            // No room left for another valid block
            break;
        }

        let time_allocated =
            round2(rng.gen_range(config.min_time_per_block..=max_time_this_block));
        total_allocated += time_allocated;

        let base = topic.base_difficulty.min(1.0);
        let target_difficulty = round2(rng.gen_range(base..=1.0));

        blocks.push(StudyBlock {
            topic: topic.clone(),
            time_allocated,
            target_difficulty,
        });
    }

    StudyPlan::new(blocks, available_time)
}

/// Generate the initial population.
pub fn generate_population<R: Rng>(
    size: usize,
    official_topics: &BTreeMap<String, Topic>,
    available_time: f64,
    config: &GaConfig,
    rng: &mut R,
) -> Vec<StudyPlan> {
    (0..size)
        .map(|_| generate_random_plan(official_topics, available_time, config, rng))
        .collect()
}

/// Structured tournament: shuffle, pair off, keep the fitter of each pair.
/// An odd-sized population pushes the leftover individual through unchanged.
pub fn tournament_select<R: Rng, F: Fn(&StudyPlan) -> f64>(
    population: &[StudyPlan],
    fitness: &F,
    rng: &mut R,
) -> Vec<StudyPlan> {
    let mut shuffled: Vec<StudyPlan> = population.to_vec();
    shuffled.shuffle(rng);

    let mut winners = Vec::with_capacity(shuffled.len() / 2 + 1);
    if shuffled.len() % 2 != 0 {
        if let Some(leftover) = shuffled.pop() {
            winners.push(leftover);
        }
    }
    for pair in shuffled.chunks_exact(2) {
        let winner = if fitness(&pair[0]) >= fitness(&pair[1]) {
            &pair[0]
        } else {
            &pair[1]
        };
        winners.push(winner.clone());
    }
    winners
}

fn ox_child(parent_a: &StudyPlan, parent_b: &StudyPlan, start: usize, end: usize) -> StudyPlan {
    let segment: Vec<StudyBlock> = parent_a.blocks[start..end].to_vec();
    let segment_topics: BTreeSet<String> =
        segment.iter().map(|b| b.topic.name.clone()).collect();

    let remaining: Vec<StudyBlock> = parent_b
        .blocks
        .iter()
        .filter(|b| !segment_topics.contains(&b.topic.name))
        .cloned()
        .collect();

    let split = start.min(remaining.len());
    let mut child_blocks = Vec::with_capacity(remaining.len() + segment.len());
    child_blocks.extend_from_slice(&remaining[..split]);
    child_blocks.extend(segment);
    child_blocks.extend_from_slice(&remaining[split..]);

    StudyPlan::new(child_blocks, parent_a.available_time)
}

/// Order crossover adapted for topic uniqueness: the child inherits one
/// parent's `[start, end)` segment verbatim and fills the rest from the
/// other parent in order, skipping topics already in the segment. Applied
/// symmetrically to produce two children.
pub fn order_crossover<R: Rng>(
    parent1: &StudyPlan,
    parent2: &StudyPlan,
    rng: &mut R,
) -> (StudyPlan, StudyPlan) {
    let len_blocks = parent1.blocks.len().min(parent2.blocks.len());
    if len_blocks < 2 {
        return (parent1.clone(), parent2.clone());
    }

    let mut cut_points = index::sample(rng, len_blocks, 2).into_vec();
    cut_points.sort_unstable();
    let (start, end) = (cut_points[0], cut_points[1]);

    (
        ox_child(parent1, parent2, start, end),
        ox_child(parent2, parent1, start, end),
    )
}

/// Mutate a plan: with probability `mutation_rate` swap two random blocks,
/// then independently per block jitter the time (clamped to at least half an
/// hour) and the target difficulty (clamped to `[base_difficulty, 1.0]`).
pub fn mutate<R: Rng>(plan: &StudyPlan, mutation_rate: f64, rng: &mut R) -> StudyPlan {
    let mut blocks = plan.blocks.clone();

    if blocks.len() >= 2 && rng.gen::<f64>() < mutation_rate {
        let picks = index::sample(rng, blocks.len(), 2).into_vec();
        blocks.swap(picks[0], picks[1]);
    }

    for block in &mut blocks {
        if rng.gen::<f64>() < mutation_rate {
            let delta = rng.gen_range(-TIME_SHIFT_RANGE..=TIME_SHIFT_RANGE);
            block.time_allocated = round2(block.time_allocated + delta).max(MIN_MUTATED_TIME);
        }

        if rng.gen::<f64>() < mutation_rate {
            let delta = rng.gen_range(-DIFFICULTY_SHIFT_RANGE..=DIFFICULTY_SHIFT_RANGE);
            let base = block.topic.base_difficulty.min(1.0);
            block.target_difficulty =
                round2(block.target_difficulty + delta).clamp(base, 1.0);
        }
    }

    StudyPlan::new(blocks, plan.available_time)
}

/// Result of an evolution run.
#[derive(Clone, Debug)]
pub struct EvolutionOutcome {
    /// The last generation.
    pub population: Vec<StudyPlan>,
    /// Best plan encountered across the run.
    pub best: StudyPlan,
    /// Best-ever fitness before evolution and after each generation.
    /// Non-decreasing when elitism is on.
    pub best_fitness_history: Vec<f64>,
}

fn best_index<F: Fn(&StudyPlan) -> f64>(plans: &[StudyPlan], fitness: &F) -> Option<usize> {
    plans
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| fitness(a).total_cmp(&fitness(b)))
        .map(|(i, _)| i)
}

fn worst_index<F: Fn(&StudyPlan) -> f64>(plans: &[StudyPlan], fitness: &F) -> Option<usize> {
    plans
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| fitness(a).total_cmp(&fitness(b)))
        .map(|(i, _)| i)
}

/// Run the evolutionary cycle and return the final population plus the best
/// plan found.
pub fn evolve<R: Rng, F: Fn(&StudyPlan) -> f64>(
    mut population: Vec<StudyPlan>,
    fitness: F,
    config: &GaConfig,
    rng: &mut R,
) -> EvolutionOutcome {
    let Some(initial_best) = best_index(&population, &fitness) else {
        return EvolutionOutcome {
            population,
            best: StudyPlan::default(),
            best_fitness_history: Vec::new(),
        };
    };
    let mut best = population[initial_best].clone();
    let mut history = vec![fitness(&best)];

    for generation in 0..config.generations {
        let selected = tournament_select(&population, &fitness, rng);

        let mut offspring = Vec::with_capacity(selected.len());
        for pair in selected.chunks_exact(2) {
            let (child1, child2) = order_crossover(&pair[0], &pair[1], rng);
            offspring.push(child1);
            offspring.push(child2);
        }

        if offspring.is_empty() {
            // Too few individuals left to breed; carry the survivors
            population = selected;
            history.push(fitness(&best));
            continue;
        }

        let mut mutated: Vec<StudyPlan> = offspring
            .iter()
            .map(|child| mutate(child, config.mutation_rate, rng))
            .collect();

        if config.elitism {
            if let Some(best_offspring) = best_index(&mutated, &fitness) {
                if fitness(&mutated[best_offspring]) > fitness(&best) {
                    best = mutated[best_offspring].clone();
                }
            }
            if let Some(worst) = worst_index(&mutated, &fitness) {
                mutated[worst] = best.clone();
            }
        }

        population = mutated;
        debug!(
            generation,
            population_size = population.len(),
            best_fitness = fitness(&best),
            "generation complete"
        );
        history.push(fitness(&best));
    }

    EvolutionOutcome {
        population,
        best,
        best_fitness_history: history,
    }
}
