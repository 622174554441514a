//! MathFlow tutoring core - stateful graph-based tutoring agent workflows.
//!
//! A user query is threaded through a fixed workflow graph: a retriever
//! populates context, a supervisor (LM-first, rule-engine fallback) picks a
//! specialist - math explainer, exam creator, or study planner - a quality
//! evaluator scores the result, and a finalizer composes the response once
//! the supervisor signals `FINISH`. Around that core:
//!
//! - a structured-output envelope validates every model reply against a
//!   schema and degrades to typed defaults instead of failing
//! - a per-learner knowledge profile over twenty math areas is updated from
//!   each interaction
//! - a genetic optimizer evolves personalized study plans
//!   (`mathflow-planner`)
//!
//! # Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mathflow::{PipelineConfig, TutorPipeline};
//!
//! let pipeline = TutorPipeline::new(model, retriever, PipelineConfig::default())?;
//! let answer = pipeline.run("Explain the Pythagorean theorem").await;
//! println!("{answer}");
//! ```
//!
//! The model and retriever are trait objects ([`core::language_models::ChatModel`],
//! [`core::retrievers::Retriever`]); providers live outside this crate.
//! `mathflow-testing` ships scripted doubles for both.

pub mod agents;
pub mod core;
pub mod graph;
pub mod knowledge;
pub mod pipeline;
pub mod state;

#[cfg(test)]
mod test_support;

pub use crate::core::error::{Error, Result};
pub use crate::graph::{
    CompiledGraph, ExecutionConfig, ExecutionResult, StateGraph, END,
};
pub use crate::pipeline::{ConversationRequest, PipelineConfig, TutorPipeline};
pub use crate::state::ConversationState;
