//! Tutoring session walkthrough
//!
//! Drives the pipeline end to end with scripted collaborators:
//! - An explanation request routed through retriever -> supervisor ->
//!   math_expert -> evaluator -> finalizer
//! - A degraded run where every model call fails and the deterministic
//!   fallbacks still produce an answer
//!
//! Run: cargo run -p mathflow --example tutoring_session

use std::sync::Arc;

use mathflow::{ConversationRequest, PipelineConfig, TutorPipeline};
use mathflow_testing::{FailingChatModel, ScriptedChatModel, StaticRetriever};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let model = Arc::new(ScriptedChatModel::new([
        r#"{"next_agent": "math_expert", "reasoning": "explanation request", "confidence": 0.92}"#.to_string(),
        r#"{"explanation": "In a right triangle the square of the hypotenuse equals the sum of the squares of the other two sides.",
            "formulas": ["a^2 + b^2 = c^2"], "difficulty": "basic",
            "related_concepts": ["right triangles", "distance formula"]}"#.to_string(),
        r#"{"areas_analyzed": ["plane_geometry"],
            "knowledge_updates": {"plane_geometry": {"new_score": 6, "confidence": "medium",
                "topics_mastered": ["pythagorean theorem"], "topics_struggling": [],
                "evidence": "asked for the statement", "change_reason": "first exposure"}},
            "overall_assessment": "progressing", "recommendations": ["practice with triples"]}"#.to_string(),
        r#"{"next_agent": "evaluator", "reasoning": "explanation needs scoring", "confidence": 0.88}"#.to_string(),
        r#"{"is_sufficient": true, "correctness_score": 0.95, "clarity_score": 0.9,
            "completeness_score": 0.85, "relevance_score": 0.95, "adaptation_score": 0.9,
            "needs_more_context": false, "improvement_suggestions": [],
            "overall_quality": "excellent"}"#.to_string(),
        r#"{"next_agent": "FINISH", "reasoning": "evaluated and sufficient", "confidence": 0.97}"#.to_string(),
    ]));
    let retriever = Arc::new(StaticRetriever::new([
        ("The Pythagorean theorem relates the three sides of a right triangle.", 0.94_f32),
        ("Euclid proved the theorem in Book I of the Elements.", 0.78),
    ]));

    let pipeline = TutorPipeline::new(model, retriever, PipelineConfig::default())?;
    let state = pipeline
        .execute(ConversationRequest::new("Explain the Pythagorean theorem"))
        .await;

    println!("=== Final response ===\n");
    println!("{}\n", state.control.final_response.as_deref().unwrap_or(""));
    println!("state tag: {}", state.control.current_state_tag);
    println!("supervisor hops: {}", state.control.supervisor_hops);
    println!(
        "comprehension level: {}",
        state.student_profile.comprehension_level
    );

    // Same request with a dead model: the rule engine routes, the fallback
    // templates answer, and the request still terminates cleanly.
    let degraded = TutorPipeline::new(
        Arc::new(FailingChatModel::new()),
        Arc::new(StaticRetriever::empty()),
        PipelineConfig::default(),
    )?;
    let answer = degraded.run("Explain the Pythagorean theorem").await;

    println!("\n=== Degraded response ===\n");
    println!("{answer}");

    Ok(())
}
