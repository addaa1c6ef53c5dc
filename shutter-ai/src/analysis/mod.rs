//! Post analysis pipeline
//!
//! Stages (scoring, context, recommendations) and the orchestrator that runs
//! them. Each stage expresses its fallbacks as a [`fallback::FallbackChain`].

pub mod context_extractor;
pub mod fallback;
pub mod orchestrator;
pub mod progress;
pub mod recommendation_engine;
pub mod response_parser;
pub mod scoring_engine;

pub use context_extractor::ContextExtractor;
pub use fallback::{FallbackChain, Resolved};
pub use orchestrator::{AnalysisOrchestrator, OrchestratorOptions};
pub use progress::{ProgressEvent, ProgressReporter};
pub use recommendation_engine::RecommendationEngine;
pub use scoring_engine::ScoringEngine;
