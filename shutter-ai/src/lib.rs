//! shutter-ai library interface
//!
//! Post analysis pipeline for the photo-sharing app: photo scoring, context
//! extraction and product recommendations, plus the HTTP surface around it.

pub mod analysis;
pub mod api;
pub mod error;
pub mod models;
pub mod services;
pub mod types;

pub use crate::analysis::{AnalysisOrchestrator, OrchestratorOptions};
pub use crate::error::{AnalysisError, ApiError, ApiResult, PipelineResult};
pub use crate::types::AnalysisResult;

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<AnalysisOrchestrator>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(orchestrator: Arc<AnalysisOrchestrator>) -> Self {
        Self {
            orchestrator,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::analysis_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
