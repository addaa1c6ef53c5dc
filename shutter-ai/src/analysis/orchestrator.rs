//! Analysis orchestration
//!
//! Runs scoring and context extraction concurrently, then recommendations
//! on the extracted context. Every stage resolves to a value (its own
//! fallback if need be), bounded by the stage timeout. Only a panic inside a
//! stage ends the analysis in the ERROR state.

use crate::analysis::context_extractor::ContextExtractor;
use crate::analysis::fallback::Resolved;
use crate::analysis::progress::{ProgressEvent, ProgressReporter};
use crate::analysis::recommendation_engine::{static_fallback_group, RecommendationEngine};
use crate::analysis::scoring_engine::{fallback_score, ScoringEngine};
use crate::error::{AnalysisError, PipelineResult, USER_FACING_FAILURE};
use crate::models::{AnalysisSession, AnalysisState};
use crate::services::catalog_client::{CatalogClient, StaticCatalog};
use crate::services::image_fetcher::{is_data_uri, ImageFetcher, ImageSource, SharedImage};
use crate::services::model_client::{GeminiClient, ModelClient, ModelAvailability};
use crate::services::rate_limiter::limiter_from_config;
use crate::types::{
    flatten_products, AnalysisMetadata, AnalysisResult, AnalysisStage, PostContext,
};
use futures::FutureExt;
use shutter_common::config::TomlConfig;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Orchestrator tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorOptions {
    /// Upper bound on one stage, fallback tiers included
    pub stage_timeout: Duration,
    /// Run the one-time model availability check
    pub check_model: bool,
    /// Progress channel capacity
    pub progress_capacity: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            stage_timeout: Duration::from_secs(60),
            check_model: false,
            progress_capacity: crate::analysis::progress::DEFAULT_CAPACITY,
        }
    }
}

/// Stage value plus whether it came from a fallback
struct StageOutcome<T> {
    value: T,
    fell_back: bool,
}

pub struct AnalysisOrchestrator {
    images: Arc<dyn ImageSource>,
    scoring: ScoringEngine,
    context: ContextExtractor,
    recommendations: RecommendationEngine,
    availability: ModelAvailability,
    reporter: ProgressReporter,
    stage_timeout: Duration,
}

impl AnalysisOrchestrator {
    pub fn new(
        model: Arc<dyn ModelClient>,
        images: Arc<dyn ImageSource>,
        catalog: Arc<dyn CatalogClient>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            scoring: ScoringEngine::new(model.clone(), images.clone()),
            context: ContextExtractor::new(model.clone(), images.clone()),
            recommendations: RecommendationEngine::new(model.clone(), catalog),
            availability: ModelAvailability::new(model, options.check_model),
            reporter: ProgressReporter::new(options.progress_capacity),
            stage_timeout: options.stage_timeout,
            images,
        }
    }

    /// Wire the production components from configuration
    pub fn from_config(config: &TomlConfig, api_key: String) -> PipelineResult<Self> {
        let model = Arc::new(GeminiClient::new(&config.model, api_key)?);
        let images = Arc::new(ImageFetcher::new(&config.image)?);
        let catalog = Arc::new(StaticCatalog::new(limiter_from_config(&config.catalog)));

        info!(
            model = %config.model.model,
            limiter = ?config.catalog.limiter,
            stage_timeout_secs = config.pipeline.stage_timeout_secs,
            "Analysis orchestrator configured"
        );

        Ok(Self::new(
            model,
            images,
            catalog,
            OrchestratorOptions {
                stage_timeout: Duration::from_secs(config.pipeline.stage_timeout_secs),
                check_model: config.model.check_on_start,
                ..OrchestratorOptions::default()
            },
        ))
    }

    pub fn reporter(&self) -> &ProgressReporter {
        &self.reporter
    }

    pub fn recommendations(&self) -> &RecommendationEngine {
        &self.recommendations
    }

    /// Analyze one post
    ///
    /// Degraded stages still produce a complete result; `Err` means the
    /// analysis itself broke (see [`AnalysisError::Unexpected`]).
    pub async fn analyze(&self, image_url: &str, title: &str, comment: &str) -> PipelineResult<AnalysisResult> {
        let session = self.run(image_url, title, comment).await;
        match (session.state, session.result) {
            (AnalysisState::Complete, Some(result)) => Ok(result),
            _ => Err(AnalysisError::Unexpected(
                session.error.unwrap_or_else(|| USER_FACING_FAILURE.to_string()),
            )),
        }
    }

    /// Analyze one post and return the finished session
    pub async fn run(&self, image_url: &str, title: &str, comment: &str) -> AnalysisSession {
        let mut session = AnalysisSession::new();
        session.transition_to(AnalysisState::Analyzing);
        let analysis_id = session.analysis_id;
        let started_at = session.started_at;
        let clock = Instant::now();

        info!(%analysis_id, image_url = %redact_data_uri(image_url), "Analysis started");
        self.reporter.emit(ProgressEvent::Started { analysis_id });

        let model_available = self.availability.is_available().await;
        let image = SharedImage::new(self.images.clone(), image_url);
        let session = Mutex::new(session);

        let scoring = async {
            let outcome = self
                .run_stage(
                    AnalysisStage::PhotoScore,
                    self.scoring
                        .score_with(&image, Some(title), Some(comment), model_available),
                    fallback_score,
                )
                .await;
            if let Ok(outcome) = &outcome {
                self.stage_done(&session, AnalysisStage::PhotoScore, outcome.fell_back).await;
            }
            outcome
        };

        let context_then_recommendations = async {
            let context = self
                .run_stage(
                    AnalysisStage::Context,
                    self.context.extract_with(&image, title, comment, model_available),
                    PostContext::neutral,
                )
                .await?;
            self.stage_done(&session, AnalysisStage::Context, context.fell_back).await;

            let recommendations = self
                .run_stage(
                    AnalysisStage::Recommendations,
                    self.recommendations.recommend_with(&context.value, model_available),
                    || vec![static_fallback_group()],
                )
                .await?;
            self.stage_done(&session, AnalysisStage::Recommendations, recommendations.fell_back)
                .await;

            Ok::<_, AnalysisError>((context, recommendations))
        };

        let (score, rest) = tokio::join!(scoring, context_then_recommendations);
        let mut session = session.into_inner();

        let (score, (context, recommendations)) = match score.and_then(|s| rest.map(|r| (s, r))) {
            Ok(outcomes) => outcomes,
            Err(e) => {
                error!(%analysis_id, error = %e, "Analysis failed");
                session.fail(e.user_message());
                self.reporter.emit(ProgressEvent::Failed {
                    analysis_id,
                    message: e.user_message().to_string(),
                });
                return session;
            }
        };

        let elapsed_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
        let recommendation_groups = recommendations.value;
        let result = AnalysisResult {
            photo_score: score.value,
            context: context.value,
            all_products: flatten_products(&recommendation_groups),
            recommendation_groups,
            metadata: AnalysisMetadata {
                analysis_id,
                started_at,
                elapsed_ms,
                stages_completed: session.progress.completed_count(),
                stages_fallen_back: session.fallback_stages.len(),
                fallback_stages: session.fallback_stages.clone(),
            },
        };

        info!(
            %analysis_id,
            elapsed_ms,
            total = result.photo_score.total,
            level = %result.photo_score.level(),
            groups = result.recommendation_groups.len(),
            stages_fallen_back = result.metadata.stages_fallen_back,
            "Analysis complete"
        );
        self.reporter.emit(ProgressEvent::Completed {
            analysis_id,
            elapsed_ms,
            stages_fallen_back: result.metadata.stages_fallen_back,
        });
        session.finish(result);
        session
    }

    /// Bound a stage by the timeout and contain panics
    ///
    /// A timeout resolves to `fallback`; a panic becomes `Unexpected`.
    async fn run_stage<T, F>(
        &self,
        stage: AnalysisStage,
        future: F,
        fallback: impl FnOnce() -> T,
    ) -> PipelineResult<StageOutcome<T>>
    where
        F: Future<Output = Resolved<T>>,
    {
        match AssertUnwindSafe(tokio::time::timeout(self.stage_timeout, future))
            .catch_unwind()
            .await
        {
            Ok(Ok(resolved)) => Ok(StageOutcome {
                fell_back: resolved.fell_back(),
                value: resolved.value,
            }),
            Ok(Err(_elapsed)) => {
                let timed_out = AnalysisError::StageTimedOut {
                    stage: stage.as_str().to_string(),
                    seconds: self.stage_timeout.as_secs(),
                };
                warn!(stage = stage.as_str(), error = %timed_out, "Using stage fallback");
                Ok(StageOutcome {
                    value: fallback(),
                    fell_back: true,
                })
            }
            Err(panic) => Err(AnalysisError::Unexpected(format!(
                "Stage '{}' panicked: {}",
                stage.as_str(),
                panic_message(panic.as_ref())
            ))),
        }
    }

    async fn stage_done(&self, session: &Mutex<AnalysisSession>, stage: AnalysisStage, fell_back: bool) {
        let mut session = session.lock().await;
        session.complete_stage(stage, fell_back);
        self.reporter.emit(ProgressEvent::StageCompleted {
            analysis_id: session.analysis_id,
            stage,
            fell_back,
            progress: session.progress,
        });
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Keep data URIs out of the logs
fn redact_data_uri(image_url: &str) -> &str {
    if is_data_uri(image_url) {
        image_url.split(',').next().unwrap_or("data:")
    } else {
        image_url
    }
}
