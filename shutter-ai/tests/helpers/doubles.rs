//! Scripted stand-ins for the model, the catalog and image hosts

use async_trait::async_trait;
use shutter_ai::error::{AnalysisError, PipelineResult};
use shutter_ai::services::{
    CatalogClient, FetchedImage, ImageSource, ModelClient, ModelRequest, StaticCatalog,
};
use shutter_ai::types::Product;
use shutter_ai::{AnalysisOrchestrator, OrchestratorOptions};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Which pipeline prompt a request carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    Rubric,
    ContextMultimodal,
    ContextText,
    Keywords,
    Mention,
}

impl PromptKind {
    pub fn classify(prompt: &str) -> Self {
        if prompt.contains("採点基準") {
            Self::Rubric
        } else if prompt.contains("写真は参照できません") {
            Self::ContextText
        } else if prompt.contains("投稿の状況を分析") {
            Self::ContextMultimodal
        } else if prompt.contains("\"groups\"") {
            Self::Keywords
        } else {
            Self::Mention
        }
    }
}

#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail,
    Panic,
    Delayed(Duration, String),
}

/// Recorded model call
#[derive(Debug, Clone)]
pub struct ModelCall {
    pub kind: PromptKind,
    pub prompt: String,
    pub image_mime: Option<String>,
    pub image_base64_len: usize,
}

/// Model double answering by prompt kind (unscripted kinds fail)
pub struct ScriptedModel {
    replies: Mutex<HashMap<PromptKind, Reply>>,
    calls: Mutex<Vec<ModelCall>>,
    healthy: bool,
    health_checks: AtomicUsize,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            healthy: true,
            health_checks: AtomicUsize::new(0),
        }
    }

    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            ..Self::new()
        }
    }

    pub fn reply(self, kind: PromptKind, reply: Reply) -> Self {
        self.replies.lock().unwrap().insert(kind, reply);
        self
    }

    pub fn text(self, kind: PromptKind, text: &str) -> Self {
        self.reply(kind, Reply::Text(text.to_string()))
    }

    pub fn calls(&self) -> Vec<ModelCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_of(&self, kind: PromptKind) -> Vec<ModelCall> {
        self.calls().into_iter().filter(|c| c.kind == kind).collect()
    }

    pub fn health_check_count(&self) -> usize {
        self.health_checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: ModelRequest) -> PipelineResult<String> {
        let kind = PromptKind::classify(&request.prompt);
        self.calls.lock().unwrap().push(ModelCall {
            kind,
            prompt: request.prompt.clone(),
            image_mime: request.image.as_ref().map(|i| i.mime_type.clone()),
            image_base64_len: request.image.as_ref().map(|i| i.data_base64.len()).unwrap_or(0),
        });

        let reply = self.replies.lock().unwrap().get(&kind).cloned();
        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Delayed(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            Some(Reply::Panic) => panic!("scripted model panic for {:?}", kind),
            Some(Reply::Fail) | None => Err(AnalysisError::ModelCallFailed(format!(
                "scripted failure for {:?}",
                kind
            ))),
        }
    }

    async fn check_health(&self) -> PipelineResult<()> {
        self.health_checks.fetch_add(1, Ordering::SeqCst);
        if self.healthy {
            Ok(())
        } else {
            Err(AnalysisError::ModelUnavailable("scripted outage".to_string()))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogBehavior {
    /// Static table lookup, no rate limiting
    Table,
    Empty,
    Fail,
}

/// Catalog double recording every query
pub struct ScriptedCatalog {
    behavior: CatalogBehavior,
    queries: Mutex<Vec<String>>,
}

impl ScriptedCatalog {
    pub fn new(behavior: CatalogBehavior) -> Self {
        Self {
            behavior,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl CatalogClient for ScriptedCatalog {
    async fn search(&self, keywords: &str, max_results: usize) -> PipelineResult<Vec<Product>> {
        self.queries.lock().unwrap().push(keywords.to_string());
        match self.behavior {
            CatalogBehavior::Table => Ok(StaticCatalog::lookup(keywords, max_results)),
            CatalogBehavior::Empty => Ok(Vec::new()),
            CatalogBehavior::Fail => Err(AnalysisError::CatalogSearchFailed(
                "scripted catalog outage".to_string(),
            )),
        }
    }
}

/// Image source returning one fixed outcome
pub struct FixedImages {
    outcome: PipelineResult<FetchedImage>,
    fetches: AtomicUsize,
}

impl FixedImages {
    pub fn ok(bytes: Vec<u8>, mime_type: &str) -> Self {
        Self {
            outcome: Ok(FetchedImage {
                bytes,
                mime_type: mime_type.to_string(),
            }),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            outcome: Err(AnalysisError::FetchFailed("Image host returned status 500".to_string())),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageSource for FixedImages {
    async fn fetch(&self, _image_url: &str) -> PipelineResult<FetchedImage> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

/// Orchestrator over the given doubles with a short stage timeout
pub fn test_orchestrator(
    model: Arc<ScriptedModel>,
    images: Arc<dyn ImageSource>,
    catalog: Arc<dyn CatalogClient>,
) -> AnalysisOrchestrator {
    AnalysisOrchestrator::new(
        model,
        images,
        catalog,
        OrchestratorOptions {
            stage_timeout: Duration::from_secs(5),
            ..OrchestratorOptions::default()
        },
    )
}
