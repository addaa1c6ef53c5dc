//! Multimodal model client
//!
//! The pipeline only depends on [`ModelClient`]: prompt text plus an optional
//! inline image in, free text out. [`GeminiClient`] implements it against the
//! Google Generative Language `generateContent` endpoint.

use crate::error::{AnalysisError, PipelineResult};
use crate::services::image_fetcher::EncodedImage;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shutter_common::config::ModelConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Base64 image attached to a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data_base64: String,
}

impl From<&EncodedImage> for InlineImage {
    fn from(image: &EncodedImage) -> Self {
        Self {
            mime_type: image.mime_type.clone(),
            data_base64: image.data_base64.clone(),
        }
    }
}

/// One model invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRequest {
    pub prompt: String,
    pub image: Option<InlineImage>,
}

impl ModelRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
        }
    }

    pub fn with_image(prompt: impl Into<String>, image: &EncodedImage) -> Self {
        Self {
            prompt: prompt.into(),
            image: Some(image.into()),
        }
    }
}

/// Generative model seam
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Client name for logs
    fn name(&self) -> &str;

    /// Send a prompt and return the model's raw text reply
    async fn generate(&self, request: ModelRequest) -> PipelineResult<String>;

    /// Cheap availability check; defaults to available
    async fn check_health(&self) -> PipelineResult<()> {
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Gemini wire format
// ----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData<'a> },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Google Generative Language API client
pub struct GeminiClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &ModelConfig, api_key: String) -> PipelineResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| AnalysisError::Unexpected(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    fn model_url(&self) -> String {
        format!("{}/models/{}", self.endpoint, self.model)
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: ModelRequest) -> PipelineResult<String> {
        let mut parts = vec![Part::Text {
            text: &request.prompt,
        }];
        if let Some(image) = &request.image {
            parts.push(Part::InlineData {
                inline_data: InlineData {
                    mime_type: &image.mime_type,
                    data: &image.data_base64,
                },
            });
        }

        let body = GenerateContentRequest {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                temperature: 0.4,
                max_output_tokens: 2048,
            },
        };

        debug!(
            model = %self.model,
            prompt_chars = request.prompt.chars().count(),
            has_image = request.image.is_some(),
            "Calling generateContent"
        );

        let response = self
            .client
            .post(format!("{}:generateContent", self.model_url()))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalysisError::ModelCallFailed(format!("Request failed: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AnalysisError::ModelCallFailed(format!(
                "Model API returned status {}: {}",
                status,
                detail.chars().take(200).collect::<String>()
            )));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::ModelCallFailed(format!("Unreadable model response: {}", e)))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(AnalysisError::ModelCallFailed(
                "Model returned no text".to_string(),
            ));
        }

        Ok(text)
    }

    async fn check_health(&self) -> PipelineResult<()> {
        let response = self
            .client
            .get(self.model_url())
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| AnalysisError::ModelUnavailable(e.without_url().to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AnalysisError::ModelUnavailable(format!(
                "Model metadata request returned {}",
                response.status()
            )))
        }
    }
}

/// Memoized one-time model availability check
///
/// The first caller runs [`ModelClient::check_health`]; everyone after that reuses
/// the answer for the lifetime of this value (one per orchestrator).
pub struct ModelAvailability {
    model: Arc<dyn ModelClient>,
    enabled: bool,
    available: OnceCell<bool>,
}

impl ModelAvailability {
    pub fn new(model: Arc<dyn ModelClient>, enabled: bool) -> Self {
        Self {
            model,
            enabled,
            available: OnceCell::new(),
        }
    }

    pub async fn is_available(&self) -> bool {
        if !self.enabled {
            return true;
        }

        *self
            .available
            .get_or_init(|| async {
                match self.model.check_health().await {
                    Ok(()) => {
                        info!(model = %self.model.name(), "Model availability confirmed");
                        true
                    }
                    Err(e) => {
                        warn!(
                            model = %self.model.name(),
                            error = %e,
                            "Model unavailable, analyses will use model-free fallbacks"
                        );
                        false
                    }
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct HealthCheckCounter {
        calls: AtomicUsize,
        healthy: bool,
    }

    #[async_trait]
    impl ModelClient for HealthCheckCounter {
        fn name(&self) -> &str {
            "health-check-counter"
        }

        async fn generate(&self, _request: ModelRequest) -> PipelineResult<String> {
            Ok("{}".to_string())
        }

        async fn check_health(&self) -> PipelineResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.healthy {
                Ok(())
            } else {
                Err(AnalysisError::ModelUnavailable("401".to_string()))
            }
        }
    }

    #[tokio::test]
    async fn test_health_check_runs_once() {
        let model = Arc::new(HealthCheckCounter {
            calls: AtomicUsize::new(0),
            healthy: false,
        });
        let availability = ModelAvailability::new(model.clone(), true);

        assert!(!availability.is_available().await);
        assert!(!availability.is_available().await);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disabled_check_never_calls_model() {
        let model = Arc::new(HealthCheckCounter {
            calls: AtomicUsize::new(0),
            healthy: false,
        });
        let availability = ModelAvailability::new(model.clone(), false);

        assert!(availability.is_available().await);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_request_wire_shape() {
        let image = EncodedImage {
            mime_type: "image/png".to_string(),
            data_base64: "AAAA".to_string(),
            byte_len: 3,
        };
        let request = ModelRequest::with_image("describe", &image);
        let inline = request.image.as_ref().unwrap();
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text {
                        text: &request.prompt,
                    },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: &inline.mime_type,
                            data: &inline.data_base64,
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: 0.4,
                max_output_tokens: 16,
            },
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "describe");
        assert_eq!(json["contents"][0]["parts"][1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 16);
    }

    #[test]
    fn test_response_text_extraction_shape() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"{\"a\":"},{"text":"1}"}]}}]}"#;
        let parsed: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        let text: String = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect();
        assert_eq!(text, r#"{"a":1}"#);
    }
}
