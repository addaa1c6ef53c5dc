//! Post context extraction
//!
//! Tiers: image + captions → captions only → neutral context.

use crate::analysis::fallback::{FallbackChain, Resolved};
use crate::analysis::response_parser::{field, parse_json_object, string_field, string_list};
use crate::error::{AnalysisError, PipelineResult};
use crate::services::image_fetcher::{ImageSource, SharedImage};
use crate::services::model_client::{ModelClient, ModelRequest};
use crate::types::PostContext;
use futures::FutureExt;
use std::sync::Arc;
use tracing::info;

const CONTEXT_KEYS: [&str; 6] = ["objects", "scene", "emotion", "needs", "season", "timeOfDay"];

const CONTEXT_SCHEMA: &str = r#"{
  "objects": ["写っている主な物体 (最大10個)"],
  "scene": "場面 (例: beach, cafe, mountain)",
  "emotion": "写真から感じられる感情",
  "needs": ["投稿者が必要としていそうな物 (最大10個)"],
  "season": "spring | summer | autumn | winter | unknown",
  "timeOfDay": "morning | daytime | evening | night | unknown"
}"#;

fn caption_block(title: &str, comment: &str) -> String {
    format!(
        "投稿タイトル: {}\n投稿コメント: {}",
        if title.trim().is_empty() { "(なし)" } else { title.trim() },
        if comment.trim().is_empty() { "(なし)" } else { comment.trim() },
    )
}

/// Prompt for the image + text tier
pub fn build_multimodal_prompt(title: &str, comment: &str) -> String {
    format!(
        "添付の写真と以下のテキストから、投稿の状況を分析してください。\n\n{}\n\n\
         次の形式のJSONのみを返してください。分からない項目は \"unknown\" にしてください:\n{}",
        caption_block(title, comment),
        CONTEXT_SCHEMA
    )
}

/// Prompt for the text-only tier
pub fn build_text_prompt(title: &str, comment: &str) -> String {
    format!(
        "写真は参照できません。以下のテキストだけから、投稿の状況を推測してください。\n\n{}\n\n\
         次の形式のJSONのみを返してください。分からない項目は \"unknown\" にしてください:\n{}",
        caption_block(title, comment),
        CONTEXT_SCHEMA
    )
}

/// Validate a model reply into a context, substituting defaults for absent fields
pub fn parse_context(reply: &str) -> PipelineResult<PostContext> {
    let root = parse_json_object(reply)?;
    if !CONTEXT_KEYS.iter().any(|key| field(&root, key).is_some()) {
        return Err(AnalysisError::ResponseParseFailed(
            "Reply contains no context fields".to_string(),
        ));
    }

    let neutral = PostContext::neutral();
    let context = PostContext {
        objects: string_list(field(&root, "objects")),
        scene: string_field(&root, "scene").unwrap_or(neutral.scene),
        emotion: string_field(&root, "emotion").unwrap_or(neutral.emotion),
        needs: string_list(field(&root, "needs")),
        season: string_field(&root, "season").unwrap_or(neutral.season),
        time_of_day: string_field(&root, "timeOfDay").unwrap_or(neutral.time_of_day),
    };

    Ok(context)
}

pub struct ContextExtractor {
    model: Arc<dyn ModelClient>,
    images: Arc<dyn ImageSource>,
}

impl ContextExtractor {
    pub fn new(model: Arc<dyn ModelClient>, images: Arc<dyn ImageSource>) -> Self {
        Self { model, images }
    }

    /// Extract a context for one post; never fails
    pub async fn extract(&self, image_url: &str, title: &str, comment: &str) -> PostContext {
        let image = SharedImage::new(self.images.clone(), image_url);
        self.extract_with(&image, title, comment, true).await.value
    }

    pub async fn extract_with(
        &self,
        image: &SharedImage,
        title: &str,
        comment: &str,
        model_available: bool,
    ) -> Resolved<PostContext> {
        let has_text = !title.trim().is_empty() || !comment.trim().is_empty();

        let resolved = FallbackChain::new("context")
            .tier("multimodal", || {
                async move {
                    if !model_available {
                        return Err(AnalysisError::ModelUnavailable(
                            "skipped by availability check".to_string(),
                        ));
                    }
                    let encoded = image.get().await?;
                    let prompt = build_multimodal_prompt(title, comment);
                    let reply = self
                        .model
                        .generate(ModelRequest::with_image(prompt, &encoded))
                        .await?;
                    parse_context(&reply)
                }
                .boxed()
            })
            .tier_if(has_text, "text-only", || {
                async move {
                    if !model_available {
                        return Err(AnalysisError::ModelUnavailable(
                            "skipped by availability check".to_string(),
                        ));
                    }
                    let reply = self
                        .model
                        .generate(ModelRequest::text(build_text_prompt(title, comment)))
                        .await?;
                    parse_context(&reply)
                }
                .boxed()
            })
            .resolve("neutral", PostContext::neutral)
            .await;

        info!(
            scene = %resolved.value.scene,
            objects = resolved.value.objects.len(),
            tier = resolved.tier,
            "Context extracted"
        );
        resolved
    }
}
