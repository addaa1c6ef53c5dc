//! Context extraction tier tests

mod helpers;

use helpers::{jpeg_bytes, FixedImages, PromptKind, Reply, ScriptedModel};
use shutter_ai::analysis::ContextExtractor;
use shutter_ai::services::SharedImage;
use shutter_ai::types::PostContext;
use std::sync::Arc;

const PARK_CONTEXT: &str = r#"{"objects": ["dog", "ball"], "scene": "park", "emotion": "happy",
  "needs": ["leash"], "season": "spring", "time_of_day": "afternoon"}"#;

#[tokio::test]
async fn test_multimodal_tier_sends_image_and_text() {
    let model = Arc::new(ScriptedModel::new().text(PromptKind::ContextMultimodal, PARK_CONTEXT));
    let extractor = ContextExtractor::new(
        model.clone(),
        Arc::new(FixedImages::ok(jpeg_bytes(300), "image/jpeg")),
    );

    let context = extractor
        .extract("https://img.example.com/dog.jpg", "散歩", "公園で遊んだ")
        .await;

    assert_eq!(context.objects, vec!["dog", "ball"]);
    assert_eq!(context.time_of_day, "afternoon");

    let calls = model.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].image_mime.as_deref(), Some("image/jpeg"));
    assert_eq!(calls[0].image_base64_len, 400);
    assert!(calls[0].prompt.contains("公園で遊んだ"));
}

#[tokio::test]
async fn test_image_failure_uses_text_only_tier() {
    // Given: the image cannot be fetched but the post has text
    let model = Arc::new(ScriptedModel::new().text(PromptKind::ContextText, PARK_CONTEXT));
    let extractor = ContextExtractor::new(model.clone(), Arc::new(FixedImages::failing()));
    let image = SharedImage::new(Arc::new(FixedImages::failing()), "https://img.example.com/x.jpg");

    // When
    let resolved = extractor.extract_with(&image, "散歩", "", true).await;

    // Then: the text-only prompt produced the context
    assert_eq!(resolved.tier, "text-only");
    assert!(resolved.fell_back());
    assert_eq!(resolved.value.scene, "park");
    assert_eq!(model.calls_of(PromptKind::ContextText).len(), 1);
    assert!(model.calls_of(PromptKind::ContextText)[0].image_mime.is_none());
}

#[tokio::test]
async fn test_unparseable_reply_falls_through_to_text_only() {
    let model = Arc::new(
        ScriptedModel::new()
            .text(PromptKind::ContextMultimodal, "ごめんなさい、分かりません")
            .text(PromptKind::ContextText, r#"{"scene": "kitchen"}"#),
    );
    let extractor = ContextExtractor::new(
        model,
        Arc::new(FixedImages::ok(jpeg_bytes(64), "image/jpeg")),
    );

    let context = extractor
        .extract("https://img.example.com/food.jpg", "", "朝ごはん")
        .await;

    // Absent fields take neutral defaults
    let neutral = PostContext::neutral();
    assert_eq!(context.scene, "kitchen");
    assert_eq!(context.emotion, neutral.emotion);
    assert!(context.objects.is_empty());
}

#[tokio::test]
async fn test_no_text_skips_text_only_tier() {
    let model = Arc::new(ScriptedModel::new().text(PromptKind::ContextText, PARK_CONTEXT));
    let extractor = ContextExtractor::new(model.clone(), Arc::new(FixedImages::failing()));
    let image = SharedImage::new(Arc::new(FixedImages::failing()), "https://img.example.com/x.jpg");

    let resolved = extractor.extract_with(&image, "  ", "", true).await;

    assert_eq!(resolved.tier, "neutral");
    assert_eq!(resolved.value, PostContext::neutral());
    assert!(model.calls().is_empty());
}

#[tokio::test]
async fn test_every_tier_failing_yields_neutral_context() {
    let model = Arc::new(
        ScriptedModel::new()
            .reply(PromptKind::ContextMultimodal, Reply::Fail)
            .reply(PromptKind::ContextText, Reply::Fail),
    );
    let extractor = ContextExtractor::new(
        model.clone(),
        Arc::new(FixedImages::ok(jpeg_bytes(64), "image/jpeg")),
    );

    let context = extractor
        .extract("https://img.example.com/x.jpg", "タイトル", "コメント")
        .await;

    assert_eq!(context, PostContext::neutral());
    assert_eq!(model.calls().len(), 2);
}
