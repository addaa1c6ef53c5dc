//! HTTP API tests
//!
//! Drive the router with `oneshot` requests over scripted doubles.

mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use helpers::{
    jpeg_bytes, test_orchestrator, CatalogBehavior, FixedImages, PromptKind, Reply,
    ScriptedCatalog, ScriptedModel,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use shutter_ai::error::USER_FACING_FAILURE;
use shutter_ai::{build_router, AppState};
use std::sync::Arc;
use tower::ServiceExt;

const SCORE_REPLY: &str = r#"{"technical": 20, "composition": 18, "creativity": 17, "engagement": 19,
  "comment": "光の使い方が印象的です。"}"#;

fn app(model: ScriptedModel) -> Router {
    let orchestrator = test_orchestrator(
        Arc::new(model),
        Arc::new(FixedImages::ok(jpeg_bytes(512), "image/jpeg")),
        Arc::new(ScriptedCatalog::new(CatalogBehavior::Table)),
    );
    build_router(AppState::new(Arc::new(orchestrator)))
}

async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_health_endpoint() {
    let response = app(ScriptedModel::new())
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "shutter-ai");
    assert!(json["uptimeSeconds"].is_u64());
    assert!(json["gitHash"].is_string());
}

#[tokio::test]
async fn test_analyze_rejects_blank_image_url() {
    let (status, body) = post_json(
        app(ScriptedModel::new()),
        "/analyze",
        json!({"imageUrl": "   ", "title": "t"}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_analyze_rejects_unsupported_scheme() {
    let (status, _) = post_json(
        app(ScriptedModel::new()),
        "/analyze",
        json!({"imageUrl": "ftp://example.com/a.jpg"}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_analyze_accepts_uppercase_scheme() {
    let model = ScriptedModel::new().text(PromptKind::Rubric, SCORE_REPLY);

    let (status, body) = post_json(
        app(model),
        "/analyze",
        json!({"imageUrl": "HTTPS://img.example.com/p.jpg", "title": "t"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["photoScore"]["total"], 74);
}

#[tokio::test]
async fn test_analyze_returns_complete_result() {
    let model = ScriptedModel::new()
        .text(PromptKind::Rubric, SCORE_REPLY)
        .text(
            PromptKind::ContextMultimodal,
            r#"{"objects": ["coffee"], "scene": "cafe", "emotion": "relaxed"}"#,
        );

    let (status, body) = post_json(
        app(model),
        "/analyze",
        json!({"imageUrl": "data:image/jpeg;base64,/9j/4AAQ", "title": "朝のカフェ"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["photoScore"]["total"], 74);
    assert_eq!(body["photoScore"]["level"], "B");
    assert_eq!(body["context"]["scene"], "cafe");
    assert_eq!(body["context"]["timeOfDay"], "unknown");
    assert!(!body["recommendationGroups"].as_array().unwrap().is_empty());
    assert!(!body["allProducts"].as_array().unwrap().is_empty());
    assert_eq!(body["metadata"]["stagesCompleted"], 3);
}

#[tokio::test]
async fn test_analyze_panic_maps_to_user_facing_error() {
    let model = ScriptedModel::new().reply(PromptKind::Rubric, Reply::Panic);

    let (status, body) = post_json(
        app(model),
        "/analyze",
        json!({"imageUrl": "https://img.example.com/p.jpg"}),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "ANALYSIS_FAILED");
    assert_eq!(body["error"]["message"], USER_FACING_FAILURE);
}

#[tokio::test]
async fn test_mention_endpoint_returns_linked_comment() {
    let product = json!({
        "id": "gad-001",
        "name": "モバイルバッテリー 10000mAh",
        "price": "¥2,990",
        "affiliateUrl": "https://www.amazon.co.jp/dp/gad-001?tag=shutter-22",
        "category": "gadget",
        "tags": ["充電"]
    });

    let (status, body) = post_json(
        app(ScriptedModel::new()),
        "/comments/mention",
        json!({"comment": "旅行の一枚", "product": product}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["comment"],
        "旅行の一枚\n\n[モバイルバッテリー 10000mAh](https://www.amazon.co.jp/dp/gad-001?tag=shutter-22)"
    );
}

#[tokio::test]
async fn test_mention_requires_affiliate_url() {
    let product = json!({
        "id": "x",
        "name": "x",
        "price": "¥0",
        "affiliateUrl": "",
        "category": "gadget",
        "tags": []
    });

    let (status, _) = post_json(
        app(ScriptedModel::new()),
        "/comments/mention",
        json!({"comment": "c", "product": product}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}
