//! Analysis API handlers
//!
//! POST /analyze, POST /comments/mention

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, ApiResult},
    services::image_fetcher::is_supported_image_url,
    types::{AnalysisResult, PostContext, Product},
    AppState,
};

/// POST /analyze request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub image_url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub comment: String,
}

/// POST /comments/mention request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MentionRequest {
    pub comment: String,
    pub product: Product,
    #[serde(default)]
    pub context: PostContext,
}

/// POST /comments/mention response
#[derive(Debug, Serialize, Deserialize)]
pub struct MentionResponse {
    pub comment: String,
}

/// POST /analyze
///
/// Always answers with a complete result unless the analysis itself broke.
pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult<Json<AnalysisResult>> {
    let image_url = request.image_url.trim();
    if image_url.is_empty() {
        return Err(ApiError::BadRequest("imageUrl is required".to_string()));
    }
    if !is_supported_image_url(image_url) {
        return Err(ApiError::BadRequest(
            "imageUrl must be an http(s) URL or a data URI".to_string(),
        ));
    }

    let result = state
        .orchestrator
        .analyze(image_url, &request.title, &request.comment)
        .await?;

    Ok(Json(result))
}

/// POST /comments/mention
pub async fn mention_product(
    State(state): State<AppState>,
    Json(request): Json<MentionRequest>,
) -> ApiResult<Json<MentionResponse>> {
    if request.product.affiliate_url.trim().is_empty() {
        return Err(ApiError::BadRequest("product.affiliateUrl is required".to_string()));
    }

    let comment = state
        .orchestrator
        .recommendations()
        .mention_product_in_comment(&request.comment, &request.product, &request.context)
        .await;

    Ok(Json(MentionResponse { comment }))
}

/// Build analysis routes
pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/analyze", post(analyze))
        .route("/comments/mention", post(mention_product))
}
