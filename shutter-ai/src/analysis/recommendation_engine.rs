//! Product recommendations
//!
//! Tiers:
//! 1. model proposes keyword groups, each searched in the catalog
//! 2. fixed candidate categories matched against the context
//! 3. one built-in group (never empty)

use crate::analysis::fallback::{FallbackChain, Resolved};
use crate::analysis::response_parser::{field, parse_json_object, string_field, string_list};
use crate::error::{AnalysisError, PipelineResult};
use crate::services::catalog_client::CatalogClient;
use crate::services::model_client::{ModelClient, ModelRequest};
use crate::types::{PostContext, Product, RecommendationGroup};
use futures::FutureExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Groups requested from the model
pub const MAX_GROUPS: usize = 3;

/// Results requested per catalog search
pub const SEARCH_RESULTS: usize = 5;

/// Products kept per group
pub const PRODUCTS_PER_GROUP: usize = 3;

/// Keyword group proposed by the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordGroup {
    pub category: String,
    pub keywords: Vec<String>,
    pub reason: String,
}

struct Candidate {
    title: &'static str,
    reason: &'static str,
    search: &'static str,
    keywords: &'static [&'static str],
}

static PET_SUPPLIES: Candidate = Candidate {
    title: "ペット用品",
    reason: "写真に写っているペットとの毎日に",
    search: "ペット 犬 猫",
    keywords: &["pet", "dog", "cat", "puppy", "kitten", "ペット", "犬", "猫", "いぬ", "ねこ"],
};

static OUTDOOR_GEAR: Candidate = Candidate {
    title: "アウトドアグッズ",
    reason: "次のお出かけをもっと快適に",
    search: "アウトドア キャンプ 海",
    keywords: &[
        "outdoor", "beach", "sea", "ocean", "mountain", "camp", "park", "river", "hiking",
        "アウトドア", "海", "山", "キャンプ", "公園", "川", "ビーチ",
    ],
};

static GENERAL_GADGETS: Candidate = Candidate {
    title: "人気のガジェット",
    reason: "写真をもっと楽しむための便利アイテム",
    search: "ガジェット スマホ",
    keywords: &[],
};

/// Candidates tried before the general fallback, in order
static TOPICAL_CANDIDATES: [&Candidate; 2] = [&PET_SUPPLIES, &OUTDOOR_GEAR];

fn overlaps(terms: &[String], keywords: &[&str]) -> bool {
    terms.iter().any(|term| {
        keywords.iter().any(|k| {
            let k = k.to_lowercase();
            term.contains(&k) || k.contains(term.as_str())
        })
    })
}

/// Built-in group used when the catalog yields nothing
pub fn static_fallback_group() -> RecommendationGroup {
    RecommendationGroup {
        title: "おすすめアイテム".to_string(),
        reason: "素敵な写真を形に残しませんか".to_string(),
        products: vec![Product {
            id: "static-photobook".to_string(),
            name: "フォトブック作成キット".to_string(),
            price: "¥1,500".to_string(),
            image_url: None,
            affiliate_url: "https://www.amazon.co.jp/s?k=%E3%83%95%E3%82%A9%E3%83%88%E3%83%96%E3%83%83%E3%82%AF&tag=shutter-22".to_string(),
            category: "photo".to_string(),
            tags: vec!["写真".to_string(), "フォトブック".to_string()],
            reason: Some("思い出の写真をまとめて残せます".to_string()),
        }],
    }
}

pub fn build_keyword_prompt(context: &PostContext) -> String {
    format!(
        r#"写真投稿の分析結果から、投稿者に役立つ商品カテゴリを最大{max}個提案してください。

写っている物: {objects}
場面: {scene}
感情: {emotion}
必要そうな物: {needs}
季節: {season}
時間帯: {time}

次の形式のJSONのみを返してください:
{{
  "groups": [
    {{"category": "カテゴリ名", "keywords": ["検索キーワード1", "検索キーワード2"], "reason": "おすすめする理由"}}
  ]
}}"#,
        max = MAX_GROUPS,
        objects = context.objects.join(", "),
        scene = context.scene,
        emotion = context.emotion,
        needs = context.needs.join(", "),
        season = context.season,
        time = context.time_of_day,
    )
}

/// Validate the model's keyword groups (at most [`MAX_GROUPS`])
pub fn parse_keyword_groups(reply: &str) -> PipelineResult<Vec<KeywordGroup>> {
    let root = parse_json_object(reply)?;
    let items = field(&root, "groups")
        .or_else(|| field(&root, "recommendations"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| AnalysisError::ResponseParseFailed("Reply has no 'groups' array".to_string()))?;

    let groups: Vec<KeywordGroup> = items
        .iter()
        .filter_map(|item| item.as_object())
        .filter_map(|item| {
            let category = string_field(item, "category").or_else(|| string_field(item, "title"));
            let mut keywords = string_list(field(item, "keywords"));
            if keywords.is_empty() {
                keywords.extend(category.clone());
            }
            let category = category.or_else(|| keywords.first().cloned())?;
            Some(KeywordGroup {
                category,
                keywords,
                reason: string_field(item, "reason").unwrap_or_default(),
            })
        })
        .take(MAX_GROUPS)
        .collect();

    if groups.is_empty() {
        return Err(AnalysisError::ResponseParseFailed(
            "Reply contains no usable keyword groups".to_string(),
        ));
    }
    Ok(groups)
}

/// Link appended when the model cannot weave the product in itself
pub fn append_product_link(comment: &str, product: &Product) -> String {
    format!("{}\n\n[{}]({})", comment, product.name, product.affiliate_url)
}

pub struct RecommendationEngine {
    model: Arc<dyn ModelClient>,
    catalog: Arc<dyn CatalogClient>,
}

impl RecommendationEngine {
    pub fn new(model: Arc<dyn ModelClient>, catalog: Arc<dyn CatalogClient>) -> Self {
        Self { model, catalog }
    }

    /// Recommendation groups for a context; never empty
    pub async fn recommend(&self, context: &PostContext) -> Vec<RecommendationGroup> {
        self.recommend_with(context, true).await.value
    }

    /// With `model_available == false` only the candidate and built-in tiers run
    pub async fn recommend_with(
        &self,
        context: &PostContext,
        model_available: bool,
    ) -> Resolved<Vec<RecommendationGroup>> {
        let resolved = FallbackChain::new("recommendations")
            .tier("model-keywords", || {
                async move {
                    if !model_available {
                        return Err(AnalysisError::ModelUnavailable(
                            "skipped by availability check".to_string(),
                        ));
                    }
                    self.model_groups(context).await
                }
                .boxed()
            })
            .tier("candidate-categories", || self.candidate_group(context).boxed())
            .resolve("static", || vec![static_fallback_group()])
            .await;

        info!(
            groups = resolved.value.len(),
            tier = resolved.tier,
            "Recommendations assembled"
        );
        resolved
    }

    async fn model_groups(&self, context: &PostContext) -> PipelineResult<Vec<RecommendationGroup>> {
        let reply = self
            .model
            .generate(ModelRequest::text(build_keyword_prompt(context)))
            .await?;
        let keyword_groups = parse_keyword_groups(&reply)?;

        // One at a time behind the catalog limiter
        let mut groups = Vec::new();
        for group in keyword_groups {
            let query = group.keywords.join(" ");
            if let Some(found) = self.search_group(&group.category, &query, &group.reason).await {
                groups.push(found);
            }
        }

        if groups.is_empty() {
            return Err(AnalysisError::CatalogSearchFailed(
                "No keyword group returned products".to_string(),
            ));
        }
        Ok(groups)
    }

    async fn candidate_group(&self, context: &PostContext) -> PipelineResult<Vec<RecommendationGroup>> {
        let terms = context.terms();
        let candidates = TOPICAL_CANDIDATES
            .iter()
            .copied()
            .filter(|c| overlaps(&terms, c.keywords))
            .chain(std::iter::once(&GENERAL_GADGETS));

        for candidate in candidates {
            debug!(candidate = candidate.title, "Trying candidate category");
            if let Some(group) = self
                .search_group(candidate.title, candidate.search, candidate.reason)
                .await
            {
                return Ok(vec![group]);
            }
        }

        Err(AnalysisError::CatalogSearchFailed(
            "No candidate category returned products".to_string(),
        ))
    }

    /// One catalog search; `None` when it fails or finds nothing
    async fn search_group(&self, title: &str, query: &str, reason: &str) -> Option<RecommendationGroup> {
        let products = match self.catalog.search(query, SEARCH_RESULTS).await {
            Ok(products) => products,
            Err(e) => {
                warn!(query = %query, error = %e, "Catalog search failed");
                return None;
            }
        };

        if products.is_empty() {
            debug!(query = %query, "Catalog search returned nothing");
            return None;
        }

        let products = products
            .into_iter()
            .take(PRODUCTS_PER_GROUP)
            .map(|mut p| {
                if p.reason.is_none() && !reason.is_empty() {
                    p.reason = Some(reason.to_string());
                }
                p
            })
            .collect();

        Some(RecommendationGroup {
            title: title.to_string(),
            reason: reason.to_string(),
            products,
        })
    }

    /// Rewrite `comment` so it mentions `product`
    ///
    /// The result always carries the product link: when the model's rewrite
    /// omits it, or the call fails, the link is appended as markdown.
    pub async fn mention_product_in_comment(
        &self,
        comment: &str,
        product: &Product,
        context: &PostContext,
    ) -> String {
        let prompt = format!(
            "次の写真投稿コメントに、商品「{name}」({url}) の紹介を自然に織り込んでください。\n\
             場面: {scene} / 感情: {emotion}\n\
             元のコメントの雰囲気を保ち、宣伝臭くならないようにしてください。\n\
             書き換えたコメント本文のみを返してください。\n\n元のコメント:\n{comment}",
            name = product.name,
            url = product.affiliate_url,
            scene = context.scene,
            emotion = context.emotion,
            comment = comment,
        );

        match self.model.generate(ModelRequest::text(prompt)).await {
            Ok(reply) => {
                let rewritten = strip_code_fence(&reply);
                if rewritten.is_empty() {
                    append_product_link(comment, product)
                } else if rewritten.contains(&product.affiliate_url) {
                    rewritten.to_string()
                } else {
                    append_product_link(rewritten, product)
                }
            }
            Err(e) => {
                warn!(product = %product.id, error = %e, "Comment rewrite failed, appending link");
                append_product_link(comment, product)
            }
        }
    }
}

/// Drop a surrounding ``` fence the model may add around plain text
fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.split_once('\n').map(|(_, body)| body).unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
