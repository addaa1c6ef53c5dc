//! Photo scoring
//!
//! Sends a fixed four-category rubric plus the image to the model and turns
//! the reply into a bounded [`PhotoScore`]. Anything that goes wrong along
//! the way (fetch, encode, model call, parse) yields [`fallback_score`].

use crate::analysis::fallback::{FallbackChain, Resolved};
use crate::analysis::response_parser::{bounded_u8, field, parse_json_object, string_field};
use crate::error::{AnalysisError, PipelineResult};
use crate::services::image_fetcher::{ImageSource, SharedImage};
use crate::services::model_client::{ModelClient, ModelRequest};
use crate::types::{
    CompositionBreakdown, CreativityBreakdown, EngagementBreakdown, PhotoScore, ScoreBreakdown,
    TechnicalBreakdown, SUBSCORE_MAX,
};
use futures::FutureExt;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

/// Subscore used for every category when scoring fails
pub const FALLBACK_SUBSCORE: u8 = 15;

pub const FALLBACK_COMMENT: &str =
    "AIによる採点に失敗したため、標準スコアを表示しています。";

type Rubric = [(&'static str, u8)];

const TECHNICAL: &Rubric = &[
    ("quality", 5),
    ("exposure", 5),
    ("color", 5),
    ("sharpness", 5),
    ("noise", 5),
];
const COMPOSITION: &Rubric = &[
    ("ruleOfThirds", 8),
    ("symmetry", 5),
    ("placement", 7),
    ("background", 5),
];
const CREATIVITY: &Rubric = &[
    ("uniquePerspective", 10),
    ("artisticExpression", 8),
    ("storytelling", 7),
];
const ENGAGEMENT: &Rubric = &[
    ("emotionalImpact", 10),
    ("visualAppeal", 8),
    ("relatability", 7),
];

/// Rubric prompt sent with the image
pub fn build_rubric_prompt(title: Option<&str>, description: Option<&str>) -> String {
    let title = title.map(str::trim).filter(|t| !t.is_empty()).unwrap_or("(なし)");
    let description = description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or("(なし)");

    format!(
        r#"あなたはプロの写真評論家です。添付の写真を以下の基準で厳密に採点してください。

投稿タイトル: {title}
投稿コメント: {description}

## 採点基準 (合計100点)
1. 技術 (technical, 25点)
   - quality 画質 (0-5) / exposure 露出 (0-5) / color 色彩 (0-5) / sharpness シャープネス (0-5) / noise ノイズ (0-5)
2. 構図 (composition, 25点)
   - ruleOfThirds 三分割法 (0-8) / symmetry 対称性 (0-5) / placement 被写体配置 (0-7) / background 背景 (0-5)
3. 創造性 (creativity, 25点)
   - uniquePerspective 独自の視点 (0-10) / artisticExpression 芸術的表現 (0-8) / storytelling ストーリー性 (0-7)
4. エンゲージメント (engagement, 25点)
   - emotionalImpact 感情への訴求 (0-10) / visualAppeal 視覚的魅力 (0-8) / relatability 共感性 (0-7)

各カテゴリの点数はそのサブ項目の合計、total は4カテゴリの合計です。
comment は200文字以内の日本語で、良い点と改善点を具体的に述べてください。

次の形式のJSONのみを返してください:
{{
  "technical": 20,
  "composition": 18,
  "creativity": 17,
  "engagement": 19,
  "total": 74,
  "breakdown": {{
    "technical": {{"quality": 4, "exposure": 4, "color": 4, "sharpness": 4, "noise": 4}},
    "composition": {{"ruleOfThirds": 6, "symmetry": 4, "placement": 5, "background": 3}},
    "creativity": {{"uniquePerspective": 7, "artisticExpression": 6, "storytelling": 4}},
    "engagement": {{"emotionalImpact": 8, "visualAppeal": 6, "relatability": 5}}
  }},
  "comment": "..."
}}"#
    )
}

/// Split `value` over `weights` proportionally (largest remainder, ties by position)
fn distribute(value: u8, weights: &[u8]) -> Vec<u8> {
    let total: u32 = weights.iter().map(|w| u32::from(*w)).sum();
    if total == 0 {
        return vec![0; weights.len()];
    }
    let value = u32::from(value).min(total);

    let mut shares: Vec<u32> = Vec::with_capacity(weights.len());
    let mut remainders: Vec<(usize, u32)> = Vec::with_capacity(weights.len());
    for (i, w) in weights.iter().enumerate() {
        let scaled = value * u32::from(*w);
        shares.push(scaled / total);
        remainders.push((i, scaled % total));
    }

    let leftover = value - shares.iter().sum::<u32>();
    remainders.sort_by(|a, b| b.1.cmp(&a.1));
    for (i, _) in remainders.into_iter().take(leftover as usize) {
        shares[i] += 1;
    }

    shares.into_iter().map(|s| s as u8).collect()
}

/// Read one category: its value and the sub-criteria in rubric order
///
/// The category value is always the sum of its sub-criteria. A declared
/// category value only decides how missing sub-criteria are filled in.
fn read_category(root: &Map<String, Value>, name: &str, rubric: &Rubric) -> PipelineResult<(u8, Vec<u8>)> {
    let category = field(root, name);
    let nested = category.and_then(Value::as_object);

    let declared = match nested {
        Some(obj) => bounded_u8(field(obj, "score").or_else(|| field(obj, "total")), SUBSCORE_MAX),
        None => bounded_u8(category, SUBSCORE_MAX),
    };

    let subs_source = field(root, "breakdown")
        .and_then(Value::as_object)
        .and_then(|b| field(b, name))
        .and_then(Value::as_object)
        .or(nested);

    let subs: Vec<Option<u8>> = rubric
        .iter()
        .map(|(key, max)| subs_source.and_then(|obj| bounded_u8(field(obj, key), *max)))
        .collect();
    let present_sum: u8 = subs.iter().flatten().sum();

    let target = match declared {
        Some(value) => value,
        None if subs.iter().any(Option::is_some) => present_sum,
        None => {
            return Err(AnalysisError::ResponseParseFailed(format!(
                "Missing '{}' score",
                name
            )))
        }
    };

    let missing_weights: Vec<u8> = rubric
        .iter()
        .zip(&subs)
        .filter(|(_, sub)| sub.is_none())
        .map(|((_, max), _)| *max)
        .collect();
    let mut filled = distribute(target.saturating_sub(present_sum), &missing_weights).into_iter();

    let breakdown: Vec<u8> = subs
        .into_iter()
        .map(|sub| sub.or_else(|| filled.next()).unwrap_or(0))
        .collect();
    let value = breakdown.iter().sum();

    Ok((value, breakdown))
}

fn technical_breakdown(v: &[u8]) -> TechnicalBreakdown {
    TechnicalBreakdown {
        quality: v[0],
        exposure: v[1],
        color: v[2],
        sharpness: v[3],
        noise: v[4],
    }
}

fn composition_breakdown(v: &[u8]) -> CompositionBreakdown {
    CompositionBreakdown {
        rule_of_thirds: v[0],
        symmetry: v[1],
        placement: v[2],
        background: v[3],
    }
}

fn creativity_breakdown(v: &[u8]) -> CreativityBreakdown {
    CreativityBreakdown {
        unique_perspective: v[0],
        artistic_expression: v[1],
        storytelling: v[2],
    }
}

fn engagement_breakdown(v: &[u8]) -> EngagementBreakdown {
    EngagementBreakdown {
        emotional_impact: v[0],
        visual_appeal: v[1],
        relatability: v[2],
    }
}

/// Validate a model reply into a score
///
/// The reported `total` is ignored; [`PhotoScore::new`] recomputes it.
pub fn parse_score(reply: &str) -> PipelineResult<PhotoScore> {
    let root = parse_json_object(reply)?;

    let (technical, tech) = read_category(&root, "technical", TECHNICAL)?;
    let (composition, comp) = read_category(&root, "composition", COMPOSITION)?;
    let (creativity, creat) = read_category(&root, "creativity", CREATIVITY)?;
    let (engagement, engage) = read_category(&root, "engagement", ENGAGEMENT)?;

    let breakdown = ScoreBreakdown {
        technical: technical_breakdown(&tech),
        composition: composition_breakdown(&comp),
        creativity: creativity_breakdown(&creat),
        engagement: engagement_breakdown(&engage),
    };
    let comment = string_field(&root, "comment").unwrap_or_default();

    Ok(PhotoScore::new(
        technical,
        composition,
        creativity,
        engagement,
        breakdown,
        comment,
    ))
}

fn weights(rubric: &Rubric) -> Vec<u8> {
    rubric.iter().map(|(_, max)| *max).collect()
}

/// Fixed score used whenever scoring fails: 15 per category, total 60
pub fn fallback_score() -> PhotoScore {
    let breakdown = ScoreBreakdown {
        technical: technical_breakdown(&distribute(FALLBACK_SUBSCORE, &weights(TECHNICAL))),
        composition: composition_breakdown(&distribute(FALLBACK_SUBSCORE, &weights(COMPOSITION))),
        creativity: creativity_breakdown(&distribute(FALLBACK_SUBSCORE, &weights(CREATIVITY))),
        engagement: engagement_breakdown(&distribute(FALLBACK_SUBSCORE, &weights(ENGAGEMENT))),
    };

    PhotoScore::new(
        FALLBACK_SUBSCORE,
        FALLBACK_SUBSCORE,
        FALLBACK_SUBSCORE,
        FALLBACK_SUBSCORE,
        breakdown,
        FALLBACK_COMMENT,
    )
}

pub struct ScoringEngine {
    model: Arc<dyn ModelClient>,
    images: Arc<dyn ImageSource>,
}

impl ScoringEngine {
    pub fn new(model: Arc<dyn ModelClient>, images: Arc<dyn ImageSource>) -> Self {
        Self { model, images }
    }

    /// Score a single image; never fails
    pub async fn score(
        &self,
        image_url: &str,
        title: Option<&str>,
        description: Option<&str>,
    ) -> PhotoScore {
        let image = SharedImage::new(self.images.clone(), image_url);
        self.score_with(&image, title, description, true).await.value
    }

    /// Score against an image shared with other stages
    pub async fn score_with(
        &self,
        image: &SharedImage,
        title: Option<&str>,
        description: Option<&str>,
        model_available: bool,
    ) -> Resolved<PhotoScore> {
        let resolved = FallbackChain::new("photoScore")
            .tier("multimodal", || {
                async move {
                    if !model_available {
                        return Err(AnalysisError::ModelUnavailable(
                            "skipped by availability check".to_string(),
                        ));
                    }
                    let encoded = image.get().await?;
                    let prompt = build_rubric_prompt(title, description);
                    let reply = self
                        .model
                        .generate(ModelRequest::with_image(prompt, &encoded))
                        .await?;
                    parse_score(&reply)
                }
                .boxed()
            })
            .resolve("fixed", fallback_score)
            .await;

        info!(
            total = resolved.value.total,
            level = %resolved.value.level(),
            tier = resolved.tier,
            "Photo scored"
        );
        resolved
    }
}
