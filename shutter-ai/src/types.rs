//! Core data model for the post-analysis pipeline
//!
//! Every type here is created per analysis request and never mutated after
//! it is returned. Persistence is the caller's responsibility. JSON field
//! names are camelCase to match the posting UI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Photo Score
// ============================================================================

/// Maximum value of each category subscore
pub const SUBSCORE_MAX: u8 = 25;

/// Maximum comment length (characters)
pub const COMMENT_MAX_CHARS: usize = 200;

/// Score tier derived from `total`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScoreLevel {
    S,
    A,
    B,
    C,
    D,
    E,
}

impl ScoreLevel {
    /// Map a total score to its tier (inclusive lower bounds)
    pub fn from_total(total: u8) -> Self {
        match total {
            90.. => Self::S,
            80..=89 => Self::A,
            70..=79 => Self::B,
            60..=69 => Self::C,
            50..=59 => Self::D,
            _ => Self::E,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::S => "S",
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::E => "E",
        }
    }

    /// Short human-readable description shown next to the badge
    pub fn description(self) -> &'static str {
        match self {
            Self::S => "傑作",
            Self::A => "優秀",
            Self::B => "良好",
            Self::C => "標準",
            Self::D => "改善要",
            Self::E => "要練習",
        }
    }
}

impl std::fmt::Display for ScoreLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Technical sub-criteria (each 0-5)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalBreakdown {
    pub quality: u8,
    pub exposure: u8,
    pub color: u8,
    pub sharpness: u8,
    pub noise: u8,
}

/// Composition sub-criteria (8 / 5 / 7 / 5)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionBreakdown {
    pub rule_of_thirds: u8,
    pub symmetry: u8,
    pub placement: u8,
    pub background: u8,
}

/// Creativity sub-criteria (10 / 8 / 7)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreativityBreakdown {
    pub unique_perspective: u8,
    pub artistic_expression: u8,
    pub storytelling: u8,
}

/// Engagement sub-criteria (10 / 8 / 7)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementBreakdown {
    pub emotional_impact: u8,
    pub visual_appeal: u8,
    pub relatability: u8,
}

/// Named sub-criteria per category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub technical: TechnicalBreakdown,
    pub composition: CompositionBreakdown,
    pub creativity: CreativityBreakdown,
    pub engagement: EngagementBreakdown,
}

/// Bounded, auditable photo quality score
///
/// Build values through [`PhotoScore::new`], which computes `total`, so the
/// `total == technical + composition + creativity + engagement` invariant
/// holds for everything the pipeline produces.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoScore {
    pub technical: u8,
    pub composition: u8,
    pub creativity: u8,
    pub engagement: u8,
    pub total: u8,
    pub breakdown: ScoreBreakdown,
    pub comment: String,
}

impl PhotoScore {
    /// Create a score; subscores are clamped to [0, 25] and `total` is derived
    pub fn new(
        technical: u8,
        composition: u8,
        creativity: u8,
        engagement: u8,
        breakdown: ScoreBreakdown,
        comment: impl Into<String>,
    ) -> Self {
        let technical = technical.min(SUBSCORE_MAX);
        let composition = composition.min(SUBSCORE_MAX);
        let creativity = creativity.min(SUBSCORE_MAX);
        let engagement = engagement.min(SUBSCORE_MAX);

        Self {
            technical,
            composition,
            creativity,
            engagement,
            total: technical + composition + creativity + engagement,
            breakdown,
            comment: truncate_chars(&comment.into(), COMMENT_MAX_CHARS),
        }
    }

    pub fn level(&self) -> ScoreLevel {
        ScoreLevel::from_total(self.total)
    }

    pub fn level_description(&self) -> &'static str {
        self.level().description()
    }

    /// True when `total` matches the subscores and every subscore is in range
    pub fn is_consistent(&self) -> bool {
        [self.technical, self.composition, self.creativity, self.engagement]
            .iter()
            .all(|s| *s <= SUBSCORE_MAX)
            && u16::from(self.total)
                == u16::from(self.technical)
                    + u16::from(self.composition)
                    + u16::from(self.creativity)
                    + u16::from(self.engagement)
    }
}

/// Serialized form carries the derived level alongside the stored fields
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PhotoScoreView<'a> {
    technical: u8,
    composition: u8,
    creativity: u8,
    engagement: u8,
    total: u8,
    breakdown: &'a ScoreBreakdown,
    comment: &'a str,
    level: ScoreLevel,
    level_description: &'static str,
}

impl Serialize for PhotoScore {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        PhotoScoreView {
            technical: self.technical,
            composition: self.composition,
            creativity: self.creativity,
            engagement: self.engagement,
            total: self.total,
            breakdown: &self.breakdown,
            comment: &self.comment,
            level: self.level(),
            level_description: self.level_description(),
        }
        .serialize(serializer)
    }
}

/// Truncate to at most `max` characters (not bytes)
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

// ============================================================================
// Post Context
// ============================================================================

/// Placeholder for unknown scene/season/time of day
pub const UNKNOWN: &str = "unknown";

/// Structured description of a post (image + captions)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostContext {
    pub objects: Vec<String>,
    pub scene: String,
    pub emotion: String,
    pub needs: Vec<String>,
    pub season: String,
    pub time_of_day: String,
}

impl PostContext {
    /// Neutral context used when every extraction path fails
    pub fn neutral() -> Self {
        Self {
            objects: Vec::new(),
            scene: UNKNOWN.to_string(),
            emotion: "neutral".to_string(),
            needs: Vec::new(),
            season: UNKNOWN.to_string(),
            time_of_day: UNKNOWN.to_string(),
        }
    }

    /// Lowercased terms describing the post (objects + scene), for keyword overlap
    pub fn terms(&self) -> Vec<String> {
        self.objects
            .iter()
            .chain(std::iter::once(&self.scene))
            .filter(|t| !t.is_empty() && t.as_str() != UNKNOWN)
            .map(|t| t.to_lowercase())
            .collect()
    }
}

impl Default for PostContext {
    fn default() -> Self {
        Self::neutral()
    }
}

// ============================================================================
// Products & Recommendations
// ============================================================================

/// Catalog product (identity is `id`; never mutated by the pipeline)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    /// Display string, e.g. "¥2,980"
    pub price: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub affiliate_url: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Titled group of products
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationGroup {
    pub title: String,
    pub reason: String,
    pub products: Vec<Product>,
}

// ============================================================================
// Aggregate Result
// ============================================================================

/// One orchestrated pipeline unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnalysisStage {
    PhotoScore,
    Context,
    Recommendations,
}

impl AnalysisStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PhotoScore => "photoScore",
            Self::Context => "context",
            Self::Recommendations => "recommendations",
        }
    }
}

/// Per-stage completion flags for incremental rendering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageProgress {
    pub photo_score: bool,
    pub context: bool,
    pub recommendations: bool,
}

impl StageProgress {
    pub fn mark(&mut self, stage: AnalysisStage) {
        match stage {
            AnalysisStage::PhotoScore => self.photo_score = true,
            AnalysisStage::Context => self.context = true,
            AnalysisStage::Recommendations => self.recommendations = true,
        }
    }

    pub fn completed_count(&self) -> usize {
        [self.photo_score, self.context, self.recommendations]
            .iter()
            .filter(|done| **done)
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.completed_count() == 3
    }
}

/// Lightweight telemetry attached to every result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetadata {
    pub analysis_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub stages_completed: usize,
    pub stages_fallen_back: usize,
    pub fallback_stages: Vec<AnalysisStage>,
}

/// Aggregate result of one analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub photo_score: PhotoScore,
    pub context: PostContext,
    pub recommendation_groups: Vec<RecommendationGroup>,
    pub all_products: Vec<Product>,
    pub metadata: AnalysisMetadata,
}

/// Flatten groups into a product list, first occurrence of each `id` wins
pub fn flatten_products(groups: &[RecommendationGroup]) -> Vec<Product> {
    let mut seen = std::collections::HashSet::new();
    groups
        .iter()
        .flat_map(|g| g.products.iter())
        .filter(|p| seen.insert(p.id.clone()))
        .cloned()
        .collect()
}
