//! Product catalog lookup
//!
//! The pipeline talks to [`CatalogClient`] only. [`StaticCatalog`] is the
//! in-repo implementation backed by a fixed product table; a real affiliate
//! API client would implement the same trait. Every implementation is
//! expected to go through a [`RateLimiter`] before each search.

use crate::error::PipelineResult;
use crate::services::rate_limiter::RateLimiter;
use crate::types::Product;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Search by space-separated keywords, returning at most `max_results` products
    async fn search(&self, keywords: &str, max_results: usize) -> PipelineResult<Vec<Product>>;
}

/// Category with the keywords that select it directly
struct CategoryKeywords {
    category: &'static str,
    keywords: &'static [&'static str],
}

const CATEGORY_KEYWORDS: &[CategoryKeywords] = &[
    CategoryKeywords {
        category: "camera",
        keywords: &["camera", "カメラ", "写真", "photo", "レンズ", "lens", "撮影"],
    },
    CategoryKeywords {
        category: "pet",
        keywords: &["pet", "ペット", "犬", "dog", "猫", "cat", "いぬ", "ねこ"],
    },
    CategoryKeywords {
        category: "outdoor",
        keywords: &["outdoor", "アウトドア", "キャンプ", "camping", "登山", "hiking", "海", "beach", "山"],
    },
    CategoryKeywords {
        category: "kitchen",
        keywords: &["kitchen", "キッチン", "料理", "cooking", "食べ物", "food", "カフェ", "cafe"],
    },
    CategoryKeywords {
        category: "gadget",
        keywords: &["gadget", "ガジェット", "電子機器", "electronics", "スマホ", "smartphone"],
    },
];

struct CatalogEntry {
    id: &'static str,
    name: &'static str,
    price: &'static str,
    category: &'static str,
    tags: &'static [&'static str],
    popular: bool,
}

const PRODUCTS: &[CatalogEntry] = &[
    CatalogEntry {
        id: "cam-001",
        name: "カメラストラップ レザー",
        price: "¥2,480",
        category: "camera",
        tags: &["カメラ", "ストラップ", "strap", "accessory"],
        popular: false,
    },
    CatalogEntry {
        id: "cam-002",
        name: "コンパクト三脚 トラベル",
        price: "¥4,980",
        category: "camera",
        tags: &["三脚", "tripod", "夜景", "夕焼け", "風景", "landscape"],
        popular: true,
    },
    CatalogEntry {
        id: "cam-003",
        name: "レンズクリーニングキット",
        price: "¥1,280",
        category: "camera",
        tags: &["レンズ", "クリーニング", "cleaning"],
        popular: false,
    },
    CatalogEntry {
        id: "pet-001",
        name: "ペット用おやつ 国産チキン",
        price: "¥980",
        category: "pet",
        tags: &["犬", "猫", "おやつ", "treat"],
        popular: false,
    },
    CatalogEntry {
        id: "pet-002",
        name: "ペットキャリー 折りたたみ",
        price: "¥5,480",
        category: "pet",
        tags: &["犬", "猫", "お出かけ", "carrier"],
        popular: false,
    },
    CatalogEntry {
        id: "out-001",
        name: "アウトドアチェア 軽量",
        price: "¥3,980",
        category: "outdoor",
        tags: &["キャンプ", "海", "ビーチ", "chair"],
        popular: false,
    },
    CatalogEntry {
        id: "out-002",
        name: "防水ドライバッグ 20L",
        price: "¥2,180",
        category: "outdoor",
        tags: &["海", "川", "防水", "waterproof", "beach"],
        popular: false,
    },
    CatalogEntry {
        id: "out-003",
        name: "LEDランタン 充電式",
        price: "¥2,980",
        category: "outdoor",
        tags: &["キャンプ", "夜", "lantern", "night"],
        popular: false,
    },
    CatalogEntry {
        id: "kit-001",
        name: "ハンドドリップ コーヒーセット",
        price: "¥3,280",
        category: "kitchen",
        tags: &["コーヒー", "カフェ", "coffee", "朝"],
        popular: false,
    },
    CatalogEntry {
        id: "kit-002",
        name: "木製カッティングボード",
        price: "¥1,980",
        category: "kitchen",
        tags: &["料理", "食卓", "wood", "plating"],
        popular: false,
    },
    CatalogEntry {
        id: "gad-001",
        name: "モバイルバッテリー 10000mAh",
        price: "¥2,990",
        category: "gadget",
        tags: &["スマホ", "充電", "travel", "旅行"],
        popular: true,
    },
    CatalogEntry {
        id: "gad-002",
        name: "スマホ用クリップレンズ",
        price: "¥1,780",
        category: "gadget",
        tags: &["スマホ", "レンズ", "写真", "macro"],
        popular: true,
    },
];

const AFFILIATE_BASE: &str = "https://www.amazon.co.jp/dp";
const AFFILIATE_TAG: &str = "shutter-22";

impl CatalogEntry {
    fn to_product(&self) -> Product {
        Product {
            id: self.id.to_string(),
            name: self.name.to_string(),
            price: self.price.to_string(),
            image_url: Some(format!("https://images.shutter.example/products/{}.jpg", self.id)),
            affiliate_url: format!("{}/{}?tag={}", AFFILIATE_BASE, self.id, AFFILIATE_TAG),
            category: self.category.to_string(),
            tags: self.tags.iter().map(|t| t.to_string()).collect(),
            reason: None,
        }
    }

    fn matches_substring(&self, token: &str) -> bool {
        self.name.to_lowercase().contains(token)
            || self.category.contains(token)
            || self
                .tags
                .iter()
                .any(|tag| tag.to_lowercase().contains(token) || token.contains(&tag.to_lowercase()))
    }
}

/// Split a keyword string on whitespace and common list separators
fn tokenize(keywords: &str) -> Vec<String> {
    keywords
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | '、' | '，' | '・'))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Static-table catalog
pub struct StaticCatalog {
    limiter: Arc<dyn RateLimiter>,
}

impl StaticCatalog {
    pub fn new(limiter: Arc<dyn RateLimiter>) -> Self {
        Self { limiter }
    }

    /// Matching without the rate limiter: category keyword → substring → popular defaults
    pub fn lookup(keywords: &str, max_results: usize) -> Vec<Product> {
        let tokens = tokenize(keywords);

        let categories: Vec<&str> = CATEGORY_KEYWORDS
            .iter()
            .filter(|c| c.keywords.iter().any(|k| tokens.iter().any(|t| t == k)))
            .map(|c| c.category)
            .collect();

        let mut matched: Vec<&CatalogEntry> = PRODUCTS
            .iter()
            .filter(|p| categories.contains(&p.category))
            .collect();

        if matched.is_empty() {
            matched = PRODUCTS
                .iter()
                .filter(|p| tokens.iter().any(|t| p.matches_substring(t)))
                .collect();
        }

        if matched.is_empty() {
            matched = PRODUCTS.iter().filter(|p| p.popular).collect();
        }

        matched
            .into_iter()
            .take(max_results)
            .map(CatalogEntry::to_product)
            .collect()
    }
}

#[async_trait]
impl CatalogClient for StaticCatalog {
    async fn search(&self, keywords: &str, max_results: usize) -> PipelineResult<Vec<Product>> {
        self.limiter.acquire().await;
        let products = Self::lookup(keywords, max_results);
        debug!(keywords = %keywords, found = products.len(), "Catalog search");
        Ok(products)
    }
}
