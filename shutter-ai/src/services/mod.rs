//! External collaborators: image hosts, the generative model, the product catalog

pub mod binary_encoder;
pub mod catalog_client;
pub mod image_fetcher;
pub mod model_client;
pub mod rate_limiter;

pub use binary_encoder::BinaryEncoder;
pub use catalog_client::{CatalogClient, StaticCatalog};
pub use image_fetcher::{EncodedImage, FetchedImage, ImageFetcher, ImageSource, SharedImage};
pub use model_client::{GeminiClient, InlineImage, ModelClient, ModelAvailability, ModelRequest};
pub use rate_limiter::{limiter_from_config, FixedDelayLimiter, RateLimiter, TokenBucketLimiter};
