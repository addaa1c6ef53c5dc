//! Image acquisition
//!
//! Fetches image bytes for an analysis from an HTTP(S) URL or a `data:` URI.
//! A transport-level failure on the direct request is retried exactly once
//! through the configured CORS proxy; HTTP error statuses are not retried.

use crate::error::{AnalysisError, PipelineResult};
use crate::services::binary_encoder::BinaryEncoder;
use async_trait::async_trait;
use reqwest::{header, Client, Response, Url};
use shutter_common::config::ImageConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// MIME type assumed when neither the server nor the bytes tell us
pub const DEFAULT_MIME: &str = "image/jpeg";

/// Raw image as acquired
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Image ready to be sent to the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub mime_type: String,
    pub data_base64: String,
    pub byte_len: usize,
}

impl EncodedImage {
    pub fn from_fetched(image: &FetchedImage) -> Self {
        Self {
            mime_type: image.mime_type.clone(),
            data_base64: BinaryEncoder::encode(&image.bytes),
            byte_len: image.bytes.len(),
        }
    }
}

/// Source of image bytes
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, image_url: &str) -> PipelineResult<FetchedImage>;
}

/// HTTP + data URI image source
pub struct ImageFetcher {
    client: Client,
    cors_proxy: Option<String>,
    max_bytes: usize,
}

impl ImageFetcher {
    /// Create fetcher from the `[image]` configuration table
    pub fn new(config: &ImageConfig) -> PipelineResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(concat!("shutter-ai/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AnalysisError::Unexpected(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(client, config.cors_proxy.clone(), config.max_bytes))
    }

    pub fn with_client(client: Client, cors_proxy: Option<String>, max_bytes: usize) -> Self {
        Self {
            client,
            cors_proxy: cors_proxy.filter(|p| !p.trim().is_empty()),
            max_bytes,
        }
    }

    /// Proxy URL carrying the target as its `url` query parameter
    fn proxied_url(&self, target: &str) -> Option<Url> {
        let proxy = self.cors_proxy.as_deref()?;
        match Url::parse_with_params(proxy, &[("url", target)]) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(proxy = %proxy, error = %e, "Ignoring unparseable CORS proxy");
                None
            }
        }
    }

    async fn get(&self, url: &str) -> Result<Response, reqwest::Error> {
        self.client
            .get(url)
            .header(header::ACCEPT, "image/*")
            .send()
            .await
    }

    async fn fetch_remote(&self, image_url: &str) -> PipelineResult<FetchedImage> {
        debug!(url = %image_url, "Fetching image");

        let response = match self.get(image_url).await {
            Ok(response) => response,
            Err(direct_err) => {
                let Some(proxied) = self.proxied_url(image_url) else {
                    return Err(AnalysisError::FetchFailed(format!(
                        "Request failed: {}",
                        direct_err
                    )));
                };
                warn!(
                    url = %image_url,
                    error = %direct_err,
                    "Direct image fetch failed, retrying through proxy"
                );
                self.get(proxied.as_str()).await.map_err(|proxy_err| {
                    AnalysisError::FetchFailed(format!(
                        "Direct request failed ({}); proxy request failed ({})",
                        direct_err, proxy_err
                    ))
                })?
            }
        };

        self.read_body(response).await
    }

    async fn read_body(&self, mut response: Response) -> PipelineResult<FetchedImage> {
        let status = response.status();
        if !status.is_success() {
            return Err(AnalysisError::FetchFailed(format!(
                "Image host returned status {}",
                status
            )));
        }

        if let Some(declared) = response.content_length() {
            let declared = usize::try_from(declared).unwrap_or(usize::MAX);
            if declared > self.max_bytes {
                return Err(AnalysisError::ImageTooLarge {
                    actual: declared,
                    limit: self.max_bytes,
                });
            }
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| AnalysisError::FetchFailed(format!("Body read failed: {}", e)))?
        {
            if bytes.len() + chunk.len() > self.max_bytes {
                return Err(AnalysisError::ImageTooLarge {
                    actual: bytes.len() + chunk.len(),
                    limit: self.max_bytes,
                });
            }
            bytes.extend_from_slice(&chunk);
        }

        if bytes.is_empty() {
            return Err(AnalysisError::FetchFailed("Image body was empty".to_string()));
        }

        let mime_type = resolve_mime(content_type.as_deref(), &bytes);
        debug!(bytes = bytes.len(), mime = %mime_type, "Image fetched");

        Ok(FetchedImage { bytes, mime_type })
    }
}

#[async_trait]
impl ImageSource for ImageFetcher {
    async fn fetch(&self, image_url: &str) -> PipelineResult<FetchedImage> {
        let image_url = image_url.trim();
        if is_data_uri(image_url) {
            return decode_data_uri(image_url, self.max_bytes);
        }
        self.fetch_remote(image_url).await
    }
}

const DATA_SCHEME: &str = "data:";

/// Case-insensitive scheme prefix check
fn has_scheme(url: &str, scheme: &str) -> bool {
    url.get(..scheme.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
}

pub fn is_data_uri(url: &str) -> bool {
    has_scheme(url, DATA_SCHEME)
}

/// `http://`, `https://` or `data:` (any letter case)
pub fn is_supported_image_url(url: &str) -> bool {
    is_data_uri(url) || has_scheme(url, "http://") || has_scheme(url, "https://")
}

/// Decode a `data:[<mime>][;base64],<payload>` URI without touching the network
pub fn decode_data_uri(uri: &str, max_bytes: usize) -> PipelineResult<FetchedImage> {
    if !is_data_uri(uri) {
        return Err(AnalysisError::FetchFailed("Not a data URI".to_string()));
    }
    let rest = &uri[DATA_SCHEME.len()..];
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| AnalysisError::FetchFailed("Data URI has no payload".to_string()))?;

    let mut params = header.split(';');
    let declared_mime = params.next().unwrap_or_default().trim().to_ascii_lowercase();
    if !params.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
        return Err(AnalysisError::FetchFailed(
            "Only base64 data URIs are supported".to_string(),
        ));
    }

    let estimated = BinaryEncoder::decoded_len(payload.trim());
    if estimated > max_bytes {
        return Err(AnalysisError::ImageTooLarge {
            actual: estimated,
            limit: max_bytes,
        });
    }

    let bytes = BinaryEncoder::decode(payload)?;
    if bytes.len() > max_bytes {
        return Err(AnalysisError::ImageTooLarge {
            actual: bytes.len(),
            limit: max_bytes,
        });
    }
    if bytes.is_empty() {
        return Err(AnalysisError::FetchFailed("Data URI payload was empty".to_string()));
    }

    let mime_type = if declared_mime.starts_with("image/") {
        declared_mime
    } else {
        resolve_mime(None, &bytes)
    };

    Ok(FetchedImage { bytes, mime_type })
}

/// Content-Type header (if image/*) → magic bytes → image/jpeg
pub fn resolve_mime(content_type: Option<&str>, bytes: &[u8]) -> String {
    if let Some(ct) = content_type {
        let essence = ct.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        if essence.starts_with("image/") {
            return essence;
        }
    }

    infer::get(bytes)
        .map(|kind| kind.mime_type())
        .filter(|mime| mime.starts_with("image/"))
        .unwrap_or(DEFAULT_MIME)
        .to_string()
}

/// Image acquired and encoded at most once per analysis
///
/// Scoring and context extraction both need the image. The first caller
/// performs the fetch; later callers get the same result, including a
/// failure, without another network round trip.
pub struct SharedImage {
    source: Arc<dyn ImageSource>,
    image_url: String,
    cell: OnceCell<PipelineResult<Arc<EncodedImage>>>,
}

impl SharedImage {
    pub fn new(source: Arc<dyn ImageSource>, image_url: impl Into<String>) -> Self {
        Self {
            source,
            image_url: image_url.into(),
            cell: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> PipelineResult<Arc<EncodedImage>> {
        self.cell
            .get_or_init(|| async {
                let fetched = self.source.fetch(&self.image_url).await?;
                Ok(Arc::new(EncodedImage::from_fetched(&fetched)))
            })
            .await
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn test_resolve_mime_prefers_image_header() {
        assert_eq!(resolve_mime(Some("image/webp; q=1"), &PNG_MAGIC), "image/webp");
    }

    #[test]
    fn test_resolve_mime_sniffs_when_header_unhelpful() {
        assert_eq!(resolve_mime(Some("application/octet-stream"), &PNG_MAGIC), "image/png");
        assert_eq!(resolve_mime(None, b"plain bytes"), DEFAULT_MIME);
    }

    #[test]
    fn test_decode_data_uri() {
        let uri = format!("data:image/png;base64,{}", BinaryEncoder::encode(&PNG_MAGIC));
        let image = decode_data_uri(&uri, 1024).unwrap();
        assert_eq!(image.bytes, PNG_MAGIC);
        assert_eq!(image.mime_type, "image/png");
    }

    #[test]
    fn test_decode_data_uri_without_mime_sniffs() {
        let uri = format!("data:;base64,{}", BinaryEncoder::encode(&PNG_MAGIC));
        assert_eq!(decode_data_uri(&uri, 1024).unwrap().mime_type, "image/png");
    }

    #[test]
    fn test_decode_data_uri_rejects_oversize() {
        let uri = format!("data:image/jpeg;base64,{}", BinaryEncoder::encode(&[0u8; 64]));
        let err = decode_data_uri(&uri, 32).unwrap_err();
        assert_eq!(err, AnalysisError::ImageTooLarge { actual: 64, limit: 32 });
    }

    #[test]
    fn test_decode_data_uri_wrapped_payload_at_limit() {
        let bytes: Vec<u8> = (0..3000).map(|i| (i % 251) as u8).collect();
        let wrapped = BinaryEncoder::encode(&bytes)
            .as_bytes()
            .chunks(76)
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect::<Vec<_>>()
            .join("\r\n");
        let uri = format!("data:image/jpeg;base64,{}", wrapped);

        let image = decode_data_uri(&uri, 3000).unwrap();
        assert_eq!(image.bytes, bytes);

        let err = decode_data_uri(&uri, 2999).unwrap_err();
        assert_eq!(err, AnalysisError::ImageTooLarge { actual: 3000, limit: 2999 });
    }

    #[test]
    fn test_scheme_checks_ignore_case() {
        assert!(is_data_uri("DATA:image/png;base64,AAAA"));
        assert!(is_supported_image_url("HTTPS://img.example.com/a.jpg"));
        assert!(is_supported_image_url("Http://img.example.com/a.jpg"));
        assert!(!is_supported_image_url("ftp://img.example.com/a.jpg"));
        assert!(!is_supported_image_url("da"));

        let uri = format!("Data:image/png;base64,{}", BinaryEncoder::encode(&PNG_MAGIC));
        assert_eq!(decode_data_uri(&uri, 1024).unwrap().bytes, PNG_MAGIC);
    }

    #[test]
    fn test_decode_data_uri_requires_base64() {
        let err = decode_data_uri("data:image/svg+xml,<svg/>", 1024).unwrap_err();
        assert!(matches!(err, AnalysisError::FetchFailed(_)));
    }

    #[test]
    fn test_proxied_url_carries_target() {
        let fetcher = ImageFetcher::with_client(
            Client::new(),
            Some("https://corsproxy.io/".to_string()),
            1024,
        );
        let url = fetcher.proxied_url("https://img.example.com/a b.jpg").unwrap();
        let (key, value) = url.query_pairs().next().unwrap();
        assert_eq!(key, "url");
        assert_eq!(value, "https://img.example.com/a b.jpg");
    }

    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ImageSource for CountingSource {
        async fn fetch(&self, _image_url: &str) -> PipelineResult<FetchedImage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(AnalysisError::FetchFailed("offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_shared_image_fetches_once_even_on_failure() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
        });
        let shared = SharedImage::new(source.clone(), "https://example.com/x.jpg");

        let (a, b) = tokio::join!(shared.get(), shared.get());
        assert!(a.is_err());
        assert_eq!(a, b);
        assert!(shared.get().await.is_err());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }
}
