//! Local HTTP image host for fetch tests

use axum::extract::Query;
use axum::http::{header, StatusCode};
use axum::routing::get;
use axum::Router;
use shutter_ai::services::ImageFetcher;
use std::collections::HashMap;
use std::net::SocketAddr;

/// JPEG-looking payload of `len` bytes
pub fn jpeg_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];
    bytes.extend((bytes.len()..len).map(|i| (i % 251) as u8));
    bytes.truncate(len);
    bytes
}

/// PNG signature plus padding
pub fn png_bytes() -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(&[0u8; 56]);
    bytes
}

/// Serve test images on 127.0.0.1 with an ephemeral port
///
/// - `/photo.jpg`  2 MB JPEG
/// - `/broken.jpg` 500
/// - `/huge.jpg`   5 MiB (over the default ceiling)
/// - `/untyped`    PNG bytes labelled application/octet-stream
/// - `/proxy?url=` PNG bytes when `url` is present, 400 otherwise
pub async fn spawn_image_server() -> SocketAddr {
    let app = Router::new()
        .route(
            "/photo.jpg",
            get(|| async { ([(header::CONTENT_TYPE, "image/jpeg")], jpeg_bytes(2 * 1024 * 1024)) }),
        )
        .route(
            "/broken.jpg",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        )
        .route(
            "/huge.jpg",
            get(|| async { ([(header::CONTENT_TYPE, "image/jpeg")], jpeg_bytes(5 * 1024 * 1024)) }),
        )
        .route(
            "/untyped",
            get(|| async { ([(header::CONTENT_TYPE, "application/octet-stream")], png_bytes()) }),
        )
        .route(
            "/proxy",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                match params.get("url") {
                    Some(_) => Ok(([(header::CONTENT_TYPE, "image/png")], png_bytes())),
                    None => Err(StatusCode::BAD_REQUEST),
                }
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Fetcher that ignores environment proxies
pub fn test_fetcher(cors_proxy: Option<String>, max_bytes: usize) -> ImageFetcher {
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    ImageFetcher::with_client(client, cors_proxy, max_bytes)
}
