//! Chunked base64 encoding for image payloads
//!
//! Large buffers are encoded in fixed windows and concatenated. The window
//! is a multiple of three bytes so every window except the last encodes
//! without padding, which keeps the concatenation a valid base64 string.

use crate::error::{AnalysisError, PipelineResult};
use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Nominal chunk size (8 KiB)
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Effective window: CHUNK_SIZE rounded down to a multiple of 3
const WINDOW: usize = CHUNK_SIZE - CHUNK_SIZE % 3;

/// Bytes → base64 text in bounded windows
pub struct BinaryEncoder;

impl BinaryEncoder {
    /// Encode `bytes` as standard (padded) base64
    pub fn encode(bytes: &[u8]) -> String {
        let mut out = String::with_capacity(bytes.len().div_ceil(3) * 4);
        for window in bytes.chunks(WINDOW) {
            STANDARD.encode_string(window, &mut out);
        }
        out
    }

    /// Decode standard base64, tolerating surrounding whitespace and line breaks
    pub fn decode(text: &str) -> PipelineResult<Vec<u8>> {
        let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| AnalysisError::FetchFailed(format!("Invalid base64 payload: {}", e)))
    }

    /// Length of the decoded payload without decoding it
    ///
    /// Whitespace and padding are not counted, matching what [`decode`](Self::decode) accepts.
    pub fn decoded_len(text: &str) -> usize {
        let symbols = text
            .bytes()
            .filter(|b| !b.is_ascii_whitespace() && *b != b'=')
            .count();
        symbols * 3 / 4
    }
}
