//! Error types for source map decoding and encoding.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceMapError {
    #[error("Invalid source map JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported source map version {0}")]
    UnsupportedVersion(u32),

    #[error("Invalid base64 character '{0}' in mappings")]
    InvalidBase64(char),

    #[error("Unterminated VLQ value in mappings")]
    UnterminatedVlq,

    #[error("VLQ value too large in mappings")]
    VlqOverflow,

    #[error("Mapping segment has {0} fields, expected 1, 4 or 5")]
    InvalidSegment(usize),

    #[error("Mapping references source index {0} which does not exist")]
    SourceOutOfRange(i64),
}
