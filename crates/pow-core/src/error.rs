//! Error types for header parsing, target decoding and header sources.

/// Errors produced by the proof-of-work core.
///
/// Running out of nonces is not an error; see
/// [`SearchResult::Exhausted`](crate::search::SearchResult::Exhausted).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PowError {
    #[error("malformed header: expected 80 bytes, got {len}")]
    MalformedHeader { len: usize },
    #[error("malformed compact target {bits:#010x}: {reason}")]
    MalformedTarget { bits: u32, reason: &'static str },
    #[error("block not found: {0}")]
    NotFound(String),
    #[error("block hash does not meet its target")]
    HashAboveTarget,
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("header source error: {0}")]
    Source(String),
}

impl From<hex::FromHexError> for PowError {
    fn from(e: hex::FromHexError) -> Self {
        PowError::InvalidHex(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PowError>;
