use thiserror::Error;

/// Failures talking to the external reasoning service
///
/// All of these are recoverable: the verdict engine falls back to the
/// deterministic rules.
#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("reasoning service is not configured")]
    Disabled,
    #[error("reasoning service returned HTTP {0}")]
    Status(u16),
    #[error("reasoning transport failure: {0}")]
    Transport(String),
    #[error("reasoning response was not understood: {0}")]
    Malformed(String),
    #[error("prompt rendering failed: {0}")]
    Prompt(String),
}

/// A narrative that does not follow the five-section grammar
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NarrativeError {
    #[error("narrative has no [VERDICT] section")]
    MissingVerdict,
    #[error("unrecognised verdict: {0}")]
    InvalidVerdict(String),
    #[error("narrative has no [CONFIDENCE] section")]
    MissingConfidence,
    #[error("unrecognised confidence: {0}")]
    InvalidConfidence(String),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("codec: {0}")]
    Codec(#[from] serde_json::Error),
}
