#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("embedding provider unreachable: {0}")]
    Unreachable(String),

    #[error("embedding request timed out after {0}s")]
    Timeout(u64),

    #[error("embedding model '{0}' is not loaded")]
    ModelNotLoaded(String),

    #[error("empty response from {provider}")]
    EmptyResponse { provider: &'static str },

    #[error("expected {expected} embeddings, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("inconsistent embedding dimensions within a batch: {first} vs {other}")]
    InconsistentDimensions { first: usize, other: usize },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, EmbedError>;
