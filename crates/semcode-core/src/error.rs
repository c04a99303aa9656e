use semcode_index::FetchError;
use semcode_llm::EmbedError;
use semcode_memory::VectorStoreError;

use crate::registry::RegistryError;

#[derive(Debug, thiserror::Error)]
pub enum KnowledgeGraphError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(#[from] EmbedError),

    #[error(
        "embedding dimension mismatch for '{repo}': index holds {recorded}-dimensional vectors, \
         model produced {observed}; fix the embedding model or request a full re-embed"
    )]
    DimensionMismatch {
        repo: String,
        recorded: usize,
        observed: usize,
    },

    #[error("vector index unavailable: {0}")]
    IndexUnavailable(#[from] VectorStoreError),

    #[error("registry error: {0}")]
    RegistryWrite(#[from] RegistryError),

    #[error("repository '{0}' not found")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl KnowledgeGraphError {
    /// Whether re-running the same operation unchanged may succeed.
    ///
    /// `false` means the input or configuration has to change first.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch(e) => matches!(e, FetchError::Timeout(_) | FetchError::Io(_)),
            Self::EmbeddingUnavailable(_) | Self::IndexUnavailable(_) | Self::Io(_) => true,
            Self::RegistryWrite(e) => !matches!(e, RegistryError::Corrupt { .. }),
            Self::DimensionMismatch { .. } | Self::NotFound(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, KnowledgeGraphError>;
