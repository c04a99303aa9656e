//! Wires a [`KnowledgeGraph`] from configuration.

use std::sync::Arc;
use std::time::Duration;

use semcode_index::{FileClassifier, SourceFetcher};
use semcode_llm::AnyEmbedder;
use semcode_llm::ollama::OllamaEmbedder;
use semcode_memory::{
    InMemoryVectorStore, QdrantOps, RepoVectorIndex, VectorStore, VectorStoreError,
};

use crate::config::{Config, EmbeddingProviderKind, VectorBackend};
use crate::coordinator::KnowledgeGraph;
use crate::error::Result;
use crate::registry::RepoRegistry;
use crate::secret::Secret;

/// Build the embedder selected by `config.embedding.provider`.
#[must_use]
pub fn create_embedder(config: &Config) -> AnyEmbedder {
    match config.embedding.provider {
        EmbeddingProviderKind::Ollama => AnyEmbedder::Ollama(OllamaEmbedder::new(
            &config.embedding.base_url,
            config.embedding.model.clone(),
            config.embedding.device,
            Duration::from_secs(config.embedding.timeout_secs),
        )),
    }
}

/// Build the vector store selected by `config.vector_store.backend`.
///
/// # Errors
///
/// Returns an error if the Qdrant client cannot be constructed.
pub fn create_vector_store(config: &Config) -> Result<Arc<dyn VectorStore>> {
    let vs = &config.vector_store;
    match vs.backend {
        VectorBackend::Qdrant => {
            let ops = QdrantOps::new(
                &vs.url,
                vs.api_key.as_ref().map(Secret::expose),
                Duration::from_secs(vs.timeout_secs),
            )
            .map_err(|e| VectorStoreError::Connection(e.to_string()))?;
            tracing::info!(url = %vs.url, collection = %vs.collection, "using Qdrant vector store");
            Ok(Arc::new(ops))
        }
        VectorBackend::Memory => {
            tracing::warn!("using in-memory vector store; the index is lost on exit");
            Ok(Arc::new(InMemoryVectorStore::new()))
        }
    }
}

/// Assemble the coordinator and its stores.
///
/// # Errors
///
/// Returns an error if the registry file is unreadable or corrupt, or the
/// vector store client cannot be constructed. Services are not contacted.
pub fn build_knowledge_graph(config: &Config) -> Result<KnowledgeGraph> {
    let fetcher = SourceFetcher::new(semcode_index::FetcherConfig {
        repos_dir: config.storage.repos_dir.clone(),
        token: config
            .fetcher
            .github_token
            .as_ref()
            .map(|t| t.expose().to_owned()),
        timeout: Duration::from_secs(config.fetcher.timeout_secs),
        shallow: config.fetcher.shallow,
    });
    let classifier = FileClassifier::new(&config.classifier.to_classifier_config());
    let embedder = create_embedder(config);
    let store = create_vector_store(config)?;
    let index = RepoVectorIndex::new(store, config.vector_store.collection.clone());
    let registry = RepoRegistry::open(config.storage.registry_path())?;

    tracing::info!(
        repos_dir = %config.storage.repos_dir.display(),
        registry = %registry.path().display(),
        repos = registry.list_all().len(),
        "knowledge graph ready"
    );
    Ok(KnowledgeGraph::new(
        fetcher,
        classifier,
        embedder,
        index,
        registry,
        config.embedding.batch_size,
    ))
}
