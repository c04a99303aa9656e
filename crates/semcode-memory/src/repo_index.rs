//! Repository-scoped view over a [`VectorStore`] collection.
//!
//! Every point carries the owning repository in its `repo_name` payload field,
//! and point IDs are derived from `(repo_name, path)`, so re-indexing a file
//! overwrites its previous point instead of adding a second one.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::vector_store::{VectorFilter, VectorPoint, VectorStore, VectorStoreError};

/// Payload field holding the owning repository name.
pub const REPO_FIELD: &str = "repo_name";

/// Upserts are sent in chunks of this many points.
const UPSERT_CHUNK: usize = 256;

/// Deterministic point ID for a document.
#[must_use]
pub fn point_id(repo_name: &str, path: &str) -> String {
    let key = format!("{repo_name}\0{path}");
    Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes()).to_string()
}

/// One embedded file as stored in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub repo_name: String,
    pub path: String,
    pub content: String,
    pub extension: String,
    pub size_bytes: u64,
    pub modified_time: String,
    pub content_hash: String,
    pub indexed_at: String,
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

impl IndexedDocument {
    fn into_point(self) -> Result<VectorPoint, VectorStoreError> {
        let id = point_id(&self.repo_name, &self.path);
        let vector = self.embedding.clone();
        let payload = match serde_json::to_value(&self)
            .map_err(|e| VectorStoreError::Serialization(e.to_string()))?
        {
            serde_json::Value::Object(map) => map.into_iter().collect(),
            _ => HashMap::new(),
        };
        Ok(VectorPoint {
            id,
            vector,
            payload,
        })
    }
}

/// A scored match read back from the index.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoHit {
    pub repo_name: String,
    pub path: String,
    pub content: String,
    pub score: f32,
    pub extension: Option<String>,
    pub size_bytes: Option<u64>,
    pub modified_time: Option<String>,
}

impl RepoHit {
    fn from_payload(score: f32, payload: &HashMap<String, serde_json::Value>) -> Self {
        let text = |key: &str| {
            payload
                .get(key)
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned)
        };
        Self {
            repo_name: text(REPO_FIELD).unwrap_or_default(),
            path: text("path").unwrap_or_default(),
            content: text("content").unwrap_or_default(),
            score,
            extension: text("extension"),
            size_bytes: payload.get("size_bytes").and_then(serde_json::Value::as_u64),
            modified_time: text("modified_time"),
        }
    }
}

#[derive(Clone)]
pub struct RepoVectorIndex {
    store: Arc<dyn VectorStore>,
    collection: String,
}

impl std::fmt::Debug for RepoVectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoVectorIndex")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

impl RepoVectorIndex {
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Create the collection for `dimensions`-wide vectors if it is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached.
    pub async fn ensure_ready(&self, dimensions: usize) -> Result<(), VectorStoreError> {
        self.store
            .ensure_collection(&self.collection, dimensions as u64)
            .await
    }

    /// Width the collection currently accepts, `None` if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached.
    pub async fn dimensions(&self) -> Result<Option<usize>, VectorStoreError> {
        let width = self.store.collection_dimensions(&self.collection).await?;
        width
            .map(|w| usize::try_from(w).map_err(|e| VectorStoreError::Collection(e.to_string())))
            .transpose()
    }

    /// Drop the collection and recreate it for `dimensions`-wide vectors.
    ///
    /// Every repository's points are lost; callers must only do this when the
    /// collection holds nothing they need to keep.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects either step.
    pub async fn reset(&self, dimensions: usize) -> Result<(), VectorStoreError> {
        self.store.delete_collection(&self.collection).await?;
        self.ensure_ready(dimensions).await?;
        tracing::info!(collection = %self.collection, dimensions, "vector collection reset");
        Ok(())
    }

    /// Insert or overwrite documents, keyed by `(repo_name, path)`.
    ///
    /// A failure part-way may leave some chunks written; re-running with the
    /// same documents converges because IDs are deterministic.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any upsert request fails.
    pub async fn upsert_documents(
        &self,
        documents: Vec<IndexedDocument>,
    ) -> Result<usize, VectorStoreError> {
        let Some(first) = documents.first() else {
            return Ok(0);
        };
        self.ensure_ready(first.embedding.len()).await?;

        let total = documents.len();
        let points = documents
            .into_iter()
            .map(IndexedDocument::into_point)
            .collect::<Result<Vec<_>, _>>()?;

        let mut points = points.into_iter().peekable();
        while points.peek().is_some() {
            let chunk: Vec<_> = points.by_ref().take(UPSERT_CHUNK).collect();
            self.store.upsert(&self.collection, chunk).await?;
        }
        tracing::debug!(collection = %self.collection, points = total, "upserted documents");
        Ok(total)
    }

    /// Remove every point tagged with `repo_name`. Nothing to delete is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the delete.
    pub async fn delete_by_repo(&self, repo_name: &str) -> Result<(), VectorStoreError> {
        self.store
            .delete_by_filter(&self.collection, VectorFilter::keyword(REPO_FIELD, repo_name))
            .await
    }

    /// Nearest documents to `vector`, optionally restricted to one repository.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be queried.
    pub async fn query(
        &self,
        vector: Vec<f32>,
        limit: usize,
        repo_name: Option<&str>,
    ) -> Result<Vec<RepoHit>, VectorStoreError> {
        if limit == 0 || !self.store.collection_exists(&self.collection).await? {
            return Ok(Vec::new());
        }
        let filter = repo_name.map(|name| VectorFilter::keyword(REPO_FIELD, name));
        let points = self
            .store
            .search(&self.collection, vector, limit as u64, filter)
            .await?;
        Ok(points
            .iter()
            .map(|p| RepoHit::from_payload(p.score, &p.payload))
            .collect())
    }

    /// # Errors
    ///
    /// Returns an error if the backend cannot count points.
    pub async fn count_for_repo(&self, repo_name: &str) -> Result<u64, VectorStoreError> {
        self.store
            .count(
                &self.collection,
                Some(VectorFilter::keyword(REPO_FIELD, repo_name)),
            )
            .await
    }

    /// # Errors
    ///
    /// Returns an error if the backend cannot count points.
    pub async fn count_all(&self) -> Result<u64, VectorStoreError> {
        self.store.count(&self.collection, None).await
    }

    /// # Errors
    ///
    /// Returns an error if the backend is unreachable.
    pub async fn health(&self) -> Result<(), VectorStoreError> {
        self.store.health_check().await
    }
}
