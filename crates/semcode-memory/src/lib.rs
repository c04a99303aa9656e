//! Vector index for repository documents, backed by Qdrant or an in-process store.

pub mod in_memory_store;
pub mod qdrant_ops;
pub mod repo_index;
pub mod vector_store;

pub use in_memory_store::InMemoryVectorStore;
pub use qdrant_ops::QdrantOps;
pub use repo_index::{IndexedDocument, RepoHit, RepoVectorIndex, point_id};
pub use vector_store::{
    BoxFuture, FieldCondition, FieldValue, ScoredVectorPoint, VectorFilter, VectorPoint,
    VectorStore, VectorStoreError,
};
